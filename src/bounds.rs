use crate::geom::Ray;
use crate::{Float, Point3f, Vec3f, INFINITY};

/// Axis-aligned box. The empty box has inverted bounds so that `join` works
/// as the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3f {
    pub min: Point3f,
    pub max: Point3f,
}

impl Bounds3f {
    pub fn empty() -> Self {
        Self {
            min: Point3f::new(INFINITY, INFINITY, INFINITY),
            max: Point3f::new(-INFINITY, -INFINITY, -INFINITY),
        }
    }

    pub fn with_bounds(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    pub fn join(&self, other: &Bounds3f) -> Bounds3f {
        Bounds3f {
            min: Point3f::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3f::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn join_point(&self, p: Point3f) -> Bounds3f {
        self.join(&Bounds3f::with_bounds(p, p))
    }

    pub fn centroid(&self) -> Point3f {
        Point3f::new(
            0.5 * (self.min.x + self.max.x),
            0.5 * (self.min.y + self.max.y),
            0.5 * (self.min.z + self.max.z),
        )
    }

    pub fn diagonal(&self) -> Vec3f {
        self.max - self.min
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    /// Index of the axis with the largest extent.
    pub fn maximum_extent(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    pub fn surface_area(&self) -> Float {
        let d = self.diagonal();
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn offset(&self, p: Point3f) -> Vec3f {
        let mut o = p - self.min;
        let d = self.diagonal();
        if d.x > 0.0 {
            o.x /= d.x;
        }
        if d.y > 0.0 {
            o.y /= d.y;
        }
        if d.z > 0.0 {
            o.z /= d.z;
        }
        o
    }

    /// Parametric overlap of the ray with the box, clipped to `[tmin, tmax]`.
    pub fn intersect_range(&self, ray: &Ray, tmin: Float, tmax: Float) -> Option<(Float, Float)> {
        let mut t0 = tmin;
        let mut t1 = tmax;
        for axis in 0..3 {
            let inv = 1.0 / ray.d[axis];
            let mut near = (self.min[axis] - ray.o[axis]) * inv;
            let mut far = (self.max[axis] - ray.o[axis]) * inv;
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    pub fn intersect_test(&self, ray: &Ray, tmin: Float, tmax: Float) -> bool {
        self.intersect_range(ray, tmin, tmax).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_of_empty_is_identity() {
        let b = Bounds3f::with_bounds(Point3f::new(-1.0, 0.0, 2.0), Point3f::new(1.0, 3.0, 4.0));
        assert_eq!(Bounds3f::empty().join(&b), b);
    }

    #[test]
    fn ray_slab_overlap() {
        let b = Bounds3f::with_bounds(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, -5.0),
            d: Vec3f::new(0.0, 0.0, 1.0),
        };
        let (t0, t1) = b.intersect_range(&ray, 0.0, INFINITY).unwrap();
        assert!((t0 - 4.0).abs() < 1e-5);
        assert!((t1 - 6.0).abs() < 1e-5);

        let miss = Ray {
            o: Point3f::new(0.0, 5.0, -5.0),
            d: Vec3f::new(0.0, 0.0, 1.0),
        };
        assert!(!b.intersect_test(&miss, 0.0, INFINITY));
    }

    #[test]
    fn clipped_range_respects_tmax() {
        let b = Bounds3f::with_bounds(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, -5.0),
            d: Vec3f::new(0.0, 0.0, 1.0),
        };
        assert!(b.intersect_range(&ray, 0.0, 3.0).is_none());
        let (t0, t1) = b.intersect_range(&ray, 0.0, 5.0).unwrap();
        assert!((t0 - 4.0).abs() < 1e-5);
        assert!((t1 - 5.0).abs() < 1e-5);
    }
}
