use anyhow::ensure;
use cgmath::{EuclideanSpace, InnerSpace, Matrix, SquareMatrix, Transform as _};

use crate::bounds::Bounds3f;
use crate::geom::{PointGeometry, Ray};
use crate::math::PI;
use crate::random::Rng;
use crate::{Float, Mat4f, Point2f, Point3f, Vec3f};

/// Triangle list with optional per-vertex normals and texture coordinates.
/// Vertices are stored in world space; transforms are baked at build time.
pub struct TriangleMesh {
    pub positions: Vec<Point3f>,
    pub normals: Vec<Vec3f>,
    pub uvs: Vec<Point2f>,
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn new(
        positions: Vec<Point3f>,
        normals: Vec<Vec3f>,
        uvs: Vec<Point2f>,
        indices: Vec<u32>,
    ) -> anyhow::Result<Self> {
        ensure!(
            indices.len() % 3 == 0,
            "triangle index list length {} is not a multiple of 3",
            indices.len()
        );
        ensure!(
            indices.iter().all(|&i| (i as usize) < positions.len()),
            "triangle index out of range"
        );
        ensure!(
            normals.is_empty() || normals.len() == positions.len(),
            "per-vertex normal count does not match vertex count"
        );
        ensure!(
            uvs.is_empty() || uvs.len() == positions.len(),
            "per-vertex uv count does not match vertex count"
        );
        Ok(Self {
            positions,
            normals,
            uvs,
            indices,
        })
    }

    /// Bake a transform into the vertex data.
    pub fn transformed(mut self, m: Mat4f) -> Self {
        if m == Mat4f::identity() {
            return self;
        }
        for p in &mut self.positions {
            *p = m.transform_point(*p);
        }
        if !self.normals.is_empty() {
            // normals transform by the inverse transpose
            let nt = m.invert().map(|inv| inv.transpose()).unwrap_or(m);
            for n in &mut self.normals {
                *n = nt.transform_vector(*n).normalize();
            }
        }
        self
    }

    pub fn tri_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn tri(&self, face: usize) -> (Point3f, Point3f, Point3f) {
        let i = 3 * face;
        (
            self.positions[self.indices[i] as usize],
            self.positions[self.indices[i + 1] as usize],
            self.positions[self.indices[i + 2] as usize],
        )
    }

    pub fn tri_bounds(&self, face: usize) -> Bounds3f {
        let (p0, p1, p2) = self.tri(face);
        Bounds3f::empty()
            .join_point(p0)
            .join_point(p1)
            .join_point(p2)
    }

    pub fn tri_area(&self, face: usize) -> Float {
        let (p0, p1, p2) = self.tri(face);
        0.5 * (p1 - p0).cross(p2 - p0).magnitude()
    }

    /// Moller-Trumbore intersection against one face.
    pub fn intersect_tri(
        &self,
        face: usize,
        ray: &Ray,
        tmin: Float,
        tmax: Float,
    ) -> Option<(Float, Float, Float)> {
        let (p0, p1, p2) = self.tri(face);
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let pv = ray.d.cross(e2);
        let det = e1.dot(pv);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tv = ray.o - p0;
        let u = tv.dot(pv) * inv_det;
        if u < 0.0 || u > 1.0 {
            return None;
        }
        let qv = tv.cross(e1);
        let v = ray.d.dot(qv) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(qv) * inv_det;
        if t < tmin || t > tmax {
            return None;
        }
        Some((t, u, v))
    }

    /// Shading geometry at barycentric coordinates (u, v) of a face.
    pub fn geom_at(&self, face: usize, u: Float, v: Float) -> PointGeometry {
        let i = 3 * face;
        let (i0, i1, i2) = (
            self.indices[i] as usize,
            self.indices[i + 1] as usize,
            self.indices[i + 2] as usize,
        );
        let (p0, p1, p2) = (self.positions[i0], self.positions[i1], self.positions[i2]);
        let w = 1.0 - u - v;
        let p = Point3f::from_vec(p0.to_vec() * w + p1.to_vec() * u + p2.to_vec() * v);

        let ng = (p1 - p0).cross(p2 - p0).normalize();
        let n = if self.normals.is_empty() {
            ng
        } else {
            let ns = self.normals[i0] * w + self.normals[i1] * u + self.normals[i2] * v;
            if ns.magnitude2() > 0.0 {
                ns.normalize()
            } else {
                ng
            }
        };

        let uv = if self.uvs.is_empty() {
            Point2f::new(u, v)
        } else {
            let t0 = self.uvs[i0];
            let t1 = self.uvs[i1];
            let t2 = self.uvs[i2];
            Point2f::from_vec(t0.to_vec() * w + t1.to_vec() * u + t2.to_vec() * v)
        };

        PointGeometry::on_surface(p, n, uv)
    }

    /// Uniform point on a face via the square-root barycentric warp.
    pub fn sample_tri(&self, rng: &mut Rng, face: usize) -> PointGeometry {
        let (u1, u2) = rng.u2();
        let su = u1.sqrt();
        let u = 1.0 - su;
        let v = u2 * su;
        let mut geom = self.geom_at(face, u, v);
        // emission orientation follows the geometric winding
        let (p0, p1, p2) = self.tri(face);
        geom.n = (p1 - p0).cross(p2 - p0).normalize();
        geom
    }
}

/// Analytic sphere.
pub struct Sphere {
    pub center: Point3f,
    pub radius: Float,
}

impl Sphere {
    pub fn new(center: Point3f, radius: Float) -> anyhow::Result<Self> {
        ensure!(radius > 0.0, "sphere radius must be positive, got {}", radius);
        Ok(Self { center, radius })
    }

    pub fn bounds(&self) -> Bounds3f {
        let r = Vec3f::new(self.radius, self.radius, self.radius);
        Bounds3f::with_bounds(self.center - r, self.center + r)
    }

    pub fn area(&self) -> Float {
        4.0 * PI * self.radius * self.radius
    }

    pub fn intersect(&self, ray: &Ray, tmin: Float, tmax: Float) -> Option<Float> {
        let oc = ray.o - self.center;
        let b = oc.dot(ray.d);
        let c = oc.magnitude2() - self.radius * self.radius;
        let discrim = b * b - c;
        if discrim < 0.0 {
            return None;
        }
        let root = discrim.sqrt();
        let t0 = -b - root;
        if t0 >= tmin && t0 <= tmax {
            return Some(t0);
        }
        let t1 = -b + root;
        if t1 >= tmin && t1 <= tmax {
            return Some(t1);
        }
        None
    }

    pub fn geom_at(&self, p: Point3f) -> PointGeometry {
        let n = (p - self.center).normalize();
        let uv = Point2f::new(
            0.5 + n.z.atan2(n.x) / (2.0 * PI),
            0.5 - n.y.asin() / PI,
        );
        PointGeometry::on_surface(p, n, uv)
    }

    pub fn sample_surface(&self, rng: &mut Rng) -> PointGeometry {
        let (u1, u2) = rng.u2();
        let d = crate::math::uniform_sample_sphere(u1, u2);
        self.geom_at(self.center + d * self.radius)
    }
}

pub enum Shape {
    Mesh(TriangleMesh),
    Sphere(Sphere),
}

impl Shape {
    /// Number of BVH leaf items this shape decomposes into.
    pub fn item_count(&self) -> usize {
        match self {
            Shape::Mesh(mesh) => mesh.tri_count(),
            Shape::Sphere(_) => 1,
        }
    }

    pub fn item_bounds(&self, item: usize) -> Bounds3f {
        match self {
            Shape::Mesh(mesh) => mesh.tri_bounds(item),
            Shape::Sphere(sphere) => sphere.bounds(),
        }
    }

    pub fn area(&self) -> Float {
        match self {
            Shape::Mesh(mesh) => (0..mesh.tri_count()).map(|f| mesh.tri_area(f)).sum(),
            Shape::Sphere(sphere) => sphere.area(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_quad() -> TriangleMesh {
        // z = 0 plane, [-1, 1]^2, normal +z
        TriangleMesh::new(
            vec![
                Point3f::new(-1.0, -1.0, 0.0),
                Point3f::new(1.0, -1.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(-1.0, 1.0, 0.0),
            ],
            vec![],
            vec![],
            vec![0, 1, 2, 0, 2, 3],
        )
        .unwrap()
    }

    #[test]
    fn quad_intersection_and_normal() {
        let mesh = unit_quad();
        let ray = Ray {
            o: Point3f::new(0.25, 0.25, 5.0),
            d: Vec3f::new(0.0, 0.0, -1.0),
        };
        let hit = (0..mesh.tri_count())
            .filter_map(|f| mesh.intersect_tri(f, &ray, 0.0, 100.0).map(|h| (f, h)))
            .next()
            .expect("ray must hit the quad");
        let (face, (t, u, v)) = hit;
        assert_abs_diff_eq!(t, 5.0, epsilon = 1e-4);
        let geom = mesh.geom_at(face, u, v);
        assert_abs_diff_eq!(geom.p.z, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geom.n.z.abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn mesh_area_sums_faces() {
        let mesh = unit_quad();
        assert_abs_diff_eq!(Shape::Mesh(mesh).area(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn transform_bakes_translation() {
        let mesh = unit_quad().transformed(Mat4f::from_translation(Vec3f::new(0.0, 0.0, 2.0)));
        assert_abs_diff_eq!(mesh.positions[0].z, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn sphere_intersection_prefers_near_root() {
        let sphere = Sphere::new(Point3f::new(0.0, 0.0, 0.0), 1.0).unwrap();
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, 3.0),
            d: Vec3f::new(0.0, 0.0, -1.0),
        };
        let t = sphere.intersect(&ray, 1e-4, 100.0).unwrap();
        assert_abs_diff_eq!(t, 2.0, epsilon = 1e-4);

        // from inside, the far root is returned
        let inside = Ray {
            o: Point3f::new(0.0, 0.0, 0.0),
            d: Vec3f::new(0.0, 0.0, -1.0),
        };
        let t = sphere.intersect(&inside, 1e-4, 100.0).unwrap();
        assert_abs_diff_eq!(t, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn triangle_sampling_stays_on_the_face() {
        let mesh = unit_quad();
        let mut rng = Rng::with_seed(2);
        for _ in 0..200 {
            let geom = mesh.sample_tri(&mut rng, 0);
            assert_abs_diff_eq!(geom.p.z, 0.0, epsilon = 1e-5);
            assert!(geom.p.x >= -1.0 - 1e-5 && geom.p.x <= 1.0 + 1e-5);
            assert!(geom.p.y >= -1.0 - 1e-5 && geom.p.y <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn rejects_malformed_meshes() {
        assert!(TriangleMesh::new(
            vec![Point3f::new(0.0, 0.0, 0.0)],
            vec![],
            vec![],
            vec![0, 0]
        )
        .is_err());
        assert!(TriangleMesh::new(
            vec![Point3f::new(0.0, 0.0, 0.0)],
            vec![],
            vec![],
            vec![0, 0, 1]
        )
        .is_err());
    }
}
