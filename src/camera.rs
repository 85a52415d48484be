use anyhow::ensure;
use cgmath::InnerSpace;

use crate::geom::{Ray, RaySample, SurfacePoint};
use crate::random::Rng;
use crate::{Float, Point2f, Point3f, Vec3f, Vec4f};

/// Pinhole camera at `position` looking toward `center`.
pub struct Camera {
    position: Point3f,
    // right-handed view basis; the camera looks down -w
    u: Vec3f,
    v: Vec3f,
    w: Vec3f,
    tan_half_fov: Float,
    aspect: Float,
}

impl Camera {
    pub fn new(
        position: Point3f,
        center: Point3f,
        up: Vec3f,
        vfov_degrees: Float,
        aspect: Float,
    ) -> anyhow::Result<Self> {
        ensure!(
            vfov_degrees > 0.0 && vfov_degrees < 180.0,
            "vertical fov must be in (0, 180), got {}",
            vfov_degrees
        );
        ensure!(aspect > 0.0, "aspect ratio must be positive, got {}", aspect);
        let gaze = center - position;
        ensure!(
            gaze.magnitude2() > 0.0,
            "camera position and look-at center coincide"
        );

        let w = -gaze.normalize();
        let u = up.cross(w).normalize();
        let v = w.cross(u);
        Ok(Self {
            position,
            u,
            v,
            w,
            tan_half_fov: (vfov_degrees.to_radians() / 2.0).tan(),
            aspect,
        })
    }

    pub fn position(&self) -> Point3f {
        self.position
    }

    /// Ray through raster position `rp` in [0,1]^2, (0,0) at bottom-left.
    pub fn primary_ray(&self, rp: Point2f) -> Ray {
        self.ray_through(rp, self.aspect)
    }

    fn ray_through(&self, rp: Point2f, aspect: Float) -> Ray {
        let x = 2.0 * rp.x - 1.0;
        let y = 2.0 * rp.y - 1.0;
        let d = (self.u * (x * self.tan_half_fov * aspect) + self.v * (y * self.tan_half_fov)
            - self.w)
            .normalize();
        Ray {
            o: self.position,
            d,
        }
    }

    /// Sample a ray through a uniform raster position inside `window`
    /// (x, y, dx, dy). The pinhole importance and the positional density
    /// cancel, so the weight is one.
    pub fn sample_primary_ray(&self, rng: &mut Rng, window: Vec4f, aspect: Float) -> RaySample {
        let (u1, u2) = rng.u2();
        let rp = Point2f::new(window.x + u1 * window.z, window.y + u2 * window.w);
        let ray = self.ray_through(rp, aspect);
        RaySample {
            sp: SurfacePoint::on_camera(ray.o, -self.w),
            wo: ray.d,
            weight: Vec3f::new(1.0, 1.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_camera() -> Camera {
        Camera::new(
            Point3f::new(0.0, 0.0, 3.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            60.0,
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn primary_rays_are_unit_length() {
        let camera = test_camera();
        for i in 0..16 {
            for j in 0..16 {
                let rp = Point2f::new((i as Float + 0.5) / 16.0, (j as Float + 0.5) / 16.0);
                let ray = camera.primary_ray(rp);
                assert_abs_diff_eq!(ray.d.magnitude(), 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn center_ray_points_at_target() {
        let camera = test_camera();
        let ray = camera.primary_ray(Point2f::new(0.5, 0.5));
        assert_abs_diff_eq!(ray.d.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ray.d.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ray.d.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn sampled_rays_stay_inside_window(){
        let camera = test_camera();
        let mut rng = Rng::with_seed(11);
        let window = Vec4f::new(0.25, 0.5, 0.25, 0.25);
        let corner_lo = camera.primary_ray(Point2f::new(0.25, 0.5));
        let corner_hi = camera.primary_ray(Point2f::new(0.5, 0.75));
        for _ in 0..100 {
            let s = camera.sample_primary_ray(&mut rng, window, 1.0);
            assert_eq!(s.weight, Vec3f::new(1.0, 1.0, 1.0));
            // sampled direction lies within the cone spanned by the window corners
            assert!(s.wo.x >= corner_lo.d.x - 1e-4 && s.wo.x <= corner_hi.d.x + 1e-4);
        }
    }

    #[test]
    fn rejects_bad_configuration() {
        let p = Point3f::new(0.0, 0.0, 1.0);
        assert!(Camera::new(p, p, Vec3f::new(0.0, 1.0, 0.0), 45.0, 1.0).is_err());
        assert!(Camera::new(
            p,
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            0.0,
            1.0
        )
        .is_err());
    }
}
