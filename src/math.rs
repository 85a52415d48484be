use cgmath::InnerSpace;

pub type Float = f32;

pub type Vec2f = cgmath::Vector2<Float>;
pub type Vec3f = cgmath::Vector3<Float>;
pub type Vec4f = cgmath::Vector4<Float>;
pub type Point2f = cgmath::Point2<Float>;
pub type Point3f = cgmath::Point3<Float>;
pub type Mat4f = cgmath::Matrix4<Float>;

pub const INFINITY: Float = std::f32::INFINITY;
pub const PI: Float = std::f32::consts::PI;
pub const FRAC_1_PI: Float = std::f32::consts::FRAC_1_PI;

/// Minimum ray parameter used to step off a surface before tracing.
pub const RAY_EPS: Float = 1e-4;

pub fn lerp(t: Float, v1: Float, v2: Float) -> Float {
    (1.0 - t) * v1 + t * v2
}

pub fn abs_dot(a: Vec3f, b: Vec3f) -> Float {
    a.dot(b).abs()
}

pub fn max_component(v: Vec3f) -> Float {
    v.x.max(v.y).max(v.z)
}

pub fn is_zero(v: Vec3f) -> bool {
    v.x == 0.0 && v.y == 0.0 && v.z == 0.0
}

pub fn is_finite(v: Vec3f) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Mirror `w` about the normal `n`. Both `w` and the result point away from
/// the surface.
pub fn reflect(w: Vec3f, n: Vec3f) -> Vec3f {
    2.0 * w.dot(n) * n - w
}

/// Refract `w` through the interface with normal `n` and relative index
/// `eta` (incident over transmitted). `None` on total internal reflection.
pub fn refract(w: Vec3f, n: Vec3f, eta: Float) -> Option<Vec3f> {
    let cos_i = w.dot(n);
    let sin2_i = (1.0 - cos_i * cos_i).max(0.0);
    let sin2_t = eta * eta * sin2_i;
    if sin2_t >= 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    Some(-w * eta + n * (eta * cos_i - cos_t))
}

/// Flip `n` so it lies in the same hemisphere as `w`.
pub fn face_forward(n: Vec3f, w: Vec3f) -> Vec3f {
    if n.dot(w) < 0.0 {
        -n
    } else {
        n
    }
}

/// Build an orthonormal basis around a unit vector.
pub fn coordinate_system(v1: Vec3f) -> (Vec3f, Vec3f) {
    let v2 = if v1.x.abs() > v1.y.abs() {
        Vec3f::new(-v1.z, 0.0, v1.x) / (v1.x * v1.x + v1.z * v1.z).sqrt()
    } else {
        Vec3f::new(0.0, v1.z, -v1.y) / (v1.y * v1.y + v1.z * v1.z).sqrt()
    };
    let v3 = v1.cross(v2);
    (v2, v3)
}

pub fn concentric_sample_disk(u1: Float, u2: Float) -> Point2f {
    // map sample from [0, 1] to [-1, 1]
    let ox = 2.0 * u1 - 1.0;
    let oy = 2.0 * u2 - 1.0;
    if ox == 0.0 && oy == 0.0 {
        return Point2f::new(0.0, 0.0);
    }

    let (r, theta) = if ox.abs() > oy.abs() {
        (ox, std::f32::consts::FRAC_PI_4 * (oy / ox))
    } else {
        (
            oy,
            std::f32::consts::FRAC_PI_2 - std::f32::consts::FRAC_PI_4 * (ox / oy),
        )
    };

    Point2f::new(r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted hemisphere direction in the local frame (+z up).
pub fn cosine_sample_hemisphere(u1: Float, u2: Float) -> Vec3f {
    let d = concentric_sample_disk(u1, u2);
    let z = Float::sqrt(Float::max(0.0, 1.0 - d.x * d.x - d.y * d.y));
    Vec3f::new(d.x, d.y, z)
}

pub fn uniform_sample_sphere(u1: Float, u2: Float) -> Vec3f {
    let z = 1.0 - 2.0 * u1;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: Float = 1.0 / (4.0 * PI);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn coordinate_system_is_orthonormal() {
        let dirs = [
            Vec3f::new(0.0, 0.0, 1.0),
            Vec3f::new(1.0, 0.0, 0.0),
            Vec3f::new(0.3, -0.8, 0.52).normalize(),
        ];
        for &n in &dirs {
            let (t, b) = coordinate_system(n);
            assert_abs_diff_eq!(t.magnitude(), 1.0, epsilon = 1e-5);
            assert_abs_diff_eq!(b.magnitude(), 1.0, epsilon = 1e-5);
            assert_abs_diff_eq!(t.dot(n), 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(b.dot(n), 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(t.dot(b), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn reflect_preserves_angle() {
        let n = Vec3f::new(0.0, 1.0, 0.0);
        let w = Vec3f::new(1.0, 1.0, 0.0).normalize();
        let r = reflect(w, n);
        assert_abs_diff_eq!(r.magnitude(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r.dot(n), w.dot(n), epsilon = 1e-6);
        assert_abs_diff_eq!(r.x, -w.x, epsilon = 1e-6);
    }

    #[test]
    fn refract_detects_total_internal_reflection() {
        let n = Vec3f::new(0.0, 1.0, 0.0);
        let grazing = Vec3f::new(0.99, 0.141, 0.0).normalize();
        assert!(refract(grazing, n, 1.5).is_none());

        let head_on = Vec3f::new(0.0, 1.0, 0.0);
        let t = refract(head_on, n, 1.0 / 1.5).unwrap();
        assert_abs_diff_eq!(t.magnitude(), 1.0, epsilon = 1e-5);
        assert!(t.y < 0.0);
    }

    #[test]
    fn cosine_hemisphere_stays_above_plane() {
        for i in 0..32 {
            for j in 0..32 {
                let d = cosine_sample_hemisphere(i as Float / 32.0, j as Float / 32.0);
                assert!(d.z >= 0.0);
                assert_abs_diff_eq!(d.magnitude(), 1.0, epsilon = 1e-4);
            }
        }
    }
}
