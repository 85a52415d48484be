pub mod accel;
pub mod bounds;
pub mod camera;
pub mod film;
pub mod geom;
pub mod loaders;
pub mod material;
pub mod math;
pub mod medium;
pub mod parallel;
pub mod props;
pub mod random;
pub mod renderer;
pub mod scene;
pub mod shape;

pub use crate::bounds::Bounds3f;
pub use crate::geom::{DistanceSample, PointGeometry, PointKind, Ray, RaySample, SurfacePoint};
pub use crate::math::{
    abs_dot, coordinate_system, face_forward, is_zero, max_component, reflect, Float, Mat4f,
    Point2f, Point3f, Vec2f, Vec3f, Vec4f, INFINITY, RAY_EPS,
};
pub use crate::random::Rng;
