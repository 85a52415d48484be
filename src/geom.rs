use crate::math::coordinate_system;
use crate::{Float, Point2f, Point3f, Vec3f};

/// Geometry of a path vertex: a point on a surface, a point inside a
/// medium, or a direction at infinity.
///
/// For an infinite vertex (environment or directional endpoint) `p` is
/// undefined and `wo` stores the endpoint's outgoing direction instead;
/// nothing may derive a finite distance from an infinite point.
#[derive(Debug, Clone, Copy)]
pub struct PointGeometry {
    pub p: Point3f,
    pub n: Vec3f,
    /// Tangent frame spanning the plane orthogonal to `n`.
    pub u: Vec3f,
    pub v: Vec3f,
    pub uv: Point2f,
    /// Outgoing direction; meaningful only when `infinite` is set.
    pub wo: Vec3f,
    pub infinite: bool,
}

impl PointGeometry {
    pub fn on_surface(p: Point3f, n: Vec3f, uv: Point2f) -> Self {
        let (u, v) = coordinate_system(n);
        Self {
            p,
            n,
            u,
            v,
            uv,
            wo: Vec3f::new(0.0, 0.0, 0.0),
            infinite: false,
        }
    }

    /// A scattering point inside a medium; there is no meaningful normal.
    pub fn in_medium(p: Point3f) -> Self {
        Self {
            p,
            n: Vec3f::new(0.0, 0.0, 1.0),
            u: Vec3f::new(1.0, 0.0, 0.0),
            v: Vec3f::new(0.0, 1.0, 0.0),
            uv: Point2f::new(0.0, 0.0),
            wo: Vec3f::new(0.0, 0.0, 0.0),
            infinite: false,
        }
    }

    /// An endpoint at infinity whose outgoing direction is `wo`.
    pub fn at_infinity(wo: Vec3f) -> Self {
        Self {
            p: Point3f::new(0.0, 0.0, 0.0),
            n: wo,
            u: Vec3f::new(1.0, 0.0, 0.0),
            v: Vec3f::new(0.0, 1.0, 0.0),
            uv: Point2f::new(0.0, 0.0),
            wo,
            infinite: true,
        }
    }
}

/// What produced a vertex. Indices refer into the scene's primitive list;
/// vertices never own scene data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Camera,
    Surface { prim: usize },
    Medium,
    Environment,
}

#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint {
    pub geom: PointGeometry,
    pub kind: PointKind,
}

impl SurfacePoint {
    pub fn on_camera(p: Point3f, forward: Vec3f) -> Self {
        Self {
            geom: PointGeometry::on_surface(p, forward, Point2f::new(0.0, 0.0)),
            kind: PointKind::Camera,
        }
    }

    pub fn on_surface(prim: usize, geom: PointGeometry) -> Self {
        Self {
            geom,
            kind: PointKind::Surface { prim },
        }
    }

    pub fn in_medium(p: Point3f) -> Self {
        Self {
            geom: PointGeometry::in_medium(p),
            kind: PointKind::Medium,
        }
    }

    pub fn environment(wo: Vec3f) -> Self {
        Self {
            geom: PointGeometry::at_infinity(wo),
            kind: PointKind::Environment,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub o: Point3f,
    /// Unit direction.
    pub d: Vec3f,
}

impl Ray {
    pub fn at(&self, t: Float) -> Point3f {
        self.o + self.d * t
    }
}

/// Result of every "sample the next ray" operation: the vertex the ray
/// leaves from, the sampled direction, and the sampled value divided by its
/// probability density (Jacobians and embedded visibility included).
#[derive(Debug, Clone, Copy)]
pub struct RaySample {
    pub sp: SurfacePoint,
    pub wo: Vec3f,
    pub weight: Vec3f,
}

impl RaySample {
    /// The sampled ray. Only defined for finite vertices.
    pub fn ray(&self) -> Ray {
        debug_assert!(!self.sp.geom.infinite);
        Ray {
            o: self.sp.geom.p,
            d: self.wo,
        }
    }
}

/// Result of distance sampling along a ray: the next interaction (surface,
/// medium event, or environment) and transmittance-times-throughput over
/// its probability density.
#[derive(Debug, Clone, Copy)]
pub struct DistanceSample {
    pub sp: SurfacePoint,
    pub weight: Vec3f,
}
