use anyhow::{bail, ensure};
use cgmath::{InnerSpace, Transform as _};

use crate::accel::{Bvh, ItemRef, SplitMethod};
use crate::camera::Camera;
use crate::geom::{DistanceSample, PointKind, Ray, RaySample, SurfacePoint};
use crate::material::Material;
use crate::math::{uniform_sample_sphere, UNIFORM_SPHERE_PDF};
use crate::medium::{DistanceEvent, Medium};
use crate::props::Props;
use crate::random::Rng;
use crate::shape::Shape;
use crate::{Float, Mat4f, Point2f, Vec3f, Vec4f, INFINITY, RAY_EPS};

/// A piece of scene content: a shape, its surface response, and its
/// emitted radiance if it is a light.
pub struct Primitive {
    pub shape: Shape,
    pub material: Material,
    pub emission: Option<Vec3f>,
}

/// Per-light sampling table: cumulative face areas for uniform-by-area
/// position sampling.
struct LightRecord {
    prim: usize,
    cdf: Vec<Float>,
    area: Float,
}

/// Immutable scene aggregate. Built once by `SceneBuilder::build`, then
/// shared by reference across render workers; every sampling operation
/// takes `&self`.
pub struct Scene {
    camera: Camera,
    primitives: Vec<Primitive>,
    lights: Vec<LightRecord>,
    env: Option<Vec3f>,
    medium: Option<Medium>,
    accel: Bvh,
}

impl Scene {
    // ------------------------------------------------------------------
    // ray generation

    /// Deterministic ray through raster position `rp` in [0,1]^2.
    pub fn primary_ray(&self, rp: Point2f) -> Ray {
        self.camera.primary_ray(rp)
    }

    /// Sample a camera ray through the raster window `(x, y, dx, dy)`.
    pub fn sample_primary_ray(
        &self,
        rng: &mut Rng,
        window: Vec4f,
        aspect: Float,
    ) -> Option<RaySample> {
        Some(self.camera.sample_primary_ray(rng, window, aspect))
    }

    /// Sample the next direction leaving `sp`, with `wi` pointing back
    /// toward the previous vertex.
    pub fn sample_ray(&self, rng: &mut Rng, sp: &SurfacePoint, wi: Vec3f) -> Option<RaySample> {
        match sp.kind {
            PointKind::Surface { prim } => self.primitives[prim]
                .material
                .sample(rng, &sp.geom, wi)
                .map(|s| RaySample {
                    sp: *sp,
                    wo: s.wo,
                    weight: s.weight,
                }),
            PointKind::Medium => {
                let medium = self.medium.as_ref()?;
                Some(RaySample {
                    sp: *sp,
                    wo: medium.sample_phase(rng, wi),
                    weight: Vec3f::new(1.0, 1.0, 1.0),
                })
            }
            PointKind::Camera | PointKind::Environment => None,
        }
    }

    // ------------------------------------------------------------------
    // intersection and visibility

    /// Closest surface along the ray within `[tmin, tmax]`.
    pub fn intersect(&self, ray: &Ray, tmin: Float, tmax: Float) -> Option<SurfacePoint> {
        if tmin > tmax {
            return None;
        }
        let mut hit_data = None;
        let item = self.accel.intersect(ray, tmin, tmax, |item, tmin, tmax| {
            match &self.primitives[item.prim as usize].shape {
                Shape::Mesh(mesh) => mesh
                    .intersect_tri(item.face as usize, ray, tmin, tmax)
                    .map(|(t, u, v)| {
                        hit_data = Some((t, u, v));
                        t
                    }),
                Shape::Sphere(sphere) => sphere.intersect(ray, tmin, tmax).map(|t| {
                    hit_data = Some((t, 0.0, 0.0));
                    t
                }),
            }
        })?;

        let (t, u, v) = hit_data.expect("accepted hit must record parameters");
        let prim = item.prim as usize;
        let geom = match &self.primitives[prim].shape {
            Shape::Mesh(mesh) => mesh.geom_at(item.face as usize, u, v),
            Shape::Sphere(sphere) => sphere.geom_at(ray.at(t)),
        };
        Some(SurfacePoint::on_surface(prim, geom))
    }

    fn occluded(&self, ray: &Ray, tmin: Float, tmax: Float) -> bool {
        self.accel.intersect_test(ray, tmin, tmax, |item, tmin, tmax| {
            match &self.primitives[item.prim as usize].shape {
                Shape::Mesh(mesh) => mesh
                    .intersect_tri(item.face as usize, ray, tmin, tmax)
                    .is_some(),
                Shape::Sphere(sphere) => sphere.intersect(ray, tmin, tmax).is_some(),
            }
        })
    }

    /// Mutual visibility. The finite endpoint is always used as the ray
    /// origin; an infinite endpoint contributes its stored direction.
    pub fn visible(&self, sp1: &SurfacePoint, sp2: &SurfacePoint) -> bool {
        let visible_from = |from: &SurfacePoint, to: &SurfacePoint| {
            debug_assert!(!from.geom.infinite);
            let (wo, tmax) = if to.geom.infinite {
                (-to.geom.wo, INFINITY)
            } else {
                let delta = to.geom.p - from.geom.p;
                let dist = delta.magnitude();
                (delta / dist, dist * (1.0 - RAY_EPS))
            };
            !self.occluded(
                &Ray {
                    o: from.geom.p,
                    d: wo,
                },
                RAY_EPS,
                tmax,
            )
        };
        if sp1.geom.infinite {
            visible_from(sp2, sp1)
        } else {
            visible_from(sp1, sp2)
        }
    }

    // ------------------------------------------------------------------
    // distance sampling and transmittance

    /// Sample the next interaction along `wo`: a surface hit, a medium
    /// scattering event, or the environment if the ray escapes.
    pub fn sample_distance(
        &self,
        rng: &mut Rng,
        sp: &SurfacePoint,
        wo: Vec3f,
    ) -> Option<DistanceSample> {
        debug_assert!(!sp.geom.infinite);
        let ray = Ray {
            o: sp.geom.p,
            d: wo,
        };
        let hit = self.intersect(&ray, RAY_EPS, INFINITY);
        let t_surf = hit
            .as_ref()
            .map_or(INFINITY, |h| (h.geom.p - ray.o).magnitude());

        let pass_weight = match &self.medium {
            None => Vec3f::new(1.0, 1.0, 1.0),
            Some(medium) => match medium.sample_distance(rng, &ray, t_surf) {
                DistanceEvent::Scatter { t, weight } => {
                    return Some(DistanceSample {
                        sp: SurfacePoint::in_medium(ray.at(t)),
                        weight,
                    });
                }
                DistanceEvent::Pass { weight } => weight,
            },
        };

        match hit {
            Some(sp_hit) => Some(DistanceSample {
                sp: sp_hit,
                weight: pass_weight,
            }),
            None => self.env.map(|_| DistanceSample {
                sp: SurfacePoint::environment(-wo),
                weight: pass_weight,
            }),
        }
    }

    /// Transmittance between two mutually visible points; `None` when the
    /// segment is occluded. The stream argument admits stochastic
    /// estimators for heterogeneous media.
    pub fn eval_transmittance(
        &self,
        _rng: &mut Rng,
        sp1: &SurfacePoint,
        sp2: &SurfacePoint,
    ) -> Option<Vec3f> {
        if !self.visible(sp1, sp2) {
            return None;
        }
        let medium = match &self.medium {
            None => return Some(Vec3f::new(1.0, 1.0, 1.0)),
            Some(m) => m,
        };

        let (from, to) = if sp1.geom.infinite {
            (sp2, sp1)
        } else {
            (sp1, sp2)
        };
        let (d, t_max) = if to.geom.infinite {
            (-to.geom.wo, INFINITY)
        } else {
            let delta = to.geom.p - from.geom.p;
            let dist = delta.magnitude();
            if dist == 0.0 {
                return Some(Vec3f::new(1.0, 1.0, 1.0));
            }
            (delta / dist, dist)
        };
        Some(medium.transmittance(
            &Ray {
                o: from.geom.p,
                d,
            },
            t_max,
        ))
    }

    // ------------------------------------------------------------------
    // light sampling and evaluation

    /// Sample a point on a light as seen from `sp`. The returned `wo`
    /// points from the light toward `sp`; the weight folds in the emitted
    /// radiance, the light-side cosine, the inverse squared distance, and
    /// all selection densities.
    pub fn sample_light(&self, rng: &mut Rng, sp: &SurfacePoint) -> Option<RaySample> {
        let n_choices = self.lights.len() + self.env.is_some() as usize;
        if n_choices == 0 {
            return None;
        }
        let pick = ((rng.u() * n_choices as Float) as usize).min(n_choices - 1);

        if pick < self.lights.len() {
            let light = &self.lights[pick];
            let prim = &self.primitives[light.prim];
            let geom = match &prim.shape {
                Shape::Mesh(mesh) => {
                    let target = rng.u() * light.area;
                    let face = light
                        .cdf
                        .partition_point(|&c| c <= target)
                        .min(light.cdf.len() - 1);
                    mesh.sample_tri(rng, face)
                }
                Shape::Sphere(sphere) => sphere.sample_surface(rng),
            };

            let to_ref = sp.geom.p - geom.p;
            let d2 = to_ref.magnitude2();
            if d2 == 0.0 {
                return None;
            }
            let wo = to_ref / d2.sqrt();
            let cos_l = geom.n.dot(wo).max(0.0);
            let le = prim.emission.unwrap_or_else(|| Vec3f::new(0.0, 0.0, 0.0));
            // pdf over (light, area) is 1 / (n_choices * area)
            let weight = le * (cos_l / d2 * light.area * n_choices as Float);
            Some(RaySample {
                sp: SurfacePoint::on_surface(light.prim, geom),
                wo,
                weight,
            })
        } else {
            let toward_env = uniform_sample_sphere(rng.u(), rng.u());
            let radiance = self.env.expect("environment pick requires an environment");
            let weight = radiance / (UNIFORM_SPHERE_PDF / n_choices as Float);
            Some(RaySample {
                sp: SurfacePoint::environment(-toward_env),
                wo: -toward_env,
                weight,
            })
        }
    }

    pub fn is_light(&self, sp: &SurfacePoint) -> bool {
        match sp.kind {
            PointKind::Surface { prim } => self.primitives[prim].emission.is_some(),
            PointKind::Environment => self.env.is_some(),
            PointKind::Camera | PointKind::Medium => false,
        }
    }

    pub fn is_specular(&self, sp: &SurfacePoint) -> bool {
        match sp.kind {
            PointKind::Surface { prim } => self.primitives[prim].material.is_specular(),
            _ => false,
        }
    }

    /// Surface response times outgoing cosine; zero off-surface.
    pub fn eval_bsdf(&self, sp: &SurfacePoint, wi: Vec3f, wo: Vec3f) -> Vec3f {
        match sp.kind {
            PointKind::Surface { prim } => self.primitives[prim].material.eval(&sp.geom, wi, wo),
            _ => Vec3f::new(0.0, 0.0, 0.0),
        }
    }

    /// Extended scattering evaluation: the surface BSDF on surfaces, the
    /// phase function at medium vertices.
    pub fn eval_scatter(&self, sp: &SurfacePoint, wi: Vec3f, wo: Vec3f) -> Vec3f {
        match sp.kind {
            PointKind::Surface { .. } => self.eval_bsdf(sp, wi, wo),
            PointKind::Medium => match &self.medium {
                Some(medium) => {
                    let p = medium.eval_phase(wi, wo);
                    Vec3f::new(p, p, p)
                }
                None => Vec3f::new(0.0, 0.0, 0.0),
            },
            _ => Vec3f::new(0.0, 0.0, 0.0),
        }
    }

    /// Emitted radiance leaving an endpoint along `wo`.
    pub fn eval_emission(&self, sp: &SurfacePoint, wo: Vec3f) -> Vec3f {
        match sp.kind {
            PointKind::Surface { prim } => match self.primitives[prim].emission {
                Some(le) if sp.geom.n.dot(wo) > 0.0 => le,
                _ => Vec3f::new(0.0, 0.0, 0.0),
            },
            PointKind::Environment => self.env.unwrap_or_else(|| Vec3f::new(0.0, 0.0, 0.0)),
            _ => Vec3f::new(0.0, 0.0, 0.0),
        }
    }

    /// Closed-form surface albedo, when the material exposes one.
    pub fn reflectance(&self, sp: &SurfacePoint) -> Option<Vec3f> {
        match sp.kind {
            PointKind::Surface { prim } => self.primitives[prim].material.reflectance(),
            _ => None,
        }
    }
}

/// Accumulates primitives, then freezes them behind an acceleration
/// structure.
#[derive(Default)]
pub struct SceneBuilder {
    camera: Option<Camera>,
    primitives: Vec<Primitive>,
    env: Option<Vec3f>,
    medium: Option<Medium>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_camera(&mut self, camera: Camera) -> &mut Self {
        self.camera = Some(camera);
        self
    }

    /// Add a shape with `transform` baked into its world-space data.
    pub fn add_shape(&mut self, transform: Mat4f, shape: Shape, material: Material) -> &mut Self {
        self.add_primitive(transform, shape, material, None)
    }

    /// Add an emitting shape.
    pub fn add_light(
        &mut self,
        transform: Mat4f,
        shape: Shape,
        material: Material,
        radiance: Vec3f,
    ) -> &mut Self {
        self.add_primitive(transform, shape, material, Some(radiance))
    }

    pub fn add_primitive(
        &mut self,
        transform: Mat4f,
        shape: Shape,
        material: Material,
        emission: Option<Vec3f>,
    ) -> &mut Self {
        let shape = match shape {
            Shape::Mesh(mesh) => Shape::Mesh(mesh.transformed(transform)),
            Shape::Sphere(mut sphere) => {
                // spheres support rigid transforms with uniform scale
                sphere.center = transform.transform_point(sphere.center);
                sphere.radius *= transform.x.truncate().magnitude();
                Shape::Sphere(sphere)
            }
        };
        self.primitives.push(Primitive {
            shape,
            material,
            emission,
        });
        self
    }

    /// Constant-radiance environment light.
    pub fn set_environment(&mut self, radiance: Vec3f) -> &mut Self {
        self.env = Some(radiance);
        self
    }

    pub fn set_medium(&mut self, medium: Medium) -> &mut Self {
        self.medium = Some(medium);
        self
    }

    /// Freeze the scene behind the named acceleration structure.
    pub fn build(self, accel_name: &str, _props: &Props) -> anyhow::Result<Scene> {
        let camera = match self.camera {
            Some(camera) => camera,
            None => bail!("scene has no camera"),
        };

        let split_method = match accel_name {
            "accel::sahbvh" => SplitMethod::Sah,
            "accel::bvh" => SplitMethod::Middle,
            _ => bail!("unknown acceleration structure \"{}\"", accel_name),
        };

        let mut lights = Vec::new();
        for (i, prim) in self.primitives.iter().enumerate() {
            if prim.emission.is_none() {
                continue;
            }
            let record = match &prim.shape {
                Shape::Mesh(mesh) => {
                    let mut cdf = Vec::with_capacity(mesh.tri_count());
                    let mut acc = 0.0;
                    for f in 0..mesh.tri_count() {
                        acc += mesh.tri_area(f);
                        cdf.push(acc);
                    }
                    LightRecord {
                        prim: i,
                        cdf,
                        area: acc,
                    }
                }
                Shape::Sphere(sphere) => LightRecord {
                    prim: i,
                    cdf: vec![sphere.area()],
                    area: sphere.area(),
                },
            };
            ensure!(record.area > 0.0, "light primitive {} has zero area", i);
            lights.push(record);
        }

        let mut items = Vec::new();
        for (i, prim) in self.primitives.iter().enumerate() {
            for face in 0..prim.shape.item_count() {
                items.push((
                    ItemRef {
                        prim: i as u32,
                        face: face as u32,
                    },
                    prim.shape.item_bounds(face),
                ));
            }
        }

        tracing::debug!(
            primitives = self.primitives.len(),
            lights = lights.len(),
            items = items.len(),
            accel = accel_name,
            "building scene"
        );
        let accel = Bvh::build(items, split_method);

        Ok(Scene {
            camera,
            primitives: self.primitives,
            lights,
            env: self.env,
            medium: self.medium,
            accel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Sphere, TriangleMesh};
    use crate::Point3f;
    use approx::assert_abs_diff_eq;
    use cgmath::SquareMatrix;

    fn quad(z: Float, half: Float) -> TriangleMesh {
        TriangleMesh::new(
            vec![
                Point3f::new(-half, -half, z),
                Point3f::new(half, -half, z),
                Point3f::new(half, half, z),
                Point3f::new(-half, half, z),
            ],
            vec![],
            vec![],
            vec![0, 1, 2, 0, 2, 3],
        )
        .unwrap()
    }

    fn test_camera() -> Camera {
        Camera::new(
            Point3f::new(0.0, 0.0, 5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            45.0,
            1.0,
        )
        .unwrap()
    }

    fn sphere_and_light_scene() -> Scene {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.add_shape(
            Mat4f::identity(),
            Shape::Sphere(Sphere::new(Point3f::new(0.0, 0.0, 0.0), 1.0).unwrap()),
            Material::Diffuse {
                albedo: Vec3f::new(0.8, 0.8, 0.8),
            },
        );
        builder.add_light(
            Mat4f::identity(),
            Shape::Mesh(quad(3.0, 0.5)),
            Material::Diffuse {
                albedo: Vec3f::new(0.0, 0.0, 0.0),
            },
            Vec3f::new(5.0, 5.0, 5.0),
        );
        builder.build("accel::sahbvh", &Props::new()).unwrap()
    }

    #[test]
    fn inverted_interval_misses() {
        let scene = sphere_and_light_scene();
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, 5.0),
            d: Vec3f::new(0.0, 0.0, -1.0),
        };
        assert!(scene.intersect(&ray, 10.0, 1.0).is_none());
        assert!(scene.intersect(&ray, RAY_EPS, INFINITY).is_some());
    }

    #[test]
    fn visibility_is_symmetric() {
        let scene = sphere_and_light_scene();
        // points on opposite sides of the blocking sphere
        let a = SurfacePoint::in_medium(Point3f::new(0.0, 0.0, 2.0));
        let b = SurfacePoint::in_medium(Point3f::new(0.0, 0.0, -2.0));
        let c = SurfacePoint::in_medium(Point3f::new(0.0, 2.0, 2.0));
        assert_eq!(scene.visible(&a, &b), scene.visible(&b, &a));
        assert_eq!(scene.visible(&a, &c), scene.visible(&c, &a));
        assert!(!scene.visible(&a, &b));
        assert!(scene.visible(&a, &c));
    }

    #[test]
    fn hit_on_an_emitter_is_a_light() {
        let scene = sphere_and_light_scene();
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, 5.0),
            d: (Point3f::new(0.3, 0.0, 3.0) - Point3f::new(0.0, 0.0, 5.0)).normalize(),
        };
        let sp = scene.intersect(&ray, RAY_EPS, INFINITY).unwrap();
        assert!(scene.is_light(&sp));
        // seen from the front the emitter radiates; from behind it is dark
        let le = scene.eval_emission(&sp, Vec3f::new(0.0, 0.0, 1.0));
        let back = scene.eval_emission(&sp, Vec3f::new(0.0, 0.0, -1.0));
        assert!(le.x > 0.0 && back.x == 0.0);
    }

    #[test]
    fn light_samples_point_back_at_the_reference() {
        let scene = sphere_and_light_scene();
        let sp = SurfacePoint::in_medium(Point3f::new(0.0, 0.0, 2.0));
        let mut rng = Rng::with_seed(8);
        for _ in 0..100 {
            let s = scene.sample_light(&mut rng, &sp).unwrap();
            // wo points from the light toward the reference point
            let toward_ref = (sp.geom.p - s.sp.geom.p).normalize();
            assert_abs_diff_eq!(s.wo.dot(toward_ref), 1.0, epsilon = 1e-4);
            assert!(s.weight.x >= 0.0 && s.weight.x.is_finite());
        }
    }

    #[test]
    fn no_lights_means_no_light_sample() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.add_shape(
            Mat4f::identity(),
            Shape::Sphere(Sphere::new(Point3f::new(0.0, 0.0, 0.0), 1.0).unwrap()),
            Material::Diffuse {
                albedo: Vec3f::new(0.5, 0.5, 0.5),
            },
        );
        let scene = builder.build("accel::bvh", &Props::new()).unwrap();
        let sp = SurfacePoint::in_medium(Point3f::new(0.0, 0.0, 2.0));
        assert!(scene.sample_light(&mut Rng::with_seed(0), &sp).is_none());
    }

    #[test]
    fn escaping_rays_reach_the_environment() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.set_environment(Vec3f::new(0.5, 0.5, 0.5));
        let scene = builder.build("accel::sahbvh", &Props::new()).unwrap();

        let sp = SurfacePoint::in_medium(Point3f::new(0.0, 0.0, 0.0));
        let wo = Vec3f::new(0.0, 1.0, 0.0);
        let sd = scene
            .sample_distance(&mut Rng::with_seed(0), &sp, wo)
            .unwrap();
        assert!(sd.sp.geom.infinite);
        assert!(scene.is_light(&sd.sp));
        assert_eq!(sd.sp.geom.wo, -wo);
        assert_eq!(
            scene.eval_emission(&sd.sp, sd.sp.geom.wo),
            Vec3f::new(0.5, 0.5, 0.5)
        );
    }

    #[test]
    fn unknown_accelerator_is_a_configuration_error() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        assert!(builder.build("accel::octree", &Props::new()).is_err());
    }

    #[test]
    fn sampled_window_directions_are_unit_length() {
        let scene = sphere_and_light_scene();
        let mut rng = Rng::with_seed(4);
        for _ in 0..64 {
            let s = scene
                .sample_primary_ray(&mut rng, Vec4f::new(0.0, 0.0, 1.0, 1.0), 1.0)
                .unwrap();
            assert_abs_diff_eq!(s.wo.magnitude(), 1.0, epsilon = 1e-5);
        }
    }
}
