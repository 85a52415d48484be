use cgmath::InnerSpace;

use crate::geom::PointGeometry;
use crate::math::{
    coordinate_system, cosine_sample_hemisphere, face_forward, reflect, refract, FRAC_1_PI,
};
use crate::random::Rng;
use crate::{abs_dot, Float, Vec3f};

/// Sampled scattering direction with its value over probability density.
#[derive(Debug, Clone, Copy)]
pub struct DirectionSample {
    pub wo: Vec3f,
    pub weight: Vec3f,
}

/// Surface response. `wi` always points from the surface toward the
/// previous path vertex; sampled directions point toward the next one.
#[derive(Debug, Clone)]
pub enum Material {
    /// Lambertian reflector.
    Diffuse { albedo: Vec3f },
    /// Ideal specular reflector.
    Mirror,
    /// Smooth dielectric with relative refractive index `eta`.
    Glass { eta: Float },
    /// Pass-through delta material: scatters straight through the surface
    /// without deflection. Used for cut-out geometry.
    Mask,
}

impl Material {
    pub fn is_specular(&self) -> bool {
        match self {
            Material::Diffuse { .. } => false,
            Material::Mirror | Material::Glass { .. } | Material::Mask => true,
        }
    }

    pub fn sample(&self, rng: &mut Rng, geom: &PointGeometry, wi: Vec3f) -> Option<DirectionSample> {
        match *self {
            Material::Diffuse { albedo } => {
                if abs_dot(wi, geom.n) == 0.0 {
                    return None;
                }
                // scatter on the hemisphere facing the incident direction;
                // the cosine and the density cancel against the pdf
                let n = face_forward(geom.n, wi);
                let (t, b) = coordinate_system(n);
                let local = cosine_sample_hemisphere(rng.u(), rng.u());
                let wo = (t * local.x + b * local.y + n * local.z).normalize();
                Some(DirectionSample { wo, weight: albedo })
            }
            Material::Mirror => {
                let n = face_forward(geom.n, wi);
                Some(DirectionSample {
                    wo: reflect(wi, n),
                    weight: Vec3f::new(1.0, 1.0, 1.0),
                })
            }
            Material::Glass { eta } => {
                let entering = wi.dot(geom.n) > 0.0;
                let n = face_forward(geom.n, wi);
                let eta_rel = if entering { 1.0 / eta } else { eta };
                let fr = fresnel_dielectric(wi.dot(n), eta_rel);
                let wo = if rng.u() < fr {
                    reflect(wi, n)
                } else {
                    match refract(wi, n, eta_rel) {
                        Some(wt) => wt.normalize(),
                        // total internal reflection has fr = 1, so this
                        // branch is unreachable in exact arithmetic
                        None => reflect(wi, n),
                    }
                };
                // selection probability equals the Fresnel weight, so both
                // lobes carry unit throughput
                Some(DirectionSample {
                    wo,
                    weight: Vec3f::new(1.0, 1.0, 1.0),
                })
            }
            Material::Mask => Some(DirectionSample {
                wo: -wi,
                weight: Vec3f::new(1.0, 1.0, 1.0),
            }),
        }
    }

    /// BSDF times the outgoing cosine. Zero for delta materials and for
    /// direction pairs on opposite sides of a reflector.
    pub fn eval(&self, geom: &PointGeometry, wi: Vec3f, wo: Vec3f) -> Vec3f {
        match *self {
            Material::Diffuse { albedo } => {
                if wi.dot(geom.n) * wo.dot(geom.n) <= 0.0 {
                    return Vec3f::new(0.0, 0.0, 0.0);
                }
                albedo * FRAC_1_PI * abs_dot(wo, geom.n)
            }
            Material::Mirror | Material::Glass { .. } | Material::Mask => {
                Vec3f::new(0.0, 0.0, 0.0)
            }
        }
    }

    /// Closed-form albedo, when the material has one.
    pub fn reflectance(&self) -> Option<Vec3f> {
        match *self {
            Material::Diffuse { albedo } => Some(albedo),
            _ => None,
        }
    }
}

/// Unpolarized Fresnel reflectance for a smooth dielectric. `cos_i` is the
/// incident cosine against the interface normal, `eta_rel` the incident
/// over transmitted index ratio.
pub fn fresnel_dielectric(cos_i: Float, eta_rel: Float) -> Float {
    let cos_i = cos_i.min(1.0).max(0.0);
    let sin2_t = eta_rel * eta_rel * (1.0 - cos_i * cos_i);
    if sin2_t >= 1.0 {
        return 1.0;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    // note eta_rel = eta_i / eta_t
    let r_parl = (cos_i - eta_rel * cos_t) / (cos_i + eta_rel * cos_t);
    let r_perp = (eta_rel * cos_i - cos_t) / (eta_rel * cos_i + cos_t);
    0.5 * (r_parl * r_parl + r_perp * r_perp)
}
