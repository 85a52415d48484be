use anyhow::ensure;
use cgmath::{ElementWise, InnerSpace};

use crate::bounds::Bounds3f;
use crate::geom::Ray;
use crate::math::{coordinate_system, PI};
use crate::random::Rng;
use crate::{Float, Vec3f};

/// Outcome of sampling a scattering distance along a ray segment.
#[derive(Debug, Clone, Copy)]
pub enum DistanceEvent {
    /// The walk scatters inside the medium at parameter `t`.
    Scatter { t: Float, weight: Vec3f },
    /// The walk crosses the medium and reaches whatever lies at the end of
    /// the segment; `weight` carries transmittance over the pass
    /// probability.
    Pass { weight: Vec3f },
}

/// Homogeneous absorbing and scattering volume filling an axis-aligned
/// bound, with a Henyey-Greenstein phase function (g = 0 is isotropic).
pub struct Medium {
    bound: Bounds3f,
    sigma_a: Vec3f,
    sigma_s: Vec3f,
    g: Float,
}

impl Medium {
    pub fn new(bound: Bounds3f, sigma_a: Vec3f, sigma_s: Vec3f, g: Float) -> anyhow::Result<Self> {
        ensure!(
            sigma_a.x >= 0.0 && sigma_a.y >= 0.0 && sigma_a.z >= 0.0,
            "absorption coefficient must be non-negative"
        );
        ensure!(
            sigma_s.x >= 0.0 && sigma_s.y >= 0.0 && sigma_s.z >= 0.0,
            "scattering coefficient must be non-negative"
        );
        ensure!(g > -1.0 && g < 1.0, "anisotropy must be in (-1, 1), got {}", g);
        Ok(Self {
            bound,
            sigma_a,
            sigma_s,
            g,
        })
    }

    fn sigma_t(&self) -> Vec3f {
        self.sigma_a + self.sigma_s
    }

    /// Scalar density the distance distribution is drawn from.
    fn sampling_density(&self) -> Float {
        let st = self.sigma_t();
        (st.x + st.y + st.z) / 3.0
    }

    /// Transmittance along the segment `[0, t_max]` of the ray, accounting
    /// only for the overlap with the medium bound.
    pub fn transmittance(&self, ray: &Ray, t_max: Float) -> Vec3f {
        match self.bound.intersect_range(ray, 0.0, t_max) {
            Some((t0, t1)) => exp_v(-self.sigma_t() * (t1 - t0)),
            None => Vec3f::new(1.0, 1.0, 1.0),
        }
    }

    /// Sample a scattering distance against the nearest surface at
    /// `t_surf`. The weight is the value (transmittance, and scattering
    /// coefficient for a medium event) over the sampled density.
    pub fn sample_distance(&self, rng: &mut Rng, ray: &Ray, t_surf: Float) -> DistanceEvent {
        let unit = Vec3f::new(1.0, 1.0, 1.0);
        let (t0, t1) = match self.bound.intersect_range(ray, 0.0, t_surf) {
            Some(range) => range,
            None => return DistanceEvent::Pass { weight: unit },
        };

        let density = self.sampling_density();
        if density <= 0.0 {
            return DistanceEvent::Pass { weight: unit };
        }

        let t = t0 - (1.0 - rng.u()).ln() / density;
        if t < t1 {
            // pdf(t) = density * exp(-density * (t - t0))
            let dist = t - t0;
            let tr = exp_v(-self.sigma_t() * dist);
            let pdf = density * (-density * dist).exp();
            DistanceEvent::Scatter {
                t,
                weight: tr.mul_element_wise(self.sigma_s) / pdf,
            }
        } else {
            // crossed the whole overlap; probability exp(-density * (t1 - t0))
            let dist = t1 - t0;
            let tr = exp_v(-self.sigma_t() * dist);
            let pass = (-density * dist).exp();
            DistanceEvent::Pass { weight: tr / pass }
        }
    }

    /// Sample a phase-function direction. `wi` points toward the previous
    /// vertex; the propagation direction is `-wi`.
    pub fn sample_phase(&self, rng: &mut Rng, wi: Vec3f) -> Vec3f {
        let (u1, u2) = rng.u2();
        let cos_theta = if self.g.abs() < 1e-3 {
            1.0 - 2.0 * u1
        } else {
            let g = self.g;
            let s = (1.0 - g * g) / (1.0 - g + 2.0 * g * u1);
            (1.0 + g * g - s * s) / (2.0 * g)
        };
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = 2.0 * PI * u2;

        let fwd = -wi;
        let (t, b) = coordinate_system(fwd);
        (t * (sin_theta * phi.cos()) + b * (sin_theta * phi.sin()) + fwd * cos_theta).normalize()
    }

    /// Phase function value for scattering from propagation direction
    /// `-wi` into `wo`; peaks forward for positive `g`.
    pub fn eval_phase(&self, wi: Vec3f, wo: Vec3f) -> Float {
        let cos_theta = (-wi).dot(wo);
        let g = self.g;
        let denom = (1.0 + g * g - 2.0 * g * cos_theta).max(1e-8);
        (1.0 - g * g) / (4.0 * PI * denom * denom.sqrt())
    }

    pub fn bound(&self) -> Bounds3f {
        self.bound
    }
}

fn exp_v(v: Vec3f) -> Vec3f {
    Vec3f::new(v.x.exp(), v.y.exp(), v.z.exp())
}
