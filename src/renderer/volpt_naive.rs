use cgmath::ElementWise;

use crate::geom::SurfacePoint;
use crate::math::{is_zero, max_component};
use crate::parallel;
use crate::props::Props;
use crate::random::Rng;
use crate::renderer::{PathOpts, Renderer};
use crate::scene::Scene;
use crate::{Float, Vec3f, Vec4f};

/// Volumetric path tracer without explicit light sampling: every step is a
/// distance sample, so walks scatter in the medium as well as on surfaces.
/// Samples are splatted, one walk per index of the `w*h*spp` space.
pub struct NaiveVolPathTracer {
    opts: PathOpts,
}

impl NaiveVolPathTracer {
    pub(crate) fn from_props(props: &Props) -> anyhow::Result<Self> {
        Ok(Self {
            opts: PathOpts::from_props(props)?,
        })
    }

    fn sample_walk(&self, scene: &Scene, rng: &mut Rng, window: Vec4f, aspect: Float) -> Vec3f {
        let mut l = Vec3f::new(0.0, 0.0, 0.0);
        let mut throughput = Vec3f::new(1.0, 1.0, 1.0);
        let mut vertex: Option<(SurfacePoint, Vec3f)> = None;

        for length in 0..self.opts.max_length {
            // sample a ray
            let s = match &vertex {
                None => scene.sample_primary_ray(rng, window, aspect),
                Some((sp, wi)) => scene.sample_ray(rng, sp, *wi),
            };
            let s = match s {
                Some(s) if !is_zero(s.weight) => s,
                _ => break,
            };

            // sample the next scene interaction
            let sd = match scene.sample_distance(rng, &s.sp, s.wo) {
                Some(sd) => sd,
                None => break,
            };

            throughput = throughput
                .mul_element_wise(s.weight)
                .mul_element_wise(sd.weight);

            // accumulate contribution from an emissive interaction
            if scene.is_light(&sd.sp) {
                l += throughput.mul_element_wise(scene.eval_emission(&sd.sp, -s.wo));
            }

            // Russian roulette
            if length > 3 {
                let q = Float::max(0.2, 1.0 - max_component(throughput));
                if rng.u() < q {
                    break;
                }
                throughput /= 1.0 - q;
            }

            vertex = Some((sd.sp, -s.wo));
        }

        l
    }
}

impl Renderer for NaiveVolPathTracer {
    fn render(&self, scene: &Scene) -> anyhow::Result<()> {
        let film = &self.opts.film;
        film.clear();
        let (w, h) = film.size();
        let aspect = film.aspect();
        let spp = self.opts.spp;
        tracing::info!(w, h, spp, max_length = self.opts.max_length, "volpt_naive");
        if spp == 0 {
            return Ok(());
        }

        let num_samples = w as u64 * h as u64 * spp as u64;
        parallel::foreach(
            num_samples,
            self.opts.num_threads,
            self.opts.seed,
            |index, rng| {
                let j = index / spp as u64;
                let x = (j % w as u64) as u32;
                let y = (j / w as u64) as u32;
                let window = Vec4f::new(
                    x as Float / w as Float,
                    y as Float / h as Float,
                    1.0 / w as Float,
                    1.0 / h as Float,
                );

                let l = self.sample_walk(scene, rng, window, aspect);
                film.splat_pixel(x, y, l / spp as Float);
            },
        )
    }
}
