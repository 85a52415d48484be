use cgmath::ElementWise;

use crate::geom::SurfacePoint;
use crate::math::{is_zero, max_component};
use crate::parallel;
use crate::props::Props;
use crate::random::Rng;
use crate::renderer::{PathOpts, Renderer};
use crate::scene::Scene;
use crate::{Float, Vec3f, Vec4f};

/// Volumetric path tracer with next-event estimation: at every
/// non-specular vertex after the first, a light is sampled explicitly
/// through the medium. Emission found by distance sampling is then skipped
/// on those vertices so direct light is not counted twice.
pub struct VolPathTracer {
    opts: PathOpts,
}

impl VolPathTracer {
    pub(crate) fn from_props(props: &Props) -> anyhow::Result<Self> {
        Ok(Self {
            opts: PathOpts::from_props(props)?,
        })
    }

    fn sample_walk(&self, scene: &Scene, rng: &mut Rng, window: Vec4f, aspect: Float) -> Vec3f {
        let mut l = Vec3f::new(0.0, 0.0, 0.0);
        let mut throughput = Vec3f::new(1.0, 1.0, 1.0);
        // direction back toward the previous vertex; arbitrary until the
        // first scattering vertex, where next-event estimation begins
        let mut wi = Vec3f::new(0.0, 0.0, 0.0);
        let mut vertex: Option<SurfacePoint> = None;

        for length in 0..self.opts.max_length {
            // sample a ray
            let s = match &vertex {
                None => scene.sample_primary_ray(rng, window, aspect),
                Some(sp) => scene.sample_ray(rng, sp, wi),
            };
            let s = match s {
                Some(s) if !is_zero(s.weight) => s,
                _ => break,
            };

            // next-event estimation edge toward a sampled light
            let nee = length > 0 && !scene.is_specular(&s.sp);
            if nee {
                if let Some(sl) = scene.sample_light(rng, &s.sp) {
                    if let Some(tr) = scene.eval_transmittance(rng, &s.sp, &sl.sp) {
                        let wo = -sl.wo;
                        let fs = scene.eval_scatter(&s.sp, wi, wo);
                        l += throughput
                            .mul_element_wise(tr)
                            .mul_element_wise(fs)
                            .mul_element_wise(sl.weight);
                    }
                }
            }

            // sample the next scene interaction
            let sd = match scene.sample_distance(rng, &s.sp, s.wo) {
                Some(sd) => sd,
                None => break,
            };

            throughput = throughput
                .mul_element_wise(s.weight)
                .mul_element_wise(sd.weight);

            // emission reached by the distance sample counts only where the
            // light was not already sampled explicitly at this vertex
            if !nee && scene.is_light(&sd.sp) {
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

            wi = -s.wo;
            vertex = Some(sd.sp);
        }

        l
    }
}

impl Renderer for VolPathTracer {
    fn render(&self, scene: &Scene) -> anyhow::Result<()> {
        let film = &self.opts.film;
        film.clear();
        let (w, h) = film.size();
        let aspect = film.aspect();
        let spp = self.opts.spp;
        tracing::info!(w, h, spp, max_length = self.opts.max_length, "volpt");
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
