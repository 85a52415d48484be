use cgmath::ElementWise;

use crate::geom::SurfacePoint;
use crate::math::{is_zero, max_component};
use crate::parallel;
use crate::props::Props;
use crate::random::Rng;
use crate::renderer::{PathOpts, Renderer};
use crate::scene::Scene;
use crate::{Float, Vec3f, Vec4f, INFINITY, RAY_EPS};

/// Unidirectional path tracer over surfaces only. Light is picked up when
/// a sampled ray happens to hit an emitter; no explicit light sampling.
pub struct PathTracer {
    opts: PathOpts,
}

impl PathTracer {
    pub(crate) fn from_props(props: &Props) -> anyhow::Result<Self> {
        Ok(Self {
            opts: PathOpts::from_props(props)?,
        })
    }

    fn sample_walk(&self, scene: &Scene, rng: &mut Rng, window: Vec4f, aspect: Float) -> Vec3f {
        let mut l = Vec3f::new(0.0, 0.0, 0.0);
        let mut throughput = Vec3f::new(1.0, 1.0, 1.0);
        // current vertex and the direction back toward the previous one;
        // empty while standing at the camera
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

            throughput = throughput.mul_element_wise(s.weight);

            // intersection to the next surface
            let hit = match scene.intersect(&s.ray(), RAY_EPS, INFINITY) {
                Some(hit) => hit,
                None => break,
            };

            // accumulate contribution from an emitter
            if scene.is_light(&hit) {
                l += throughput.mul_element_wise(scene.eval_emission(&hit, -s.wo));
            }

            // Russian roulette
            if length > 3 {
                let q = Float::max(0.2, 1.0 - max_component(throughput));
                if rng.u() < q {
                    break;
                }
                throughput /= 1.0 - q;
            }

            vertex = Some((hit, -s.wo));
        }

        l
    }
}

impl Renderer for PathTracer {
    fn render(&self, scene: &Scene) -> anyhow::Result<()> {
        let film = &self.opts.film;
        film.clear();
        let (w, h) = film.size();
        let aspect = film.aspect();
        let spp = self.opts.spp;
        tracing::info!(w, h, spp, max_length = self.opts.max_length, "pt_naive");

        parallel::foreach(
            w as u64 * h as u64,
            self.opts.num_threads,
            self.opts.seed,
            |index, rng| {
                let x = (index % w as u64) as u32;
                let y = (index / w as u64) as u32;
                let window = Vec4f::new(
                    x as Float / w as Float,
                    y as Float / h as Float,
                    1.0 / w as Float,
                    1.0 / h as Float,
                );

                let mut l = Vec3f::new(0.0, 0.0, 0.0);
                for _ in 0..spp {
                    l += self.sample_walk(scene, rng, window, aspect);
                }
                if spp > 0 {
                    l /= spp as Float;
                }
                film.set_pixel(x, y, l);
            },
        )
    }
}
