use std::sync::Arc;

use crate::film::Film;
use crate::parallel;
use crate::props::Props;
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::{abs_dot, Float, Point2f, Vec3f, INFINITY, RAY_EPS};

/// Deterministic single-bounce renderer: one ray through each pixel
/// center, shaded by the surface reflectance. Useful for checking scene
/// setup before spending samples on a path tracer.
pub struct Raycast {
    film: Arc<Film>,
    bg_color: Vec3f,
    use_constant_color: bool,
    seed: u64,
    num_threads: i32,
}

impl Raycast {
    pub(crate) fn from_props(props: &Props) -> anyhow::Result<Self> {
        Ok(Self {
            film: props.get::<Arc<Film>>("output")?,
            bg_color: props.get_or("bg_color", Vec3f::new(0.0, 0.0, 0.0))?,
            use_constant_color: props.get_or("use_constant_color", false)?,
            seed: props.get_or::<i64>("seed", 0)? as u64,
            num_threads: props.get_or::<i64>("num_threads", -1)? as i32,
        })
    }

    pub fn bg_color(&self) -> Vec3f {
        self.bg_color
    }
}

impl Renderer for Raycast {
    fn render(&self, scene: &Scene) -> anyhow::Result<()> {
        let (w, h) = self.film.size();
        self.film.clear();
        tracing::info!(w, h, "raycast");

        parallel::foreach(
            w as u64 * h as u64,
            self.num_threads,
            self.seed,
            |index, _rng| {
                let x = (index % w as u64) as u32;
                let y = (index / w as u64) as u32;
                let rp = Point2f::new(
                    (x as Float + 0.5) / w as Float,
                    (y as Float + 0.5) / h as Float,
                );
                let ray = scene.primary_ray(rp);
                let sp = match scene.intersect(&ray, RAY_EPS, INFINITY) {
                    Some(sp) => sp,
                    None => {
                        self.film.set_pixel(x, y, self.bg_color);
                        return;
                    }
                };
                let mut color = scene
                    .reflectance(&sp)
                    .unwrap_or_else(|| Vec3f::new(0.0, 0.0, 0.0));
                if !self.use_constant_color {
                    color *= abs_dot(sp.geom.n, -ray.d);
                }
                self.film.set_pixel(x, y, color);
            },
        )
    }
}
