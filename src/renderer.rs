use std::sync::Arc;

use anyhow::{bail, ensure};

use crate::film::Film;
use crate::props::Props;
use crate::scene::Scene;

pub mod pt_naive;
pub mod raycast;
pub mod volpt;
pub mod volpt_naive;

pub use self::pt_naive::PathTracer;
pub use self::raycast::Raycast;
pub use self::volpt::VolPathTracer;
pub use self::volpt_naive::NaiveVolPathTracer;

/// A renderer drives walks over the scene and writes the estimate into its
/// output film.
pub trait Renderer: Send + Sync {
    fn render(&self, scene: &Scene) -> anyhow::Result<()>;
}

/// Construct a renderer by name from a property bag. Unknown names and
/// invalid options are configuration errors; nothing is left half-built.
pub fn create(name: &str, props: &Props) -> anyhow::Result<Box<dyn Renderer>> {
    match name {
        "renderer::raycast" => Ok(Box::new(Raycast::from_props(props)?)),
        "renderer::pt_naive" => Ok(Box::new(PathTracer::from_props(props)?)),
        "renderer::volpt_naive" => Ok(Box::new(NaiveVolPathTracer::from_props(props)?)),
        "renderer::volpt" => Ok(Box::new(VolPathTracer::from_props(props)?)),
        _ => bail!("unknown renderer \"{}\"", name),
    }
}

/// Options shared by the path-tracing integrators.
#[derive(Clone)]
pub(crate) struct PathOpts {
    pub film: Arc<Film>,
    pub spp: i64,
    pub max_length: u32,
    pub seed: u64,
    pub num_threads: i32,
}

impl PathOpts {
    pub(crate) fn from_props(props: &Props) -> anyhow::Result<Self> {
        let film = props.get::<Arc<Film>>("output")?;
        let spp = props.get::<i64>("spp")?;
        ensure!(spp >= 0, "spp must be non-negative, got {}", spp);
        let max_length = props.get::<i64>("max_length")?;
        ensure!(
            max_length >= 0,
            "max_length must be non-negative, got {}",
            max_length
        );
        Ok(Self {
            film,
            spp,
            max_length: max_length as u32,
            seed: props.get_or::<i64>("seed", 0)? as u64,
            num_threads: props.get_or::<i64>("num_threads", -1)? as i32,
        })
    }
}
