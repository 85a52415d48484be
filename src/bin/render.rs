use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lucent::camera::Camera;
use lucent::film::Film;
use lucent::loaders;
use lucent::props::Props;
use lucent::renderer;
use lucent::scene::SceneBuilder;
use lucent::shape::Shape;
use lucent::{Float, Mat4f, Point3f, Vec3f};

use cgmath::SquareMatrix;

/// Render an OBJ scene to a PFM image (or a PNG preview).
#[derive(Parser)]
#[command(name = "render")]
struct Args {
    /// OBJ model to render
    obj: PathBuf,
    /// Output image (.pfm, or .png for a preview)
    out: PathBuf,
    w: u32,
    h: u32,
    #[arg(allow_negative_numbers = true)]
    eye_x: Float,
    #[arg(allow_negative_numbers = true)]
    eye_y: Float,
    #[arg(allow_negative_numbers = true)]
    eye_z: Float,
    #[arg(allow_negative_numbers = true)]
    lookat_x: Float,
    #[arg(allow_negative_numbers = true)]
    lookat_y: Float,
    #[arg(allow_negative_numbers = true)]
    lookat_z: Float,
    /// Vertical field of view in degrees
    vfov: Float,

    /// Integrator to run
    #[arg(long, default_value = "renderer::raycast")]
    renderer: String,
    /// Samples per pixel for the path tracers
    #[arg(long, default_value_t = 16)]
    spp: i64,
    /// Maximum number of path vertices
    #[arg(long, default_value_t = 8)]
    max_length: i64,
    #[arg(long, default_value_t = 0)]
    seed: i64,
    /// Worker threads; -1 uses all hardware threads
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    threads: i64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let film = Arc::new(Film::new(args.w, args.h)?);
    let camera = Camera::new(
        Point3f::new(args.eye_x, args.eye_y, args.eye_z),
        Point3f::new(args.lookat_x, args.lookat_y, args.lookat_z),
        Vec3f::new(0.0, 1.0, 0.0),
        args.vfov,
        film.aspect(),
    )?;

    let mut builder = SceneBuilder::new();
    builder.set_camera(camera);
    for prim in loaders::load_obj(&args.obj)? {
        builder.add_primitive(
            Mat4f::identity(),
            Shape::Mesh(prim.mesh),
            prim.material,
            prim.emission,
        );
    }
    let scene = builder.build("accel::sahbvh", &Props::new())?;

    let props = Props::new()
        .with("output", Arc::clone(&film))
        .with("spp", args.spp)
        .with("max_length", args.max_length)
        .with("seed", args.seed)
        .with("num_threads", args.threads);
    let renderer = renderer::create(&args.renderer, &props)?;
    renderer.render(&scene)?;

    match args.out.extension().and_then(|e| e.to_str()) {
        Some("png") => film.save_png(&args.out)?,
        _ => film.save_pfm(&args.out)?,
    }
    tracing::info!(out = %args.out.display(), "wrote image");
    Ok(())
}
