use std::path::Path;

use anyhow::Context;

use crate::material::Material;
use crate::shape::TriangleMesh;
use crate::{Float, Point2f, Point3f, Vec3f};

/// One mesh of an OBJ model with its resolved surface response.
pub struct LoadedPrimitive {
    pub mesh: TriangleMesh,
    pub material: Material,
    pub emission: Option<Vec3f>,
}

/// Load a Wavefront OBJ (and its MTL library) into triangle meshes.
///
/// MTL conventions: `Ke` turns a mesh into an area light, `illum 7` maps
/// to glass with `Ni` as the index, `illum 5` to a mirror, a `d` below one
/// to the pass-through mask, anything else to a diffuse surface with `Kd`.
pub fn load_obj<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<LoadedPrimitive>> {
    let path = path.as_ref();
    let span = tracing::debug_span!("load_obj", path = %path.display());
    let _enter = span.enter();
    let start = std::time::Instant::now();

    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .with_context(|| format!("loading obj model {}", path.display()))?;
    let materials = materials.unwrap_or_default();

    let mut prims = Vec::with_capacity(models.len());
    for model in models {
        let name = model.name;
        let mesh = model.mesh;
        let positions = mesh
            .positions
            .chunks_exact(3)
            .map(|p| Point3f::new(p[0], p[1], p[2]))
            .collect();
        let normals = mesh
            .normals
            .chunks_exact(3)
            .map(|n| Vec3f::new(n[0], n[1], n[2]))
            .collect();
        let uvs = mesh
            .texcoords
            .chunks_exact(2)
            .map(|t| Point2f::new(t[0], t[1]))
            .collect();

        let (material, emission) = match mesh.material_id.and_then(|id| materials.get(id)) {
            Some(mtl) => convert_material(mtl),
            None => (
                Material::Diffuse {
                    albedo: Vec3f::new(0.8, 0.8, 0.8),
                },
                None,
            ),
        };

        prims.push(LoadedPrimitive {
            mesh: TriangleMesh::new(positions, normals, uvs, mesh.indices)
                .with_context(|| format!("mesh \"{}\" is malformed", name))?,
            material,
            emission,
        });
    }

    tracing::debug!(
        prims = prims.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "loaded obj model"
    );
    Ok(prims)
}

fn convert_material(mtl: &tobj::Material) -> (Material, Option<Vec3f>) {
    let emission = mtl
        .unknown_param
        .get("Ke")
        .and_then(parse_vec3)
        .filter(|ke| ke.x > 0.0 || ke.y > 0.0 || ke.z > 0.0);

    let material = if mtl.dissolve < 1.0 {
        Material::Mask
    } else {
        match mtl.illumination_model {
            Some(7) => Material::Glass {
                eta: mtl.optical_density.max(1.0),
            },
            Some(5) => Material::Mirror,
            _ => Material::Diffuse {
                albedo: Vec3f::new(mtl.diffuse[0], mtl.diffuse[1], mtl.diffuse[2]),
            },
        }
    };

    (material, emission)
}

fn parse_vec3(s: &String) -> Option<Vec3f> {
    let mut it = s.split_whitespace().map(|c| c.parse::<Float>());
    match (it.next(), it.next(), it.next()) {
        (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => Some(Vec3f::new(x, y, z)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_model() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("lucent_obj_test");
        std::fs::create_dir_all(&dir)?;
        let obj_path = dir.join("tri.obj");
        let mtl_path = dir.join("tri.mtl");

        let mut mtl = std::fs::File::create(&mtl_path)?;
        writeln!(mtl, "newmtl red")?;
        writeln!(mtl, "Kd 0.9 0.1 0.1")?;
        writeln!(mtl, "newmtl lamp")?;
        writeln!(mtl, "Kd 0.0 0.0 0.0")?;
        writeln!(mtl, "Ke 5.0 5.0 5.0")?;

        let mut obj = std::fs::File::create(&obj_path)?;
        writeln!(obj, "mtllib tri.mtl")?;
        writeln!(obj, "v 0 0 0")?;
        writeln!(obj, "v 1 0 0")?;
        writeln!(obj, "v 0 1 0")?;
        writeln!(obj, "v 0 0 1")?;
        writeln!(obj, "o surface")?;
        writeln!(obj, "usemtl red")?;
        writeln!(obj, "f 1 2 3")?;
        writeln!(obj, "o emitter")?;
        writeln!(obj, "usemtl lamp")?;
        writeln!(obj, "f 1 2 4")?;

        let prims = load_obj(&obj_path)?;
        assert_eq!(prims.len(), 2);

        let surface = &prims[0];
        assert_eq!(surface.mesh.tri_count(), 1);
        assert!(surface.emission.is_none());
        match surface.material {
            Material::Diffuse { albedo } => assert!((albedo.x - 0.9).abs() < 1e-5),
            _ => panic!("expected a diffuse surface"),
        }

        let emitter = &prims[1];
        assert_eq!(emitter.emission, Some(Vec3f::new(5.0, 5.0, 5.0)));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_obj("/nonexistent/model.obj").is_err());
    }
}
