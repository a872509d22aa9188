//! Wavefront `.obj` with optional `.mtl` diffuse colours.

use std::io::{BufReader, Cursor};

use crate::{
    data_structures::mesh::{DEFAULT_COLOR, Mesh, MeshVertex, Topology, compute_normals},
    resources::{AssetBundle, ImportError, load_string},
};

const FORMAT: &str = "Wavefront OBJ";

pub async fn load(root_url: &str, file_name: &str) -> Result<AssetBundle, ImportError> {
    let obj_text = load_string(root_url, file_name).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let root = root_url.to_string();
    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        move |p| {
            let root = root.clone();
            async move {
                match load_string(&root, &p).await {
                    Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
                    Err(e) => {
                        log::warn!("Material library {p} unavailable: {e}");
                        Err(tobj::LoadError::OpenFileFailed)
                    }
                }
            }
        },
    )
    .await
    .map_err(|e| ImportError::parse(file_name, FORMAT, e))?;

    // Geometry without its materials is still worth showing.
    let materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("Materials of {file_name} could not be loaded: {e}");
        Vec::new()
    });
    let colors: Vec<[f32; 4]> = materials
        .iter()
        .map(|m| match m.diffuse {
            Some([r, g, b]) => [r, g, b, m.dissolve.unwrap_or(1.0)],
            None => DEFAULT_COLOR,
        })
        .collect();

    let meshes = models
        .into_iter()
        .map(|model| {
            let color = model
                .mesh
                .material_id
                .and_then(|id| colors.get(id))
                .copied()
                .unwrap_or(DEFAULT_COLOR);
            build_mesh(model.name, model.mesh, color)
        })
        .collect();

    Ok(AssetBundle {
        meshes,
        ..Default::default()
    })
}

fn build_mesh(name: String, mesh: tobj::Mesh, color: [f32; 4]) -> Mesh {
    let positions: Vec<[f32; 3]> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let normals: Vec<[f32; 3]> = if mesh.normals.len() == mesh.positions.len() {
        mesh.normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect()
    } else {
        compute_normals(&positions, &mesh.indices)
    };
    let vertices = positions
        .iter()
        .zip(&normals)
        .enumerate()
        .map(|(idx, (p, n))| {
            let color = mesh
                .vertex_color
                .get(idx * 3..idx * 3 + 3)
                .map(|c| [c[0], c[1], c[2], color[3]])
                .unwrap_or(color);
            MeshVertex::new(*p, *n, color)
        })
        .collect();
    Mesh::new(name, vertices, mesh.indices, Topology::Triangles)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/assets/");

    #[test]
    fn loads_geometry_and_diffuse_colour() {
        let bundle = block_on(load(FIXTURES, "plinth.obj")).unwrap();
        assert_eq!(bundle.meshes.len(), 1);
        let plinth = &bundle.meshes[0];
        assert_eq!(plinth.name, "plinth");
        assert_eq!(plinth.indices.len(), 6);
        assert!(plinth.vertices.iter().all(|v| v.color == [0.8, 0.7, 0.6, 1.0]));
        assert!(plinth.vertices.iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
    }
}
