//! `.babylon` scene files: JSON with flat vertex arrays per mesh.
//!
//! Only the parts the gallery can show are read: mesh geometry, transforms,
//! parenting, vertex colours and material diffuse colours. Skeletons, particle
//! systems and animation groups are reported by name and size.

use std::collections::HashMap;

use cgmath::{Euler, Matrix, Matrix3, Matrix4, Quaternion, Rad, SquareMatrix, Vector3, Vector4};
use serde::Deserialize;

use crate::{
    data_structures::{
        asset::{AnimationGroup, Bone, ParticleSystem, Skeleton},
        mesh::{DEFAULT_COLOR, Mesh, MeshVertex, Topology, compute_normals},
    },
    resources::{AssetBundle, ImportError, load_string},
};

const FORMAT: &str = "Babylon";
/// Parent chains deeper than this are treated as cycles.
const MAX_PARENT_DEPTH: usize = 64;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonFile {
    meshes: Vec<BabylonMesh>,
    materials: Vec<BabylonMaterial>,
    skeletons: Vec<BabylonSkeleton>,
    particle_systems: Vec<BabylonParticleSystem>,
    animation_groups: Vec<BabylonAnimationGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonMesh {
    name: String,
    id: Option<String>,
    parent_id: Option<String>,
    position: [f32; 3],
    rotation: [f32; 3],
    rotation_quaternion: Option<[f32; 4]>,
    scaling: [f32; 3],
    positions: Vec<f32>,
    normals: Vec<f32>,
    colors: Vec<f32>,
    indices: Vec<u32>,
    material_id: Option<String>,
    check_collisions: bool,
    is_visible: bool,
    is_enabled: bool,
}

impl Default for BabylonMesh {
    fn default() -> Self {
        Self {
            name: String::new(),
            id: None,
            parent_id: None,
            position: [0.0; 3],
            rotation: [0.0; 3],
            rotation_quaternion: None,
            scaling: [1.0; 3],
            positions: Vec::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            indices: Vec::new(),
            material_id: None,
            check_collisions: false,
            is_visible: true,
            is_enabled: true,
        }
    }
}

impl BabylonMesh {
    fn local_matrix(&self) -> Matrix4<f32> {
        // Babylon applies yaw (Y), then pitch (X), then roll (Z).
        let rotation = match self.rotation_quaternion {
            Some([x, y, z, w]) => Quaternion::new(w, x, y, z),
            None => {
                let [x, y, z] = self.rotation;
                Quaternion::from(Euler::new(Rad(0.0), Rad(y), Rad(0.0)))
                    * Quaternion::from(Euler::new(Rad(x), Rad(0.0), Rad(0.0)))
                    * Quaternion::from(Euler::new(Rad(0.0), Rad(0.0), Rad(z)))
            }
        };
        let [sx, sy, sz] = self.scaling;
        Matrix4::from_translation(self.position.into())
            * Matrix4::from(rotation)
            * Matrix4::from_nonuniform_scale(sx, sy, sz)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonMaterial {
    id: String,
    diffuse: Option<[f32; 3]>,
    alpha: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonSkeleton {
    name: String,
    bones: Vec<BabylonBone>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonBone {
    name: String,
    parent_bone_index: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonParticleSystem {
    name: String,
    capacity: usize,
    emitter_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BabylonAnimationGroup {
    name: String,
    from: f32,
    to: f32,
    targeted_animations: Vec<serde_json::Value>,
}

pub async fn load(root_url: &str, file_name: &str) -> Result<AssetBundle, ImportError> {
    let text = load_string(root_url, file_name).await?;
    parse(file_name, &text)
}

/// Parse the contents of a `.babylon` file.
pub fn parse(file_name: &str, text: &str) -> Result<AssetBundle, ImportError> {
    let file: BabylonFile =
        serde_json::from_str(text).map_err(|e| ImportError::parse(file_name, FORMAT, e))?;

    let by_id: HashMap<&str, &BabylonMesh> = file
        .meshes
        .iter()
        .filter_map(|m| m.id.as_deref().map(|id| (id, m)))
        .collect();
    let materials: HashMap<&str, [f32; 4]> = file
        .materials
        .iter()
        .filter_map(|m| {
            let [r, g, b] = m.diffuse?;
            Some((m.id.as_str(), [r, g, b, m.alpha.unwrap_or(1.0)]))
        })
        .collect();

    let meshes = file
        .meshes
        .iter()
        .map(|mesh| {
            let world = world_matrix(file_name, mesh, &by_id)?;
            let color = mesh
                .material_id
                .as_deref()
                .and_then(|id| materials.get(id))
                .copied()
                .unwrap_or(DEFAULT_COLOR);
            build_mesh(file_name, mesh, world, color)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let skeletons = file
        .skeletons
        .into_iter()
        .map(|skeleton| Skeleton {
            name: skeleton.name,
            bones: skeleton
                .bones
                .into_iter()
                .map(|bone| Bone {
                    name: bone.name,
                    parent: bone
                        .parent_bone_index
                        .and_then(|idx| usize::try_from(idx).ok()),
                })
                .collect(),
        })
        .collect();
    let particle_systems = file
        .particle_systems
        .into_iter()
        .map(|ps| ParticleSystem {
            name: ps.name,
            capacity: ps.capacity,
            emitter: ps.emitter_id,
        })
        .collect();
    let animation_groups = file
        .animation_groups
        .into_iter()
        .map(|group| AnimationGroup {
            name: group.name,
            targets: group.targeted_animations.len(),
            from: group.from,
            to: group.to,
        })
        .collect();

    Ok(AssetBundle {
        meshes,
        particle_systems,
        skeletons,
        animation_groups,
    })
}

fn world_matrix(
    file_name: &str,
    mesh: &BabylonMesh,
    by_id: &HashMap<&str, &BabylonMesh>,
) -> Result<Matrix4<f32>, ImportError> {
    let mut matrix = mesh.local_matrix();
    let mut parent_id = mesh.parent_id.as_deref();
    let mut depth = 0;
    while let Some(id) = parent_id {
        let Some(parent) = by_id.get(id) else {
            log::warn!("Mesh `{}` references unknown parent `{}`", mesh.name, id);
            break;
        };
        depth += 1;
        if depth > MAX_PARENT_DEPTH {
            return Err(ImportError::parse(
                file_name,
                FORMAT,
                format!("parent chain of mesh `{}` does not terminate", mesh.name),
            ));
        }
        matrix = parent.local_matrix() * matrix;
        parent_id = parent.parent_id.as_deref();
    }
    Ok(matrix)
}

/// Bake rotation and scale into the vertices; the translation becomes the mesh position.
fn build_mesh(
    file_name: &str,
    source: &BabylonMesh,
    world: Matrix4<f32>,
    color: [f32; 4],
) -> Result<Mesh, ImportError> {
    let invalid = |message: String| ImportError::parse(file_name, FORMAT, message);
    if source.positions.len() % 3 != 0 {
        return Err(invalid(format!(
            "mesh `{}` has {} position components",
            source.name,
            source.positions.len()
        )));
    }
    let vertex_count = source.positions.len() / 3;
    if let Some(index) = source.indices.iter().find(|i| **i as usize >= vertex_count) {
        return Err(invalid(format!(
            "mesh `{}` indexes vertex {} of {}",
            source.name, index, vertex_count
        )));
    }

    let positions: Vec<[f32; 3]> = source
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let normals: Vec<[f32; 3]> = if source.normals.len() == source.positions.len() {
        source
            .normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect()
    } else {
        compute_normals(&positions, &source.indices)
    };

    let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
    let normal_matrix = linear.invert().map(|m| m.transpose()).unwrap_or(linear);
    let vertices = positions
        .iter()
        .zip(&normals)
        .enumerate()
        .map(|(idx, (p, n))| {
            let position = linear * Vector3::from(*p);
            let normal = normal_matrix * Vector3::from(*n);
            let normal = if cgmath::InnerSpace::magnitude2(normal) > f32::EPSILON {
                cgmath::InnerSpace::normalize(normal)
            } else {
                normal
            };
            let vertex_color = source
                .colors
                .get(idx * 4..idx * 4 + 4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .unwrap_or(color);
            MeshVertex::new(position.into(), normal.into(), vertex_color)
        })
        .collect();

    let mut mesh = Mesh::new(
        source.name.clone(),
        vertices,
        source.indices.clone(),
        Topology::Triangles,
    );
    let translation: Vector4<f32> = world.w;
    mesh.position = translation.truncate();
    mesh.check_collisions = source.check_collisions;
    mesh.is_visible = source.is_visible && source.is_enabled;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"{
        "materials": [{ "id": "brick", "diffuse": [0.5, 0.25, 0.0] }],
        "meshes": [
            {
                "name": "root",
                "id": "root",
                "position": [10, 0, 0]
            },
            {
                "name": "wall",
                "id": "wall",
                "parentId": "root",
                "position": [0, 1, 0],
                "scaling": [2, 2, 2],
                "positions": [0, 0, 0, 1, 0, 0, 0, 1, 0],
                "indices": [0, 1, 2],
                "materialId": "brick"
            }
        ],
        "skeletons": [{ "name": "rig", "bones": [
            { "name": "hip", "parentBoneIndex": -1 },
            { "name": "knee", "parentBoneIndex": 0 }
        ] }],
        "particleSystems": [{ "name": "dust", "capacity": 200, "emitterId": "wall" }],
        "animationGroups": [{ "name": "open", "from": 0, "to": 30, "targetedAnimations": [{}, {}] }]
    }"#;

    #[test]
    fn parses_meshes_with_parent_transforms() {
        let bundle = parse("triangle.babylon", TRIANGLE).unwrap();
        assert_eq!(bundle.meshes.len(), 2);

        let root = &bundle.meshes[0];
        assert!(root.is_empty());
        assert_eq!(root.position, Vector3::new(10.0, 0.0, 0.0));

        let wall = &bundle.meshes[1];
        assert_eq!(wall.position, Vector3::new(10.0, 1.0, 0.0));
        assert_eq!(wall.vertices[1].position, [2.0, 0.0, 0.0]);
        assert_eq!(wall.vertices[0].color, [0.5, 0.25, 0.0, 1.0]);
        assert!(!wall.check_collisions);
        // No normals in the file: computed from the triangle.
        assert_eq!(wall.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn reports_the_rest_of_the_bundle() {
        let bundle = parse("triangle.babylon", TRIANGLE).unwrap();
        assert_eq!(bundle.skeletons[0].bones[0].parent, None);
        assert_eq!(bundle.skeletons[0].bones[1].parent, Some(0));
        assert_eq!(bundle.particle_systems[0].capacity, 200);
        assert_eq!(bundle.particle_systems[0].emitter.as_deref(), Some("wall"));
        assert_eq!(bundle.animation_groups[0].targets, 2);
        assert_eq!(bundle.animation_groups[0].to, 30.0);
    }

    #[test]
    fn empty_file_is_an_empty_bundle() {
        let bundle = parse("empty.babylon", "{}").unwrap();
        assert!(bundle.meshes.is_empty());
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let text = r#"{ "meshes": [{ "name": "bad", "positions": [0, 0, 0], "indices": [0, 1, 2] }] }"#;
        let err = parse("bad.babylon", text).unwrap_err();
        assert!(matches!(err, ImportError::Parse { .. }));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let text = r#"{ "meshes": [
            { "name": "a", "id": "a", "parentId": "b" },
            { "name": "b", "id": "b", "parentId": "a" }
        ] }"#;
        assert!(matches!(
            parse("cycle.babylon", text),
            Err(ImportError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            parse("broken.babylon", "{ meshes: "),
            Err(ImportError::Parse { .. })
        ));
    }
}
