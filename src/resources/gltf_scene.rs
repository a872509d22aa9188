//! glTF 2.0 (`.gltf` with external buffers, or binary `.glb`).

use std::collections::HashMap;

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3};

use crate::{
    data_structures::{
        asset::{AnimationGroup, Bone, Skeleton},
        mesh::{Mesh, MeshVertex, Topology, compute_normals},
    },
    resources::{AssetBundle, ImportError, load_binary},
};

const FORMAT: &str = "glTF";

pub async fn load(root_url: &str, file_name: &str) -> Result<AssetBundle, ImportError> {
    let data = load_binary(root_url, file_name).await?;
    let gltf = gltf::Gltf::from_slice(&data).map_err(|e| ImportError::parse(file_name, FORMAT, e))?;

    // Load buffers
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf.blob.as_deref().ok_or_else(|| {
                    ImportError::parse(file_name, FORMAT, "binary chunk missing")
                })?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                return Err(ImportError::parse(
                    file_name,
                    FORMAT,
                    "embedded data URIs are not supported",
                ));
            }
            gltf::buffer::Source::Uri(uri) => {
                buffer_data.push(load_binary(root_url, uri).await?);
            }
        }
    }

    read_document(file_name, &gltf, &buffer_data)
}

/// Build the bundle from a parsed document and its loaded buffers.
pub fn read_document(
    file_name: &str,
    gltf: &gltf::Document,
    buffer_data: &[Vec<u8>],
) -> Result<AssetBundle, ImportError> {
    let mut meshes = Vec::new();
    let scene = gltf.default_scene().or_else(|| gltf.scenes().next());
    if let Some(scene) = scene {
        for node in scene.nodes() {
            read_node(file_name, &node, Matrix4::identity(), buffer_data, &mut meshes)?;
        }
    }

    let mut parents = HashMap::new();
    for node in gltf.nodes() {
        for child in node.children() {
            parents.insert(child.index(), node.index());
        }
    }
    let skeletons = gltf
        .skins()
        .map(|skin| {
            let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
            let bones = skin
                .joints()
                .map(|joint| Bone {
                    name: joint
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("joint{}", joint.index())),
                    parent: parents
                        .get(&joint.index())
                        .and_then(|parent| joints.iter().position(|j| j == parent)),
                })
                .collect();
            Skeleton {
                name: skin
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("skin{}", skin.index())),
                bones,
            }
        })
        .collect();

    // Load animations
    let animation_groups = gltf
        .animations()
        .map(|animation| {
            let mut from = f32::MAX;
            let mut to = f32::MIN;
            for channel in animation.channels() {
                let reader = channel.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
                if let Some(times) = reader.read_inputs() {
                    for time in times {
                        from = from.min(time);
                        to = to.max(time);
                    }
                }
            }
            if from > to {
                from = 0.0;
                to = 0.0;
            }
            AnimationGroup {
                name: animation
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("animation{}", animation.index())),
                targets: animation.channels().count(),
                from,
                to,
            }
        })
        .collect();

    Ok(AssetBundle {
        meshes,
        particle_systems: Vec::new(),
        skeletons,
        animation_groups,
    })
}

fn read_node(
    file_name: &str,
    node: &gltf::Node,
    parent: Matrix4<f32>,
    buffer_data: &[Vec<u8>],
    meshes: &mut Vec<Mesh>,
) -> Result<(), ImportError> {
    let world = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let base_name = mesh
            .name()
            .or(node.name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh{}", mesh.index()));
        let primitive_count = mesh.primitives().count();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive of `{}` in {}",
                    primitive.mode(),
                    base_name,
                    file_name
                );
                continue;
            }
            let name = if primitive_count > 1 {
                format!("{}_{}", base_name, primitive.index())
            } else {
                base_name.clone()
            };
            meshes.push(read_primitive(file_name, name, &primitive, world, buffer_data)?);
        }
    }
    for child in node.children() {
        read_node(file_name, &child, world, buffer_data, meshes)?;
    }
    Ok(())
}

fn read_primitive(
    file_name: &str,
    name: String,
    primitive: &gltf::Primitive,
    world: Matrix4<f32>,
    buffer_data: &[Vec<u8>],
) -> Result<Mesh, ImportError> {
    let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| ImportError::parse(file_name, FORMAT, format!("`{name}` has no positions")))?
        .collect();
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if let Some(index) = indices.iter().find(|i| **i as usize >= positions.len()) {
        return Err(ImportError::parse(
            file_name,
            FORMAT,
            format!("`{name}` indexes vertex {index} of {}", positions.len()),
        ));
    }
    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(normals) => normals.collect(),
        None => compute_normals(&positions, &indices),
    };
    let base_color = primitive.material().pbr_metallic_roughness().base_color_factor();
    let colors: Option<Vec<[f32; 4]>> = reader.read_colors(0).map(|c| c.into_rgba_f32().collect());

    let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
    let normal_matrix = linear.invert().map(|m| m.transpose()).unwrap_or(linear);
    let vertices = positions
        .iter()
        .zip(normals.iter().chain(std::iter::repeat(&[0.0, 1.0, 0.0])))
        .enumerate()
        .map(|(idx, (p, n))| {
            let normal = normal_matrix * Vector3::from(*n);
            let normal = if normal.magnitude2() > f32::EPSILON {
                normal.normalize()
            } else {
                normal
            };
            let color = colors
                .as_ref()
                .and_then(|c| c.get(idx))
                .map(|c| {
                    [
                        c[0] * base_color[0],
                        c[1] * base_color[1],
                        c[2] * base_color[2],
                        c[3] * base_color[3],
                    ]
                })
                .unwrap_or(base_color);
            MeshVertex::new((linear * Vector3::from(*p)).into(), normal.into(), color)
        })
        .collect();

    let mut mesh = Mesh::new(name, vertices, indices, Topology::Triangles);
    mesh.position = world.w.truncate();
    Ok(mesh)
}
