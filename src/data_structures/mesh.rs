//! CPU-side meshes and the builders for the gallery's procedural geometry.
//!
//! Meshes keep their vertices in local space and carry a world `position`;
//! the GPU backend bakes the offset in when it uploads them.

use cgmath::{InnerSpace, Vector3, Zero};

/// Vertex layout shared by every mesh the engine draws.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    /// position + normal + rgba colour, tightly packed.
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// How the index buffer of a mesh is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    Lines,
}

pub const DEFAULT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub topology: Topology,
    pub position: Vector3<f32>,
    pub check_collisions: bool,
    pub is_visible: bool,
    pub updatable: bool,
    /// Letter carried by a world axis label plane. Text is not rendered, so the
    /// plane itself shows as a solid square in the axis colour.
    pub label: Option<String>,
}

impl Mesh {
    pub fn new(
        name: impl Into<String>,
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
        topology: Topology,
    ) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            topology,
            position: Vector3::zero(),
            check_collisions: false,
            is_visible: true,
            updatable: false,
            label: None,
        }
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.vertices.iter_mut().for_each(|v| v.color = color);
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() || self.vertices.is_empty()
    }

    /// Vertices with the mesh position applied.
    pub fn world_vertices(&self) -> Vec<MeshVertex> {
        let offset: [f32; 3] = self.position.into();
        self.vertices
            .iter()
            .map(|v| MeshVertex {
                position: [
                    v.position[0] + offset[0],
                    v.position[1] + offset[1],
                    v.position[2] + offset[2],
                ],
                ..*v
            })
            .collect()
    }
}

/// Largest ground grid accepted, in vertices.
pub const MAX_GROUND_VERTICES: u32 = 1 << 20;

/// Ground geometry parameters. Every field has the usual default of 1
/// world unit / 1 subdivision.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundOptions {
    pub width: f32,
    pub height: f32,
    pub subdivisions: u32,
    pub subdivisions_x: Option<u32>,
    pub subdivisions_y: Option<u32>,
    pub updatable: bool,
    /// Collision flag of the finished mesh; omitted means no collisions.
    pub check_collisions: Option<bool>,
}

impl Default for GroundOptions {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            subdivisions: 1,
            subdivisions_x: None,
            subdivisions_y: None,
            updatable: false,
            check_collisions: None,
        }
    }
}

impl GroundOptions {
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn subdivisions(&self) -> (u32, u32) {
        (
            self.subdivisions_x.unwrap_or(self.subdivisions),
            self.subdivisions_y.unwrap_or(self.subdivisions),
        )
    }

    /// Vertices of the grid, `None` when the count does not fit in a `u32`.
    pub fn vertex_count(&self) -> Option<u32> {
        let (sx, sy) = self.subdivisions();
        sx.checked_add(1)?.checked_mul(sy.checked_add(1)?)
    }
}

/// Flat grid in the XZ plane, centred on the origin, facing +Y.
///
/// `options` must describe at most [`MAX_GROUND_VERTICES`] vertices.
pub fn create_ground(name: &str, options: &GroundOptions) -> Mesh {
    let (sx, sy) = options.subdivisions();
    let mut vertices = Vec::with_capacity(options.vertex_count().unwrap_or(0) as usize);
    for row in 0..=sy {
        for col in 0..=sx {
            let x = col as f32 * options.width / sx as f32 - options.width / 2.0;
            let z = (sy - row) as f32 * options.height / sy as f32 - options.height / 2.0;
            vertices.push(MeshVertex::new(
                [x, 0.0, z],
                [0.0, 1.0, 0.0],
                DEFAULT_COLOR,
            ));
        }
    }

    let mut indices = Vec::with_capacity(sx as usize * sy as usize * 6);
    for row in 0..sy {
        for col in 0..sx {
            indices.push(col + 1 + (row + 1) * (sx + 1));
            indices.push(col + 1 + row * (sx + 1));
            indices.push(col + row * (sx + 1));

            indices.push(col + (row + 1) * (sx + 1));
            indices.push(col + 1 + (row + 1) * (sx + 1));
            indices.push(col + row * (sx + 1));
        }
    }

    let mut ground = Mesh::new(name, vertices, indices, Topology::Triangles);
    ground.updatable = options.updatable;
    ground
}

/// A polyline through `points`, drawn as consecutive line segments.
pub fn create_lines(name: &str, points: &[Vector3<f32>], color: [f32; 4]) -> Mesh {
    let vertices = points
        .iter()
        .map(|p| MeshVertex::new((*p).into(), [0.0; 3], color))
        .collect();
    let segments = points.len().saturating_sub(1) as u32;
    let indices = (0..segments).flat_map(|i| [i, i + 1]).collect();
    Mesh::new(name, vertices, indices, Topology::Lines)
}

/// A `size` x `size` quad in the XY plane facing -Z.
pub fn create_plane(name: &str, size: f32) -> Mesh {
    let h = size / 2.0;
    let normal = [0.0, 0.0, -1.0];
    let vertices = vec![
        MeshVertex::new([-h, -h, 0.0], normal, DEFAULT_COLOR),
        MeshVertex::new([h, -h, 0.0], normal, DEFAULT_COLOR),
        MeshVertex::new([h, h, 0.0], normal, DEFAULT_COLOR),
        MeshVertex::new([-h, h, 0.0], normal, DEFAULT_COLOR),
    ];
    let indices = vec![0, 1, 2, 0, 2, 3];
    Mesh::new(name, vertices, indices, Topology::Triangles)
}

/// Smooth per-vertex normals from the triangle list, for assets without normals.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vector3::<f32>::zero(); positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let p0: Vector3<f32> = positions[a].into();
        let p1: Vector3<f32> = positions[b].into();
        let p2: Vector3<f32> = positions[c].into();
        let face = (p1 - p0).cross(p2 - p0);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| {
            if n.magnitude2() > f32::EPSILON {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ground_is_a_single_quad() {
        let ground = create_ground("ground", &GroundOptions::default());
        assert_eq!(ground.vertices.len(), 4);
        assert_eq!(ground.indices.len(), 6);
        assert!(!ground.check_collisions);
        assert!(ground.vertices.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn ground_spans_its_size() {
        let options = GroundOptions {
            subdivisions: 4,
            subdivisions_y: Some(2),
            ..GroundOptions::sized(100.0, 50.0)
        };
        let ground = create_ground("ground", &options);
        assert_eq!(ground.vertices.len(), 5 * 3);
        assert_eq!(ground.indices.len(), 4 * 2 * 6);

        let xs = ground.vertices.iter().map(|v| v.position[0]);
        let zs = ground.vertices.iter().map(|v| v.position[2]);
        assert_eq!(xs.clone().fold(f32::MAX, f32::min), -50.0);
        assert_eq!(xs.fold(f32::MIN, f32::max), 50.0);
        assert_eq!(zs.clone().fold(f32::MAX, f32::min), -25.0);
        assert_eq!(zs.fold(f32::MIN, f32::max), 25.0);
        assert!(ground.indices.iter().all(|i| (*i as usize) < ground.vertices.len()));
    }

    #[test]
    fn lines_connect_consecutive_points() {
        let points = [Vector3::zero(), Vector3::unit_x(), Vector3::unit_y()];
        let lines = create_lines("axis", &points, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(lines.topology, Topology::Lines);
        assert_eq!(lines.indices, vec![0, 1, 1, 2]);
        assert!(lines.vertices.iter().all(|v| v.color == [1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn world_vertices_apply_position() {
        let mut plane = create_plane("label", 2.0);
        plane.position = Vector3::new(0.0, 5.0, 0.0);
        let world = plane.world_vertices();
        assert_eq!(world[0].position, [-1.0, 4.0, 0.0]);
        assert_eq!(world[2].position, [1.0, 6.0, 0.0]);
    }

    #[test]
    fn computed_normals_face_out_of_the_triangle() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = compute_normals(&positions, &[0, 1, 2]);
        assert!(normals.iter().all(|n| *n == [0.0, 0.0, 1.0]));
    }
}
