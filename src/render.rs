//! Per-frame drawing for the wgpu backend.
//!
//! Meshes are uploaded lazily into a [`MeshCache`] indexed like the scene's
//! mesh arena. Triangle meshes go through the lit pipeline first, then line
//! meshes (the world axes) through the unlit one, all in a single pass.

use anyhow::Context as _;
use wgpu::util::DeviceExt;

use crate::{
    camera::CameraUniform,
    context::GpuContext,
    data_structures::{
        mesh::{Mesh, Topology},
        scene::Scene,
    },
    pipelines::light::LightUniform,
};

/// What a cached upload was built from.
#[derive(Clone, Debug, PartialEq)]
struct Fingerprint {
    vertices: usize,
    indices: usize,
    position: [f32; 3],
    color: Option<[f32; 4]>,
}

impl Fingerprint {
    fn of(mesh: &Mesh) -> Self {
        Self {
            vertices: mesh.vertices.len(),
            indices: mesh.indices.len(),
            position: mesh.position.into(),
            color: mesh.vertices.first().map(|v| v.color),
        }
    }
}

#[derive(Debug)]
pub(crate) struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    fingerprint: Fingerprint,
}

#[derive(Debug, Default)]
pub(crate) struct MeshCache {
    entries: Vec<Option<GpuMesh>>,
}

impl MeshCache {
    /// Upload meshes that are new or changed since the last frame.
    pub(crate) fn sync(&mut self, device: &wgpu::Device, meshes: &[Mesh]) {
        self.entries.resize_with(meshes.len(), || None);
        for (entry, mesh) in self.entries.iter_mut().zip(meshes) {
            if mesh.is_empty() {
                *entry = None;
                continue;
            }
            let fingerprint = Fingerprint::of(mesh);
            if entry.as_ref().is_some_and(|e| e.fingerprint == fingerprint) {
                continue;
            }
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Vertex Buffer", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.world_vertices()),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Index Buffer", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            *entry = Some(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
                fingerprint,
            });
        }
    }

    fn drawable<'a>(
        &'a self,
        meshes: &'a [Mesh],
        topology: Topology,
    ) -> impl Iterator<Item = &'a GpuMesh> + 'a {
        self.entries
            .iter()
            .zip(meshes)
            .filter(move |(_, mesh)| mesh.is_visible && mesh.topology == topology)
            .filter_map(|(entry, _)| entry.as_ref())
    }
}

pub(crate) fn draw_scene(ctx: &mut GpuContext, scene: &Scene) -> anyhow::Result<()> {
    ctx.meshes.sync(&ctx.device, scene.meshes());

    let aspect = ctx.config.width as f32 / ctx.config.height.max(1) as f32;
    let mut camera_uniform = CameraUniform::new();
    if let Some(camera) = scene.active_camera() {
        camera_uniform.update_view_proj(camera, aspect);
    }
    ctx.camera.write(&ctx.queue, camera_uniform);
    ctx.light
        .write(&ctx.queue, LightUniform::from_light(scene.main_light()));

    let output = match ctx.surface.get_current_texture() {
        Ok(output) => output,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            log::warn!("Surface of canvas `{}` lost, reconfiguring", ctx.canvas);
            ctx.reconfigure();
            return Ok(());
        }
        Err(wgpu::SurfaceError::Timeout) => {
            log::warn!("Surface of canvas `{}` timed out, skipping frame", ctx.canvas);
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("no surface texture for `{}`", ctx.canvas));
        }
    };
    let frame_view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
    {
        let (view, resolve_target) = match &ctx.msaa_target {
            Some(msaa) => (&msaa.view, Some(&frame_view)),
            None => (&frame_view, None),
        };
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(scene.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.depth_texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        render_pass.set_bind_group(1, &ctx.light.bind_group, &[]);

        for (pipeline, topology) in [
            (&ctx.pipelines.meshes, Topology::Triangles),
            (&ctx.pipelines.lines, Topology::Lines),
        ] {
            render_pass.set_pipeline(pipeline);
            for mesh in ctx.meshes.drawable(scene.meshes(), topology) {
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
    }

    ctx.queue.submit(std::iter::once(encoder.finish()));
    output.present();
    Ok(())
}
