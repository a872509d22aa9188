use crate::data_structures::{mesh::MeshVertex, texture::Texture};

/// The two pipelines a scene is drawn with.
#[derive(Debug)]
pub struct ScenePipelines {
    pub meshes: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
}

impl ScenePipelines {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        sample_count: u32,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        light_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[camera_bind_group_layout, light_bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = || wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("scene.wgsl").into()),
        };
        // Premultiplied so the transparent clear colour composites with the page.
        let blend = Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING);

        let meshes = mk_render_pipeline(
            device,
            &layout,
            PipelineTarget {
                color_format,
                blend,
                depth_format: Some(Texture::DEPTH_FORMAT),
                sample_count,
            },
            wgpu::PrimitiveTopology::TriangleList,
            &[MeshVertex::desc()],
            shader(),
            "fs_main",
        );
        let lines = mk_render_pipeline(
            device,
            &layout,
            PipelineTarget {
                color_format,
                blend,
                depth_format: Some(Texture::DEPTH_FORMAT),
                sample_count,
            },
            wgpu::PrimitiveTopology::LineList,
            &[MeshVertex::desc()],
            shader(),
            "fs_unlit",
        );
        Self { meshes, lines }
    }
}

/// Where a pipeline writes to.
#[derive(Clone, Copy, Debug)]
pub struct PipelineTarget {
    pub color_format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    target: PipelineTarget,
    topology: wgpu::PrimitiveTopology,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
    fragment_entry: &str,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(fragment_entry),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: target.color_format,
                blend: target.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Ground and label planes are seen from both sides.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: target.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: target.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}
