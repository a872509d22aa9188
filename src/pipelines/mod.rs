//! Render pipelines and the uniform plumbing they share.
//!
//! - `basic`: the lit mesh pipeline and the unlit line pipeline
//! - `light`: the hemispheric light uniform

use wgpu::util::DeviceExt;

pub mod basic;
pub mod light;

/// A uniform buffer with its layout and bind group, bound at one slot.
#[derive(Debug)]
pub struct UniformResources {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl UniformResources {
    pub fn new<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: T) -> Self {
        let buffer = mk_buffer(device, label, value);
        let bind_group_layout = mk_bind_group_layout(device, label);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer, label);
        Self {
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn write<T: bytemuck::Pod>(&self, queue: &wgpu::Queue, value: T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[value]));
    }
}

pub fn mk_buffer<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&[value]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
        label: Some(label),
    })
}
