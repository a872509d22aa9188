use std::sync::Arc;

use winit::window::Window;

use crate::{
    camera::CameraUniform,
    data_structures::{scene::Scene, texture},
    engine::{Backend, EngineError, EngineOptions},
    pipelines::{UniformResources, basic::ScenePipelines, light::LightUniform},
    render::{self, MeshCache},
};

const MSAA_SAMPLES: u32 = 4;

/// The wgpu backend: surface, device and everything needed to draw a scene
/// into a window or web canvas.
#[derive(Debug)]
pub struct GpuContext {
    pub(crate) canvas: String,
    #[allow(unused)]
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    pub(crate) msaa_target: Option<texture::Texture>,
    pub(crate) sample_count: u32,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: UniformResources,
    pub light: UniformResources,
    pub pipelines: ScenePipelines,
    pub(crate) meshes: MeshCache,
}

impl GpuContext {
    pub async fn new(
        canvas: &str,
        window: Arc<Window>,
        size: (u32, u32),
        antialias: bool,
        options: &EngineOptions,
    ) -> Result<Self, EngineError> {
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("WGPU setup for canvas `{}`", canvas);
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|source| EngineError::Surface {
                canvas: canvas.to_string(),
                source,
            })?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gallery device"),
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(EngineError::UnsupportedSurface {
                canvas: canvas.to_string(),
            });
        };
        // The shader writes linear colours and relies on an sRGB surface.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(first_format);
        let alpha_mode = if options.premultiplied_alpha
            && surface_caps
                .alpha_modes
                .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0.max(1),
            height: size.1.max(1),
            present_mode: if options.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let sample_count = if antialias
            && adapter
                .get_texture_format_features(surface_format)
                .flags
                .sample_count_supported(MSAA_SAMPLES)
        {
            MSAA_SAMPLES
        } else {
            1
        };
        if antialias && sample_count == 1 {
            log::warn!("Antialiasing requested but {:?} has no MSAA support", surface_format);
        }

        let camera = UniformResources::new(&device, "camera", CameraUniform::new());
        let light = UniformResources::new(&device, "light", LightUniform::from_light(None));
        let pipelines = ScenePipelines::new(
            &device,
            surface_format,
            sample_count,
            &camera.bind_group_layout,
            &light.bind_group_layout,
        );
        let (depth_texture, msaa_target) = Self::attachments(&device, &config, sample_count);

        Ok(Self {
            canvas: canvas.to_string(),
            window,
            depth_texture,
            msaa_target,
            sample_count,
            surface,
            device,
            queue,
            config,
            camera,
            light,
            pipelines,
            meshes: MeshCache::default(),
        })
    }

    fn attachments(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
    ) -> (texture::Texture, Option<texture::Texture>) {
        let size = [config.width, config.height];
        let depth =
            texture::Texture::create_depth_texture(device, size, sample_count, "depth_texture");
        let msaa = (sample_count > 1).then(|| {
            texture::Texture::create_msaa_target(device, size, sample_count, config.format)
        });
        (depth, msaa)
    }

    /// Reapply the current configuration after the surface was lost.
    pub(crate) fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

impl Backend for GpuContext {
    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        let (depth, msaa) = Self::attachments(&self.device, &self.config, self.sample_count);
        self.depth_texture = depth;
        self.msaa_target = msaa;
    }

    fn draw(&mut self, scene: &Scene) -> anyhow::Result<()> {
        render::draw_scene(self, scene)
    }
}
