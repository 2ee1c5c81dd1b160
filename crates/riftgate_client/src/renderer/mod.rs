pub mod portal_renderer;
pub mod props;
pub mod sky;
pub mod terrain;
pub mod texture;

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use image::RgbaImage;
use riftgate_shared::heightfield::TerrainMesh;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::renderer::portal_renderer::PortalRenderer;
use crate::renderer::props::PropRenderer;
use crate::renderer::sky::{SkyRenderer, SkyViewBinding};
use crate::renderer::terrain::TerrainRenderer;
use crate::renderer::texture::{create_texture, create_texture_bind_group};
use crate::scene::SceneContext;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const SKY_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.529,
    g: 0.808,
    b: 0.922,
    a: 1.0,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    light_direction: [f32; 4],
    viewport: [f32; 4],
}

impl CameraUniform {
    fn new(view_proj: Mat4, camera_pos: Vec3, light_direction: Vec3, width: f32, height: f32) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: [camera_pos.x, camera_pos.y, camera_pos.z, 0.0],
            light_direction: [light_direction.x, light_direction.y, light_direction.z, 0.0],
            viewport: [width, height, 0.0, 0.0],
        }
    }
}

/// Uniform buffer + bind group for one rendered viewpoint.
struct CameraBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Riftgate Depth Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[derive(Debug)]
pub enum RendererInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    RequestAdapter(wgpu::RequestAdapterError),
    RequestDevice(wgpu::RequestDeviceError),
    UnsupportedSurface,
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSurface(err) => write!(f, "failed to create surface: {err}"),
            Self::RequestAdapter(err) => write!(f, "failed to request adapter: {err}"),
            Self::RequestDevice(err) => write!(f, "failed to request device: {err}"),
            Self::UnsupportedSurface => write!(f, "adapter does not support this surface"),
        }
    }
}

impl std::error::Error for RendererInitError {}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    camera_binding: CameraBinding,
    portal_camera_bindings: Vec<CameraBinding>,
    sky_renderer: SkyRenderer,
    sky_main_binding: SkyViewBinding,
    sky_portal_bindings: Vec<SkyViewBinding>,
    terrain_renderer: TerrainRenderer,
    prop_renderer: PropRenderer,
    portal_renderer: PortalRenderer,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        terrain_mesh: &TerrainMesh,
        height_scale: f32,
        prop_image: &RgbaImage,
        prop_instances: &[Mat4],
        portal_fallback_image: &RgbaImage,
        portal_count: usize,
    ) -> Result<Self, RendererInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(RendererInitError::CreateSurface)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(RendererInitError::RequestAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Riftgate Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(RendererInitError::RequestDevice)?;

        let initial_size = window.inner_size();
        let surface_config = surface
            .get_default_config(&adapter, initial_size.width.max(1), initial_size.height.max(1))
            .ok_or(RendererInitError::UnsupportedSurface)?;

        surface.configure(&device, &surface_config);

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Texture Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let camera_binding = create_camera_binding(&device, &camera_bind_group_layout, "Main");
        let portal_camera_bindings = (0..portal_count)
            .map(|index| {
                create_camera_binding(
                    &device,
                    &camera_bind_group_layout,
                    &format!("Portal {index}"),
                )
            })
            .collect();

        let sky_renderer = SkyRenderer::new(&device, surface_config.format);
        let sky_main_binding = sky_renderer.create_binding(&device, "Sky Uniforms Main");
        let sky_portal_bindings = (0..portal_count)
            .map(|index| sky_renderer.create_binding(&device, &format!("Sky Uniforms Portal {index}")))
            .collect();

        let terrain_renderer = TerrainRenderer::new(
            &device,
            surface_config.format,
            DEPTH_FORMAT,
            &camera_bind_group_layout,
            terrain_mesh,
            height_scale,
        );

        let prop_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Prop Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let (prop_texture, prop_view) = create_texture(&device, &queue, prop_image, "Prop Texture");
        let prop_bind_group = create_texture_bind_group(
            &device,
            &texture_bind_group_layout,
            &prop_view,
            &prop_sampler,
            "Prop Texture Bind Group",
        );
        let prop_renderer = PropRenderer::new(
            &device,
            surface_config.format,
            DEPTH_FORMAT,
            &camera_bind_group_layout,
            &texture_bind_group_layout,
            prop_texture,
            prop_bind_group,
            prop_instances,
        );

        let mut portal_renderer = PortalRenderer::new(
            &device,
            &queue,
            surface_config.format,
            &camera_bind_group_layout,
            portal_count,
            portal_fallback_image,
        );
        portal_renderer.resize(&device, surface_config.width, surface_config.height);

        let depth_texture = DepthTexture::new(&device, surface_config.width, surface_config.height);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            camera_binding,
            portal_camera_bindings,
            sky_renderer,
            sky_main_binding,
            sky_portal_bindings,
            terrain_renderer,
            prop_renderer,
            portal_renderer,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture = DepthTexture::new(&self.device, width, height);
        self.portal_renderer.resize(&self.device, width, height);
    }

    /// Frame order: every linked portal's view goes into its offscreen target
    /// first, then the composite samples those same-frame textures on the
    /// portal surfaces. All passes live in one encoder, so the single queue
    /// submission keeps writes ahead of reads.
    pub fn render_frame(&mut self, scene: &mut SceneContext) -> Result<(), wgpu::SurfaceError> {
        let frame = self.surface.get_current_texture()?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Riftgate Command Encoder"),
            });

        let light_direction = scene.light_direction;

        {
            let queue = &self.queue;
            let sky_renderer = &self.sky_renderer;
            let terrain_renderer = &self.terrain_renderer;
            let prop_renderer = &self.prop_renderer;
            let portal_renderer = &self.portal_renderer;
            let portal_camera_bindings = &self.portal_camera_bindings;
            let sky_portal_bindings = &self.sky_portal_bindings;
            let (rtt_width, rtt_height) = portal_renderer.target_size();
            let encoder = &mut encoder;

            portal_renderer.render_views(
                &mut scene.portals,
                |id, portals, color_view, depth_view| {
                    let portal_view = &portals.get(id).view;
                    let view_proj = portal_view.view_projection();

                    let camera_uniform = CameraUniform::new(
                        view_proj,
                        portal_view.position,
                        light_direction,
                        rtt_width as f32,
                        rtt_height as f32,
                    );
                    queue.write_buffer(
                        &portal_camera_bindings[id.0].buffer,
                        0,
                        bytemuck::bytes_of(&camera_uniform),
                    );
                    sky_renderer.update(
                        queue,
                        &sky_portal_bindings[id.0],
                        view_proj,
                        light_direction,
                    );

                    {
                        let mut render_pass =
                            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                                label: Some("Portal Sky Pass"),
                                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                    view: color_view,
                                    resolve_target: None,
                                    ops: wgpu::Operations {
                                        load: wgpu::LoadOp::Clear(SKY_CLEAR_COLOR),
                                        store: wgpu::StoreOp::Store,
                                    },
                                })],
                                depth_stencil_attachment: None,
                                timestamp_writes: None,
                                occlusion_query_set: None,
                            });
                        sky_renderer.render(&mut render_pass, &sky_portal_bindings[id.0]);
                    }

                    {
                        let mut render_pass =
                            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                                label: Some("Portal Scene Pass"),
                                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                    view: color_view,
                                    resolve_target: None,
                                    ops: wgpu::Operations {
                                        load: wgpu::LoadOp::Load,
                                        store: wgpu::StoreOp::Store,
                                    },
                                })],
                                depth_stencil_attachment: Some(
                                    wgpu::RenderPassDepthStencilAttachment {
                                        view: depth_view,
                                        depth_ops: Some(wgpu::Operations {
                                            load: wgpu::LoadOp::Clear(1.0),
                                            store: wgpu::StoreOp::Store,
                                        }),
                                        stencil_ops: None,
                                    },
                                ),
                                timestamp_writes: None,
                                occlusion_query_set: None,
                            });
                        let camera_bind_group = &portal_camera_bindings[id.0].bind_group;
                        terrain_renderer.render(&mut render_pass, camera_bind_group);
                        prop_renderer.render(&mut render_pass, camera_bind_group);
                        portal_renderer.render_surfaces(
                            queue,
                            &mut render_pass,
                            camera_bind_group,
                            portals,
                            Some(id),
                        );
                    }
                },
            );
        }

        let primary = &scene.camera.projection;
        let view_proj = primary.view_projection();
        let camera_uniform = CameraUniform::new(
            view_proj,
            primary.position,
            light_direction,
            self.surface_config.width as f32,
            self.surface_config.height as f32,
        );
        self.queue.write_buffer(
            &self.camera_binding.buffer,
            0,
            bytemuck::bytes_of(&camera_uniform),
        );
        self.sky_renderer
            .update(&self.queue, &self.sky_main_binding, view_proj, light_direction);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Riftgate Sky Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(SKY_CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.sky_renderer
                .render(&mut render_pass, &self.sky_main_binding);
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Riftgate Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.terrain_renderer
                .render(&mut render_pass, &self.camera_binding.bind_group);
            self.prop_renderer
                .render(&mut render_pass, &self.camera_binding.bind_group);
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Riftgate Portal Surface Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.portal_renderer.render_surfaces(
                &self.queue,
                &mut render_pass,
                &self.camera_binding.bind_group,
                &scene.portals,
                None,
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }
}

fn create_camera_binding(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    label: &str,
) -> CameraBinding {
    let initial = CameraUniform::new(Mat4::IDENTITY, Vec3::ZERO, Vec3::NEG_Y, 1.0, 1.0);
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{label} Camera Uniform Buffer")),
        contents: bytemuck::bytes_of(&initial),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} Camera Bind Group")),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    });

    CameraBinding { buffer, bind_group }
}
