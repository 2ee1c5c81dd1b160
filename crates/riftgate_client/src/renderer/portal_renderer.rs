use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use image::RgbaImage;
use riftgate_shared::portal::{PortalId, PortalSet};
use wgpu::util::DeviceExt;

use crate::renderer::texture::{create_texture, create_texture_bind_group};

const PORTAL_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Offscreen targets run at half resolution; screen-space sampling hides it.
const RTT_SCALE: f32 = 0.5;

const PORTAL_TINTS: [[f32; 4]; 2] = [
    [1.0, 165.0 / 255.0, 0.0, 1.0],
    [0.0, 130.0 / 255.0, 1.0, 1.0],
];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PortalVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

impl PortalVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<PortalVertex>() as wgpu::BufferAddress,
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
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PortalParamsUniform {
    model: [[f32; 4]; 4],
    tint: [f32; 4],
    linked: f32,
    _padding: [f32; 3],
}

/// Framebuffer stand-in: color to sample later, depth for the offscreen pass.
struct PortalRenderTarget {
    _color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    sample_bind_group: wgpu::BindGroup,
}

pub struct PortalRenderer {
    surface_pipeline: wgpu::RenderPipeline,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    params_buffers: Vec<wgpu::Buffer>,
    params_bind_groups: Vec<wgpu::BindGroup>,
    fallback_bind_group: wgpu::BindGroup,
    _fallback_texture: wgpu::Texture,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,
    quad_index_count: u32,
    sampler: wgpu::Sampler,
    targets: Vec<PortalRenderTarget>,
    target_width: u32,
    target_height: u32,
    surface_format: wgpu::TextureFormat,
}

impl PortalRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        portal_count: usize,
        fallback_image: &RgbaImage,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Portal Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/portal_surface.wgsl"
                ))
                .into(),
            ),
        });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Texture Bind Group Layout"),
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

        let params_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Params Bind Group Layout"),
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

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Portal Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let initial_params = PortalParamsUniform {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            tint: PORTAL_TINTS[0],
            linked: 0.0,
            _padding: [0.0; 3],
        };
        let params_buffers: Vec<wgpu::Buffer> = (0..portal_count)
            .map(|index| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Portal Params Buffer {index}")),
                    contents: bytemuck::bytes_of(&initial_params),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                })
            })
            .collect();
        let params_bind_groups = params_buffers
            .iter()
            .enumerate()
            .map(|(index, buffer)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Portal Params Bind Group {index}")),
                    layout: &params_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let (fallback_texture, fallback_view) =
            create_texture(device, queue, fallback_image, "Portal Fallback Texture");
        let fallback_bind_group = create_texture_bind_group(
            device,
            &texture_bind_group_layout,
            &fallback_view,
            &sampler,
            "Portal Fallback Bind Group",
        );

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Portal Surface Pipeline Layout"),
            bind_group_layouts: &[
                camera_bind_group_layout,
                &texture_bind_group_layout,
                &params_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let surface_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Portal Surface Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[PortalVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Both sides are walkable, so the quad is visible from both.
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: PORTAL_DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let quad_vertices = [
            PortalVertex {
                position: [-1.0, -1.0, 0.0],
                uv: [0.0, 1.0],
            },
            PortalVertex {
                position: [1.0, -1.0, 0.0],
                uv: [1.0, 1.0],
            },
            PortalVertex {
                position: [1.0, 1.0, 0.0],
                uv: [1.0, 0.0],
            },
            PortalVertex {
                position: [-1.0, 1.0, 0.0],
                uv: [0.0, 0.0],
            },
        ];
        let quad_indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Portal Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&quad_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Portal Quad Index Buffer"),
            contents: bytemuck::cast_slice(&quad_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let targets = create_targets(
            device,
            portal_count,
            1,
            1,
            surface_format,
            &texture_bind_group_layout,
            &sampler,
        );

        Self {
            surface_pipeline,
            texture_bind_group_layout,
            params_buffers,
            params_bind_groups,
            fallback_bind_group,
            _fallback_texture: fallback_texture,
            quad_vertex_buffer,
            quad_index_buffer,
            quad_index_count: quad_indices.len() as u32,
            sampler,
            targets,
            target_width: 1,
            target_height: 1,
            surface_format,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let target_width = scaled_dimension(width);
        let target_height = scaled_dimension(height);
        if target_width == self.target_width && target_height == self.target_height {
            return;
        }

        self.targets = create_targets(
            device,
            self.targets.len(),
            target_width,
            target_height,
            self.surface_format,
            &self.texture_bind_group_layout,
            &self.sampler,
        );
        self.target_width = target_width;
        self.target_height = target_height;
    }

    /// Runs one offscreen pass per linked, enabled portal. While a portal's
    /// view is being rendered its pair is disabled, so the pair never shows
    /// up inside its own surface. The closure encodes the actual scene passes
    /// into the given color/depth views.
    pub fn render_views<F>(&self, portals: &mut PortalSet, mut render_view: F) -> u32
    where
        F: FnMut(PortalId, &PortalSet, &wgpu::TextureView, &wgpu::TextureView),
    {
        let mut rendered_passes = 0;
        for index in 0..portals.len() {
            let id = PortalId(index);
            let portal = portals.get(id);
            if !portal.enabled {
                continue;
            }
            let Some(linked) = portal.linked else {
                continue;
            };

            portals.set_enabled(linked, false);
            let target = &self.targets[index];
            render_view(id, portals, &target.color_view, &target.depth_view);
            portals.set_enabled(linked, true);
            rendered_passes += 1;
        }

        rendered_passes
    }

    /// Draws the surface quads of every enabled portal. `exclude` names the
    /// portal whose target is the current attachment — its texture cannot be
    /// sampled while bound, and its own surface is not part of its view
    /// anyway.
    pub fn render_surfaces<'a>(
        &'a self,
        queue: &wgpu::Queue,
        render_pass: &mut wgpu::RenderPass<'a>,
        camera_bind_group: &'a wgpu::BindGroup,
        portals: &PortalSet,
        exclude: Option<PortalId>,
    ) -> u32 {
        render_pass.set_pipeline(&self.surface_pipeline);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);

        let mut draw_calls = 0;
        for (id, portal) in portals.iter() {
            if !portal.enabled || exclude == Some(id) {
                continue;
            }

            let params = PortalParamsUniform {
                model: surface_model_matrix(portal.position, portal.radius()).to_cols_array_2d(),
                tint: portal_tint(id.0),
                linked: if portal.linked.is_some() { 1.0 } else { 0.0 },
                _padding: [0.0; 3],
            };
            queue.write_buffer(&self.params_buffers[id.0], 0, bytemuck::bytes_of(&params));

            let texture_bind_group = if portal.linked.is_some() {
                &self.targets[id.0].sample_bind_group
            } else {
                &self.fallback_bind_group
            };

            render_pass.set_bind_group(0, camera_bind_group, &[]);
            render_pass.set_bind_group(1, texture_bind_group, &[]);
            render_pass.set_bind_group(2, &self.params_bind_groups[id.0], &[]);
            render_pass.draw_indexed(0..self.quad_index_count, 0, 0..1);
            draw_calls += 1;
        }

        draw_calls
    }
}

fn scaled_dimension(dimension: u32) -> u32 {
    ((dimension.max(1) as f32) * RTT_SCALE).round().max(1.0) as u32
}

fn surface_model_matrix(position: Vec3, radius: f32) -> Mat4 {
    Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(radius.max(0.001)))
}

fn portal_tint(index: usize) -> [f32; 4] {
    PORTAL_TINTS[index % PORTAL_TINTS.len()]
}

fn create_targets(
    device: &wgpu::Device,
    count: usize,
    width: u32,
    height: u32,
    color_format: wgpu::TextureFormat,
    texture_bind_group_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
) -> Vec<PortalRenderTarget> {
    (0..count)
        .map(|index| {
            let color_label = format!("Portal Color Target {index}");
            let color_texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&color_label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: color_format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

            let depth_label = format!("Portal Depth Target {index}");
            let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&depth_label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PORTAL_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

            let bind_group_label = format!("Portal Sample Bind Group {index}");
            let sample_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&bind_group_label),
                layout: texture_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&color_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            });

            PortalRenderTarget {
                _color_texture: color_texture,
                color_view,
                _depth_texture: depth_texture,
                depth_view,
                sample_bind_group,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::scaled_dimension;

    #[test]
    fn scaled_dimension_halves_and_never_hits_zero() {
        assert_eq!(scaled_dimension(1280), 640);
        assert_eq!(scaled_dimension(719), 360);
        assert_eq!(scaled_dimension(1), 1);
        assert_eq!(scaled_dimension(0), 1);
    }
}
