use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

const HORIZON_COLOR: [f32; 4] = [0.529, 0.808, 0.922, 1.0];
const ZENITH_COLOR: [f32; 4] = [0.25, 0.47, 0.82, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SkyUniforms {
    inv_view_proj: [[f32; 4]; 4],
    horizon_color: [f32; 4],
    zenith_color: [f32; 4],
    sun_direction: [f32; 4],
}

impl SkyUniforms {
    fn new(view_proj: Mat4, sun_direction: Vec3) -> Self {
        Self {
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            horizon_color: HORIZON_COLOR,
            zenith_color: ZENITH_COLOR,
            sun_direction: [sun_direction.x, sun_direction.y, sun_direction.z, 0.0],
        }
    }
}

/// One uniform buffer + bind group per rendered view, so the offscreen portal
/// passes and the composite pass each keep their own matrices within a single
/// queue submission.
pub struct SkyViewBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct SkyRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl SkyRenderer {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sky Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/sky.wgsl"
                ))
                .into(),
            ),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sky Bind Group Layout"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sky Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sky Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    pub fn create_binding(&self, device: &wgpu::Device, label: &str) -> SkyViewBinding {
        let initial = SkyUniforms::new(Mat4::IDENTITY, Vec3::NEG_Y);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        SkyViewBinding { buffer, bind_group }
    }

    pub fn update(
        &self,
        queue: &wgpu::Queue,
        binding: &SkyViewBinding,
        view_proj: Mat4,
        sun_direction: Vec3,
    ) {
        let uniforms = SkyUniforms::new(view_proj, sun_direction);
        queue.write_buffer(&binding.buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    pub fn render<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, binding: &'a SkyViewBinding) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &binding.bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}
