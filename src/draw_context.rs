/*
MIT License

Copyright (c) 2021, 2022, 2024, 2025 Vincent Hiribarren

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use bytemuck::NoUninit;
use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn surface_ratio(&self) -> f32 {
        if self.height > 0 {
            self.width as f32 / self.height as f32
        } else {
            1.0
        }
    }
}

/// Uniform buffer mirrored on the CPU side. `T` must already follow the
/// WGSL layout rules, which holds for scalars, `vec4` and `mat4x4`.
pub struct Uniform<T> {
    value: T,
    buffer: wgpu::Buffer,
    queue: Rc<wgpu::Queue>,
}

impl<T: NoUninit> Uniform<T> {
    pub fn new(context: &DrawContext, value: T) -> Self {
        let buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Uniform Buffer"),
                contents: bytemuck::bytes_of(&value),
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::UNIFORM,
            });
        Self {
            value,
            buffer,
            queue: Rc::clone(&context.queue),
        }
    }
    pub fn write_uniform(&mut self, data: T) {
        self.value = data;
        self.queue
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.value));
    }
}

/// Fixed-capacity vertex buffer whose content is replaced every frame.
///
/// Writes longer than the capacity are truncated.
pub struct VertexStream<T> {
    buffer: Arc<wgpu::Buffer>,
    capacity: usize,
    len: usize,
    queue: Rc<wgpu::Queue>,
    _type: PhantomData<T>,
}

impl<T: NoUninit> VertexStream<T> {
    pub fn with_capacity(context: &DrawContext, capacity: usize) -> Self {
        let size = (capacity.max(1) * size_of::<T>()) as wgpu::BufferAddress;
        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Vertex Stream Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        Self {
            buffer: Arc::new(buffer),
            capacity,
            len: 0,
            queue: Rc::clone(&context.queue),
            _type: PhantomData,
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    /// Replaces the stream content and returns the number of vertices kept.
    pub fn upload(&mut self, data: &[T]) -> usize {
        if data.len() > self.capacity {
            warn!(
                "Vertex stream overflow, {} vertices dropped",
                data.len() - self.capacity
            );
        }
        let kept = &data[..data.len().min(self.capacity)];
        if !kept.is_empty() {
            self.queue
                .write_buffer(&self.buffer, 0, bytemuck::cast_slice(kept));
        }
        self.len = kept.len();
        self.len
    }
}

struct VertexSlot {
    buffer: Arc<wgpu::Buffer>,
    stride: wgpu::BufferAddress,
    attributes: Vec<wgpu::VertexAttribute>,
}

pub struct DrawableBuilder<'a> {
    context: &'a DrawContext,
    vtx_shader_module: &'a wgpu::ShaderModule,
    frg_shader_module: &'a wgpu::ShaderModule,
    topology: wgpu::PrimitiveTopology,
    used_locations: HashSet<u32>,
    vertex_slots: Vec<VertexSlot>,
    blend_option: Option<wgpu::BlendState>,
    uniforms: BTreeMap<u32, BTreeMap<u32, &'a wgpu::Buffer>>,
}

impl<'a> DrawableBuilder<'a> {
    pub fn new(
        context: &'a DrawContext,
        vtx_shader_module: &'a wgpu::ShaderModule,
        frg_shader_module: &'a wgpu::ShaderModule,
        topology: wgpu::PrimitiveTopology,
    ) -> Self {
        Self {
            context,
            vtx_shader_module,
            frg_shader_module,
            topology,
            used_locations: HashSet::new(),
            vertex_slots: Vec::new(),
            blend_option: None,
            uniforms: BTreeMap::new(),
        }
    }
    pub fn set_blend_option(&mut self, blend_option: wgpu::BlendState) -> &mut Self {
        self.blend_option = Some(blend_option);
        self
    }
    pub fn add_uniform<T>(
        &mut self,
        bind_group: u32,
        binding: u32,
        uniform: &'a Uniform<T>,
    ) -> Result<&mut Self, anyhow::Error> {
        let group = self.uniforms.entry(bind_group).or_default();
        if group.insert(binding, &uniform.buffer).is_some() {
            bail!("Binding {binding} of group {bind_group} already used!");
        }
        Ok(self)
    }
    /// Binds an interleaved vertex stream, one attribute per shader location.
    pub fn add_vertex_stream<T>(
        &mut self,
        stream: &VertexStream<T>,
        attributes: &[wgpu::VertexAttribute],
    ) -> Result<&mut Self, anyhow::Error>
    where
        T: NoUninit,
    {
        for attribute in attributes {
            if !self.used_locations.insert(attribute.shader_location) {
                bail!("Location {} already used!", attribute.shader_location);
            }
        }
        self.vertex_slots.push(VertexSlot {
            buffer: Arc::clone(&stream.buffer),
            stride: size_of::<T>() as wgpu::BufferAddress,
            attributes: attributes.to_vec(),
        });
        Ok(self)
    }

    fn create_bind_groups(&self) -> (Vec<wgpu::BindGroupLayout>, BTreeMap<u32, wgpu::BindGroup>) {
        let device = &self.context.device;
        let group_count = self.uniforms.keys().next_back().map_or(0, |last| last + 1);
        let mut layouts = Vec::new();
        let mut bind_groups = BTreeMap::new();
        // Pipeline layouts cannot have holes, unused groups get an empty layout
        for group_id in 0..group_count {
            let bindings = self.uniforms.get(&group_id);
            let layout_entries: Vec<_> = bindings
                .into_iter()
                .flatten()
                .map(|(binding, _)| wgpu::BindGroupLayoutEntry {
                    binding: *binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                })
                .collect();
            let group_entries: Vec<_> = bindings
                .into_iter()
                .flatten()
                .map(|(binding, buffer)| wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &layout_entries,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &layout,
                entries: &group_entries,
            });
            layouts.push(layout);
            bind_groups.insert(group_id, bind_group);
        }
        (layouts, bind_groups)
    }

    #[must_use]
    pub fn build(self) -> Drawable {
        let device = &self.context.device;
        let (bind_group_layouts, bind_groups) = self.create_bind_groups();
        let vertex_buffer_layouts: Vec<_> = self
            .vertex_slots
            .iter()
            .map(|slot| wgpu::VertexBufferLayout {
                array_stride: slot.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &slot.attributes,
            })
            .collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &bind_group_layouts.iter().collect::<Vec<_>>(),
            push_constant_ranges: &[],
        });
        // Culling only makes sense for polygons
        let cull_mode = match self.topology {
            wgpu::PrimitiveTopology::TriangleList | wgpu::PrimitiveTopology::TriangleStrip => {
                Some(wgpu::Face::Back)
            }
            _ => None,
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some("Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: self.vtx_shader_module,
                entry_point: None,
                buffers: &vertex_buffer_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: self.frg_shader_module,
                entry_point: None,
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.context.surface_config.format,
                    blend: self.blend_option,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: self.topology,
                cull_mode,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DrawContext::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: self.context.sample_count(),
                ..Default::default()
            },
            multiview: None,
        });

        Drawable {
            vertex_count: 0,
            buffers: self
                .vertex_slots
                .iter()
                .map(|slot| Arc::clone(&slot.buffer))
                .collect(),
            pipeline,
            bind_groups,
        }
    }
}

pub struct Drawable {
    vertex_count: u32,
    buffers: Vec<Arc<wgpu::Buffer>>,
    pipeline: wgpu::RenderPipeline,
    bind_groups: BTreeMap<u32, wgpu::BindGroup>,
}

impl Drawable {
    pub fn set_vertex_count(&mut self, value: u32) {
        self.vertex_count = value;
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        if self.vertex_count == 0 {
            return;
        }
        render_pass.set_pipeline(&self.pipeline);
        for (group_id, bind_group) in &self.bind_groups {
            render_pass.set_bind_group(*group_id, bind_group, &[]);
        }
        for (slot, vertex_buffer) in (0..).zip(&self.buffers) {
            render_pass.set_vertex_buffer(slot, vertex_buffer.slice(..));
        }
        render_pass.draw(0..self.vertex_count, 0..1);
    }
}

/// Depth and multisampled color attachments, sized after the surface.
struct RenderTargets {
    depth_view: wgpu::TextureView,
    multisample_view: Option<wgpu::TextureView>,
}

impl RenderTargets {
    fn new(
        device: &wgpu::Device,
        surface_config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
    ) -> Self {
        let attachment = |label: &str, format: wgpu::TextureFormat| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: surface_config.width,
                        height: surface_config.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    view_formats: &[],
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        Self {
            depth_view: attachment("Depth Texture", DrawContext::DEPTH_FORMAT),
            multisample_view: (sample_count > 1)
                .then(|| attachment("Multisample Texture", surface_config.format)),
        }
    }
}

/// Where frames end up: a window surface, or an offscreen texture when
/// running headless.
enum DrawTarget {
    Texture(wgpu::Texture),
    Surface(wgpu::Surface<'static>),
}

impl DrawTarget {
    const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    fn offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    fn format(&self, adapter: &wgpu::Adapter) -> anyhow::Result<wgpu::TextureFormat> {
        let Self::Surface(surface) = self else {
            return Ok(Self::OFFSCREEN_FORMAT);
        };
        let formats = surface.get_capabilities(adapter).formats;
        formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| anyhow!("Surface is not compatible with the adapter"))
    }

    fn configure(&mut self, device: &wgpu::Device, surface_config: &wgpu::SurfaceConfiguration) {
        match self {
            Self::Texture(texture) => {
                *texture =
                    Self::offscreen_texture(device, surface_config.width, surface_config.height);
            }
            Self::Surface(surface) => surface.configure(device, surface_config),
        }
    }
}

pub struct DrawContext {
    draw_target: DrawTarget,
    render_targets: RenderTargets,
    sample_count: u32,
    clear_color: Option<wgpu::Color>,
    pub window: Option<Arc<Window>>,
    pub queue: Rc<wgpu::Queue>,
    pub device: wgpu::Device,
    pub surface_config: wgpu::SurfaceConfiguration,
}

impl DrawContext {
    const DEFAULT_WIDTH: u32 = 1024;
    const DEFAULT_HEIGHT: u32 = 768;
    /// Multisampling smooths the edges of rasterized points.
    const DEFAULT_SAMPLE_COUNT: u32 = 4;
    const DEFAULT_CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    pub const BIND_GROUP_INDEX_CAMERA: u32 = 0;

    // Window size may still be 0 when created, dimensions take precedence
    pub async fn new(
        window: Option<Arc<Window>>,
        dimensions: Option<Dimensions>,
    ) -> anyhow::Result<Self> {
        let Dimensions { width, height } = dimensions.unwrap_or_else(|| {
            window.as_ref().map_or(
                Dimensions {
                    width: Self::DEFAULT_WIDTH,
                    height: Self::DEFAULT_HEIGHT,
                },
                |w| Dimensions {
                    width: w.inner_size().width,
                    height: w.inner_size().height,
                },
            )
        });
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = window
            .as_ref()
            .map(|w| instance.create_surface(Arc::clone(w)))
            .transpose()?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: surface.as_ref(),
            })
            .await
            .ok_or_else(|| anyhow!("Could not create WebGPU adapter"))?;
        debug!("{:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device Descriptor"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;
        let (width, height) = (width.max(1), height.max(1));
        let mut draw_target = match surface {
            Some(surface) => DrawTarget::Surface(surface),
            None => DrawTarget::Texture(DrawTarget::offscreen_texture(&device, width, height)),
        };
        let surface_config = wgpu::SurfaceConfiguration {
            desired_maximum_frame_latency: 2,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: draw_target.format(&adapter)?,
            width,
            height,
            view_formats: vec![],
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            present_mode: wgpu::PresentMode::Fifo,
        };
        draw_target.configure(&device, &surface_config);
        let sample_count = Self::DEFAULT_SAMPLE_COUNT;
        let render_targets = RenderTargets::new(&device, &surface_config, sample_count);

        Ok(Self {
            draw_target,
            render_targets,
            sample_count,
            clear_color: Some(Self::DEFAULT_CLEAR_COLOR),
            window,
            queue: Rc::new(queue),
            device,
            surface_config,
        })
    }

    pub fn set_clear_color(&mut self, color: Option<wgpu::Color>) {
        self.clear_color = color;
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn create_shader_module(&self, wgsl_shader: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: None,
                source: wgpu::ShaderSource::Wgsl(wgsl_shader.into()),
            })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.reconfigure();
    }

    /// Reapplies the current configuration, e.g. after the surface was lost.
    pub fn reconfigure(&mut self) {
        self.draw_target
            .configure(&self.device, &self.surface_config);
        self.render_targets =
            RenderTargets::new(&self.device, &self.surface_config, self.sample_count);
    }

    #[must_use]
    pub fn surface_ratio(&self) -> f32 {
        self.surface_dimensions().surface_ratio()
    }

    #[must_use]
    pub fn surface_dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.surface_config.width,
            height: self.surface_config.height,
        }
    }

    /// Runs `callback` inside a render pass clearing color and depth, then
    /// submits and presents the frame.
    pub fn render_scene<C>(&self, callback: C) -> anyhow::Result<()>
    where
        C: FnOnce(wgpu::RenderPass<'_>),
    {
        let (frame_view, surface_texture) = match &self.draw_target {
            DrawTarget::Texture(texture) => (
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
                None,
            ),
            DrawTarget::Surface(surface) => {
                let surface_texture = surface.get_current_texture()?;
                let view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (view, Some(surface_texture))
            }
        };
        let color_attachment = match &self.render_targets.multisample_view {
            Some(multisample_view) => wgpu::RenderPassColorAttachment {
                view: multisample_view,
                resolve_target: Some(&frame_view),
                ops: self.color_ops(),
            },
            None => wgpu::RenderPassColorAttachment {
                view: &frame_view,
                resolve_target: None,
                ops: self.color_ops(),
            },
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Command Encoder"),
            });
        let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render pass"),
            timestamp_writes: None,
            occlusion_query_set: None,
            color_attachments: &[Some(color_attachment)],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.render_targets.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
        });
        callback(render_pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(surface_texture) = surface_texture {
            surface_texture.present();
        }
        Ok(())
    }

    fn color_ops(&self) -> wgpu::Operations<wgpu::Color> {
        wgpu::Operations {
            load: self
                .clear_color
                .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
            store: wgpu::StoreOp::Store,
        }
    }
}
