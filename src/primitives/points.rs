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

use cgmath::Point3;

use crate::cameras::Camera;
use crate::draw_context::{DrawContext, Drawable, DrawableBuilder, Uniform, VertexStream};

use super::ColoredVertex;

const POINTS_SHADER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/shaders/points.wgsl"
));

const ADDITIVE_BLENDING: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent::OVER,
};

/// Point primitives emitted one vertex at a time between [`begin`] and
/// [`end`], then drawn as a point list.
///
/// Nothing persists from one `begin` to the next: every frame emits its whole
/// geometry again.
///
/// [`begin`]: PointBatch::begin
/// [`end`]: PointBatch::end
pub struct PointBatch {
    drawable: Drawable,
    stream: VertexStream<ColoredVertex>,
    camera_mat: Uniform<[[f32; 4]; 4]>,
    pending: Vec<ColoredVertex>,
}

impl PointBatch {
    pub fn new(context: &DrawContext, capacity: usize) -> anyhow::Result<Self> {
        let shader_module = context.create_shader_module(POINTS_SHADER);
        let camera_mat: Uniform<[[f32; 4]; 4]> =
            Uniform::new(context, cgmath::Matrix4::from_scale(1.0f32).into());
        let stream = VertexStream::with_capacity(context, capacity);
        let mut drawable_builder = DrawableBuilder::new(
            context,
            &shader_module,
            &shader_module,
            wgpu::PrimitiveTopology::PointList,
        );
        drawable_builder
            .set_blend_option(ADDITIVE_BLENDING)
            .add_vertex_stream(&stream, &ColoredVertex::ATTRIBUTES)?
            .add_uniform(DrawContext::BIND_GROUP_INDEX_CAMERA, 0, &camera_mat)?;
        let drawable = drawable_builder.build();
        Ok(Self {
            drawable,
            stream,
            camera_mat,
            pending: Vec::with_capacity(capacity),
        })
    }

    pub fn set_matrices(&mut self, camera: &Camera) {
        self.camera_mat
            .write_uniform(camera.get_camera_matrix().into());
    }

    pub fn begin(&mut self) {
        self.pending.clear();
    }

    pub fn vertex(&mut self, color: [f32; 4], position: Point3<f32>) {
        self.pending.push(ColoredVertex {
            position: position.into(),
            color,
        });
    }

    /// Uploads the emitted vertices. Returns how many will be drawn.
    pub fn end(&mut self) -> usize {
        let count = self.stream.upload(&self.pending);
        self.drawable
            .set_vertex_count(u32::try_from(count).unwrap_or(u32::MAX));
        count
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.drawable.render(render_pass);
    }
}
