//! Host graphics API boundary.
//!
//! The translation core never talks to a device directly; it goes through
//! these traits so the surrounding renderer can back them with a real
//! `wgpu::Device`/render pass while tests record calls. Handles are opaque
//! integers minted by the host; the caches own them and destroy each exactly
//! once.

use crate::dynamic::DrawConstants;
use crate::pipeline::RenderPipelineParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderModuleHandle(pub u64);

/// Object creation side of the host API.
pub trait HostDevice {
    /// Compiles a shader module from translated source bytes.
    fn create_shader_module(&mut self, source: &[u8], label: Option<&str>) -> ShaderModuleHandle;

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle);

    /// Bakes a pipeline object. Failure (device loss, out of memory) is
    /// returned as a message and propagated to the caller; there is no
    /// internal retry.
    fn create_render_pipeline(
        &mut self,
        params: &RenderPipelineParams,
    ) -> Result<PipelineHandle, String>;

    fn destroy_render_pipeline(&mut self, pipeline: PipelineHandle);
}

/// Viewport rectangle in host coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Scissor rectangle in host coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-draw dynamic state setters the host exposes without a pipeline
/// rebuild.
pub trait HostCommandSink {
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, scissor: ScissorRect);
    fn set_blend_constants(&mut self, color: [f32; 4]);
    fn set_depth_bias(&mut self, constant: f32, slope_scale: f32);
    fn set_stencil_reference(&mut self, reference: u32);
    fn set_stencil_compare_mask(&mut self, mask: u32);
    fn set_stencil_write_mask(&mut self, mask: u32);
    fn push_draw_constants(&mut self, constants: &DrawConstants);
}
