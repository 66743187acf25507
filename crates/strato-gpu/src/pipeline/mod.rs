//! The register-diffing pipeline state cache.
//!
//! Per draw, [`PipelineCache::configure_pipeline`] diffs the register file
//! against per-category shadow snapshots in a fixed order, feeding every
//! snapshot's bytes into a running xxh3 hash. If nothing pipeline-affecting
//! changed the held pipeline is reused outright; otherwise the hash keys a
//! lookup, and only a genuinely new state vector reaches the host's
//! pipeline-creation entry point.

mod categories;

use bytemuck::bytes_of;
use hashbrown::HashMap;
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::error::StateError;
use crate::host::{HostDevice, PipelineHandle, ShaderModuleHandle};
use crate::regs::RegisterFile;
use crate::shader::{ShaderCache, ShaderId, ShaderTranslator};
use crate::shadow::{
    ColorBlendSnapshot, DepthStencilSnapshot, InputAssemblySnapshot, MultisampleSnapshot,
    RasterizationSnapshot, RenderTargetSnapshot, ShaderStagesSnapshot, VertexInputSnapshot,
    ViewportSnapshot,
};
use crate::translate::{GeometryExpansion, PrimitiveType};

/// Host capabilities that gate register combinations with no host
/// equivalent.
#[derive(Clone, Copy, Debug)]
pub struct HostCaps {
    /// Host can bake different front/back polygon fill modes into one
    /// pipeline. wgpu-shaped hosts cannot.
    pub separate_fill_modes: bool,
    /// Host supports line/point polygon fill.
    pub non_solid_fill: bool,
    /// The pre-compiled geometry-expansion stages are available.
    pub geometry_expansion: bool,
    /// Largest per-target sample count the host can render with.
    pub max_sample_count: u32,
}

impl Default for HostCaps {
    fn default() -> Self {
        Self {
            separate_fill_modes: false,
            non_solid_fill: true,
            geometry_expansion: true,
            max_sample_count: 4,
        }
    }
}

/// Shader and primitive identity for one draw, resolved by the command
/// processor before configuration.
#[derive(Clone, Copy, Debug)]
pub struct DrawParams {
    pub vertex_shader: ShaderId,
    /// `None` for depth-only draws; a resident dummy fragment module is
    /// substituted.
    pub pixel_shader: Option<ShaderId>,
    pub primitive_type: PrimitiveType,
}

/// Per-attachment static state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTargetParams {
    pub format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
}

/// Depth/stencil static state. Stencil compare/write masks and the
/// reference value stay dynamic; the baked masks here are all-ones.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthStencilParams {
    pub format: wgpu::TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub stencil: wgpu::StencilState,
}

impl Default for DepthStencilParams {
    fn default() -> Self {
        Self {
            format: wgpu::TextureFormat::Depth24PlusStencil8,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState {
                front: wgpu::StencilFaceState::IGNORE,
                back: wgpu::StencilFaceState::IGNORE,
                read_mask: 0xFF,
                write_mask: 0xFF,
            },
        }
    }
}

/// One vertex stream layout derived from the vertex shader's fetch
/// instructions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexBufferParams {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Everything the host needs to bake a pipeline object, synthesized from
/// the category snapshots of the most recent update.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPipelineParams {
    pub vertex_module: ShaderModuleHandle,
    pub fragment_module: ShaderModuleHandle,
    pub geometry_expansion: Option<GeometryExpansion>,
    pub vertex_buffers: Vec<VertexBufferParams>,
    pub topology: wgpu::PrimitiveTopology,
    pub strip_index_format: Option<wgpu::IndexFormat>,
    pub front_face: wgpu::FrontFace,
    pub cull_mode: Option<wgpu::Face>,
    pub polygon_mode: wgpu::PolygonMode,
    pub sample_count: u32,
    pub color_targets: [Option<ColorTargetParams>; 4],
    pub depth_stencil: DepthStencilParams,
}

impl Default for RenderPipelineParams {
    fn default() -> Self {
        Self {
            vertex_module: ShaderModuleHandle(0),
            fragment_module: ShaderModuleHandle(0),
            geometry_expansion: None,
            vertex_buffers: Vec::new(),
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Cw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            sample_count: 1,
            color_targets: [None; 4],
            depth_stencil: DepthStencilParams::default(),
        }
    }
}

/// Per-category update verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Nothing pipeline-affecting changed.
    Compatible,
    /// The category changed; a pipeline lookup (or build) is required.
    Mismatch,
}

impl UpdateStatus {
    fn from_dirty(dirty: bool) -> Self {
        if dirty {
            Self::Mismatch
        } else {
            Self::Compatible
        }
    }
}

/// How the returned pipeline was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfiguredPipeline {
    /// Every category was compatible; the held pipeline was reused without
    /// a lookup.
    Unchanged(PipelineHandle),
    /// State changed but hashed to a previously built pipeline.
    Cached(PipelineHandle),
    /// A pipeline object was created on the host.
    Created(PipelineHandle),
}

impl ConfiguredPipeline {
    pub fn handle(self) -> PipelineHandle {
        match self {
            Self::Unchanged(handle) | Self::Cached(handle) | Self::Created(handle) => handle,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub configure_calls: u64,
    /// All-compatible draws that reused the held pipeline without hashing
    /// into the map.
    pub fast_path_reuses: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
}

/// Hash-keyed cache of baked pipeline objects plus the shadow state used to
/// avoid rebuilding them.
///
/// Owned by exactly one command-recording thread; nothing in here locks.
pub struct PipelineCache {
    caps: HostCaps,
    shaders: ShaderCache,

    render_targets: RenderTargetSnapshot,
    shader_stages: ShaderStagesSnapshot,
    vertex_input: VertexInputSnapshot,
    input_assembly: InputAssemblySnapshot,
    viewport: ViewportSnapshot,
    rasterization: RasterizationSnapshot,
    multisample: MultisampleSnapshot,
    depth_stencil: DepthStencilSnapshot,
    color_blend: ColorBlendSnapshot,

    params: RenderPipelineParams,
    pipelines: HashMap<u64, PipelineHandle>,
    current: Option<PipelineHandle>,
    stats: PipelineCacheStats,
}

impl PipelineCache {
    pub fn new(caps: HostCaps) -> Self {
        Self {
            caps,
            shaders: ShaderCache::new(),
            render_targets: RenderTargetSnapshot::default(),
            shader_stages: ShaderStagesSnapshot::default(),
            vertex_input: VertexInputSnapshot::default(),
            input_assembly: InputAssemblySnapshot::default(),
            viewport: ViewportSnapshot::default(),
            rasterization: RasterizationSnapshot::default(),
            multisample: MultisampleSnapshot::default(),
            depth_stencil: DepthStencilSnapshot::default(),
            color_blend: ColorBlendSnapshot::default(),
            params: RenderPipelineParams::default(),
            pipelines: HashMap::new(),
            current: None,
            stats: PipelineCacheStats::default(),
        }
    }

    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderCache {
        &mut self.shaders
    }

    pub fn stats(&self) -> PipelineCacheStats {
        self.stats
    }

    /// Number of distinct pipeline objects held.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Static creation parameters as of the last update; what the host saw
    /// (or would see) on a cache miss.
    pub fn params(&self) -> &RenderPipelineParams {
        &self.params
    }

    /// Resolves the pipeline for the current register state.
    ///
    /// Any error invalidates the held "current pipeline" so the next draw
    /// re-evaluates from scratch; the caller must skip the draw.
    pub fn configure_pipeline(
        &mut self,
        regs: &impl RegisterFile,
        draw: &DrawParams,
        translator: &mut dyn ShaderTranslator,
        host: &mut dyn HostDevice,
    ) -> Result<ConfiguredPipeline, StateError> {
        self.stats.configure_calls += 1;
        match self.run_update(regs, draw, translator, host) {
            Ok(configured) => Ok(configured),
            Err(error) => {
                warn!(%error, "pipeline configuration failed; draw will be skipped");
                self.current = None;
                self.stats.errors += 1;
                Err(error)
            }
        }
    }

    fn run_update(
        &mut self,
        regs: &impl RegisterFile,
        draw: &DrawParams,
        translator: &mut dyn ShaderTranslator,
        host: &mut dyn HostDevice,
    ) -> Result<ConfiguredPipeline, StateError> {
        let mut hasher = Xxh3::new();
        let mut dirty = false;

        // Fixed category order; every snapshot is hashed whether or not it
        // changed so the key stays stable across draws.
        dirty |= self.update_render_targets(regs)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.render_targets));
        dirty |= self.update_shader_stages(regs, draw, translator, host)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.shader_stages));
        dirty |= self.update_vertex_input(draw)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.vertex_input));
        dirty |= self.update_input_assembly(regs, draw)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.input_assembly));
        dirty |= self.update_viewport(regs)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.viewport));
        dirty |= self.update_rasterization(regs)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.rasterization));
        dirty |= self.update_multisample(regs)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.multisample));
        dirty |= self.update_depth_stencil(regs)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.depth_stencil));
        dirty |= self.update_color_blend(regs)? == UpdateStatus::Mismatch;
        hasher.update(bytes_of(&self.color_blend));

        if !dirty {
            if let Some(handle) = self.current {
                self.stats.fast_path_reuses += 1;
                return Ok(ConfiguredPipeline::Unchanged(handle));
            }
        }

        let hash = hasher.digest();
        if let Some(&handle) = self.pipelines.get(&hash) {
            self.current = Some(handle);
            self.stats.cache_hits += 1;
            return Ok(ConfiguredPipeline::Cached(handle));
        }

        let handle = host
            .create_render_pipeline(&self.params)
            .map_err(StateError::HostCreate)?;
        self.pipelines.insert(hash, handle);
        self.current = Some(handle);
        self.stats.cache_misses += 1;
        debug!(hash, ?handle, "created pipeline object");
        Ok(ConfiguredPipeline::Created(handle))
    }

    /// Destroys every pipeline object and shader module exactly once.
    /// Used on shader edit/hot-reload and shutdown.
    pub fn clear(&mut self, host: &mut dyn HostDevice) {
        for (_, handle) in self.pipelines.drain() {
            host.destroy_render_pipeline(handle);
        }
        self.current = None;
        self.shaders.clear(host);
        debug!("pipeline cache cleared");
    }
}
