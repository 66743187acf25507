//! Register-diffing pipeline translation core for a register-programmed
//! guest GPU running on an explicit host graphics API.
//!
//! The guest drives drawing through a flat file of 32-bit registers that can
//! mutate between any two draws; the host wants everything baked into
//! immutable pipeline objects. This crate bridges the two without creating a
//! pipeline per draw:
//!
//! - [`shadow`] keeps per-category snapshots of the registers each piece of
//!   pipeline state depends on, diffed with bit-exact comparisons.
//! - [`pipeline`] runs the category updaters in a fixed order, hashes the
//!   snapshots into a descriptor key, and maps keys to baked pipeline
//!   objects ([`pipeline::PipelineCache`]).
//! - [`shader`] content-addresses guest microcode and owns its translations
//!   ([`shader::ShaderCache`]); the instruction-level translator itself is a
//!   collaborator behind [`shader::ShaderTranslator`].
//! - [`dynamic`] re-issues the small set of truly dynamic values (viewport,
//!   scissor, bias, blend constants, stencil fields, push constants) only
//!   when they change.
//! - [`host`] is the opaque boundary to the device; tests drive the whole
//!   core through recording fakes.
//!
//! Everything here is meant to be owned by a single command-recording
//! thread; there is no internal locking.

pub mod dynamic;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod regs;
pub mod shader;
pub mod shadow;
pub mod translate;

pub use dynamic::{DrawConstants, DynamicState};
pub use error::{StateError, TranslateError};
pub use host::{HostCommandSink, HostDevice, PipelineHandle, ScissorRect, ShaderModuleHandle, Viewport};
pub use pipeline::{
    ConfiguredPipeline, DrawParams, HostCaps, PipelineCache, PipelineCacheStats,
    RenderPipelineParams,
};
pub use regs::{ArrayRegisterFile, RegisterFile};
pub use shader::{
    ShaderCache, ShaderCacheStats, ShaderId, ShaderStage, ShaderTranslator, TranslationId,
    TranslationModifier,
};
pub use translate::{GeometryExpansion, PrimitiveType};
