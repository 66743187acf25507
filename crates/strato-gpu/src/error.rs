use thiserror::Error;

use crate::shader::ShaderStage;
use crate::translate::PrimitiveType;

/// Failures surfaced while turning register state into a host pipeline.
///
/// Every variant means the current draw must be skipped; the cached "current
/// pipeline" is invalidated so the next draw re-evaluates from scratch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The guest programmed a primitive type the host cannot draw or
    /// emulate.
    #[error("unsupported primitive type {0:?}")]
    UnsupportedPrimitive(PrimitiveType),

    /// A register combination with no host equivalent.
    #[error("unsupported configuration: {0}")]
    Unsupported(&'static str),

    /// Translation of guest microcode failed; the failure is cached and the
    /// same shader/modifier pair is never retried.
    #[error("shader translation failed for {stage:?} shader {hash:016x}")]
    ShaderTranslation { stage: ShaderStage, hash: u64 },

    /// The host graphics API failed to create a pipeline object.
    #[error("host pipeline creation failed: {0}")]
    HostCreate(String),
}

/// Errors reported by the microcode translator collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("malformed microcode: {0}")]
    Malformed(&'static str),
    #[error("unsupported microcode instruction {0:#010x}")]
    UnsupportedInstruction(u32),
}
