//! Content-addressed guest shader cache.
//!
//! Shader records are keyed by a blake3 hash of the raw microcode, so the
//! same program uploaded at two guest addresses resolves to one record. Each
//! record owns its translations, keyed by a modifier derived from register
//! state; a translation that fails is kept and never retried. Pipelines
//! reference translations by id and never own them.

use bytemuck::cast_slice;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::error::{StateError, TranslateError};
use crate::host::{HostDevice, ShaderModuleHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Index of a shader record inside the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(usize);

/// Index of one translation of one shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TranslationId {
    shader: ShaderId,
    index: usize,
}

impl TranslationId {
    pub fn shader(self) -> ShaderId {
        self.shader
    }
}

/// Register-derived knobs that change translated output.
///
/// Two draws with the same microcode but different modifiers need distinct
/// host modules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TranslationModifier {
    /// Dynamically addressable register count from `SQ_PROGRAM_CNTL`.
    pub register_count: u8,
    /// Vertex export mode from `SQ_PROGRAM_CNTL`.
    pub export_mode: u8,
    /// Whether the pixel shader receives a generated parameter register.
    pub param_gen: bool,
}

impl TranslationModifier {
    /// Stable packed form, fed into the pipeline descriptor hash.
    pub fn to_raw(self) -> u32 {
        u32::from(self.register_count)
            | (u32::from(self.export_mode) << 8)
            | (u32::from(self.param_gen) << 16)
    }
}

/// One vertex attribute declared by a vertex shader's fetch instructions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexAttribute {
    pub location: u32,
    pub offset: u64,
    pub format: wgpu::VertexFormat,
}

/// One vertex stream declared by a vertex shader.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexBinding {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Results of the microcode analysis pre-step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderAnalysis {
    /// Vertex streams consumed (vertex shaders only).
    pub vertex_bindings: Vec<VertexBinding>,
    /// The pixel shader exports depth.
    pub writes_depth: bool,
}

/// The instruction-level microcode translator, supplied by the surrounding
/// renderer.
pub trait ShaderTranslator {
    /// Inspects microcode without generating code. Runs once per record,
    /// lazily before the first translation.
    fn analyze(&mut self, stage: ShaderStage, microcode: &[u32])
        -> Result<ShaderAnalysis, TranslateError>;

    /// Produces host shader source for one `(microcode, modifier)` pair.
    fn translate(
        &mut self,
        stage: ShaderStage,
        microcode: &[u32],
        modifier: TranslationModifier,
        analysis: &ShaderAnalysis,
    ) -> Result<Vec<u8>, TranslateError>;
}

#[derive(Debug)]
struct Translation {
    modifier: TranslationModifier,
    /// `None` marks a permanently failed translation.
    module: Option<ShaderModuleHandle>,
}

/// One guest shader program.
#[derive(Debug)]
pub struct ShaderRecord {
    stage: ShaderStage,
    hash: u64,
    guest_address: u32,
    microcode: Vec<u32>,
    analysis: Option<ShaderAnalysis>,
    translations: Vec<Translation>,
}

impl ShaderRecord {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// 64-bit prefix of the microcode content hash.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Guest address the program was first seen at. Not part of the cache
    /// key; retained for diagnostics only.
    pub fn guest_address(&self) -> u32 {
        self.guest_address
    }

    /// Analysis results; present once any translation has been attempted.
    pub fn analysis(&self) -> Option<&ShaderAnalysis> {
        self.analysis.as_ref()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderCacheStats {
    pub records: u64,
    pub load_hits: u64,
    pub translations: u64,
    pub translation_hits: u64,
    pub translation_failures: u64,
}

/// Content-addressed store of guest shaders and their translations.
pub struct ShaderCache {
    records: Vec<ShaderRecord>,
    by_hash: HashMap<[u8; 32], ShaderId>,
    dummy_pixel: Option<ShaderModuleHandle>,
    stats: ShaderCacheStats,
}

/// Minimal fragment stage bound for depth-only draws so pipelines stay
/// valid.
const DUMMY_PIXEL_SOURCE: &[u8] = b"@fragment fn fs_main() {}\n";

impl ShaderCache {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            by_hash: HashMap::new(),
            dummy_pixel: None,
            stats: ShaderCacheStats::default(),
        }
    }

    /// Registers guest microcode and returns its record id.
    ///
    /// Identical bytes at a different guest address deduplicate to the
    /// existing record; analysis and translation are deferred until first
    /// use.
    pub fn load_shader(
        &mut self,
        stage: ShaderStage,
        guest_address: u32,
        microcode: &[u32],
    ) -> ShaderId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[stage as u8]);
        hasher.update(cast_slice(microcode));
        let key = *hasher.finalize().as_bytes();

        if let Some(&id) = self.by_hash.get(&key) {
            self.stats.load_hits += 1;
            return id;
        }

        let hash = u64::from_le_bytes(key[..8].try_into().expect("blake3 hash is 32 bytes"));
        let id = ShaderId(self.records.len());
        self.records.push(ShaderRecord {
            stage,
            hash,
            guest_address,
            microcode: microcode.to_vec(),
            analysis: None,
            translations: Vec::new(),
        });
        self.by_hash.insert(key, id);
        self.stats.records += 1;
        debug!(?stage, guest_address, hash, "new shader record");
        id
    }

    pub fn record(&self, id: ShaderId) -> &ShaderRecord {
        &self.records[id.0]
    }

    /// Returns the translation of `shader` for `modifier`, translating on
    /// first use.
    ///
    /// A failed translation is cached and reported as
    /// [`StateError::ShaderTranslation`] on this and every later call with
    /// the same modifier.
    pub fn get_or_create_translation(
        &mut self,
        shader: ShaderId,
        modifier: TranslationModifier,
        translator: &mut dyn ShaderTranslator,
        host: &mut dyn HostDevice,
    ) -> Result<TranslationId, StateError> {
        let record = &mut self.records[shader.0];

        if let Some(index) = record
            .translations
            .iter()
            .position(|t| t.modifier == modifier)
        {
            if record.translations[index].module.is_none() {
                return Err(StateError::ShaderTranslation {
                    stage: record.stage,
                    hash: record.hash,
                });
            }
            self.stats.translation_hits += 1;
            return Ok(TranslationId { shader, index });
        }

        if record.analysis.is_none() {
            match translator.analyze(record.stage, &record.microcode) {
                Ok(analysis) => record.analysis = Some(analysis),
                Err(error) => {
                    warn!(hash = record.hash, %error, "shader analysis failed");
                    record.translations.push(Translation {
                        modifier,
                        module: None,
                    });
                    self.stats.translation_failures += 1;
                    return Err(StateError::ShaderTranslation {
                        stage: record.stage,
                        hash: record.hash,
                    });
                }
            }
        }
        let analysis = record.analysis.as_ref().expect("analysis just populated");

        let index = record.translations.len();
        match translator.translate(record.stage, &record.microcode, modifier, analysis) {
            Ok(source) => {
                let label = format!("guest {:?} shader {:016x}", record.stage, record.hash);
                let module = host.create_shader_module(&source, Some(&label));
                record.translations.push(Translation {
                    modifier,
                    module: Some(module),
                });
                self.stats.translations += 1;
                debug!(hash = record.hash, ?modifier, "translated shader");
                Ok(TranslationId { shader, index })
            }
            Err(error) => {
                warn!(hash = record.hash, ?modifier, %error, "shader translation failed");
                record.translations.push(Translation {
                    modifier,
                    module: None,
                });
                self.stats.translation_failures += 1;
                Err(StateError::ShaderTranslation {
                    stage: record.stage,
                    hash: record.hash,
                })
            }
        }
    }

    /// Host module of a valid translation.
    pub fn module(&self, id: TranslationId) -> ShaderModuleHandle {
        self.records[id.shader.0].translations[id.index]
            .module
            .expect("translation ids are only handed out for valid translations")
    }

    /// The resident dummy fragment module, created on first use.
    pub fn dummy_pixel_module(&mut self, host: &mut dyn HostDevice) -> ShaderModuleHandle {
        *self.dummy_pixel.get_or_insert_with(|| {
            host.create_shader_module(DUMMY_PIXEL_SOURCE, Some("dummy pixel shader"))
        })
    }

    pub fn stats(&self) -> ShaderCacheStats {
        self.stats
    }

    /// Destroys every host module and forgets all records.
    pub fn clear(&mut self, host: &mut dyn HostDevice) {
        for record in &mut self.records {
            for translation in record.translations.drain(..) {
                if let Some(module) = translation.module {
                    host.destroy_shader_module(module);
                }
            }
        }
        if let Some(module) = self.dummy_pixel.take() {
            host.destroy_shader_module(module);
        }
        self.records.clear();
        self.by_hash.clear();
        self.stats = ShaderCacheStats::default();
    }
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new()
    }
}
