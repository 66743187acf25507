//! Per-category register updaters.
//!
//! Each updater is a small state machine over `(shadow snapshot, register
//! file)`: it writes the registers it depends on through `set_if_changed`,
//! ORs the results into its verdict, and re-synthesizes its slice of the
//! static pipeline-creation parameters. Updaters never touch another
//! category's snapshot.

use xxhash_rust::xxh3::Xxh3;

use crate::error::StateError;
use crate::host::HostDevice;
use crate::regs::{reg, RegisterFile};
use crate::shader::{ShaderTranslator, TranslationModifier};
use crate::shadow::set_if_changed;
use crate::translate::{
    blend_factor, blend_operation, compare_function, stencil_operation, translate_primitive,
    ColorTargetFormat, DepthTargetFormat, MsaaSamples,
};

use super::{ColorTargetParams, DrawParams, PipelineCache, UpdateStatus, VertexBufferParams};

/// EDRAM mode in which color and depth writes reach the render targets.
const EDRAM_MODE_COLOR_DEPTH: u32 = 4;

/// `PA_SU_SC_MODE_CNTL` fill type for line polygon mode.
const POLY_PTYPE_LINE: u32 = 1;
const POLY_PTYPE_POINT: u32 = 0;

fn line_mode(su_sc_mode_cntl: u32) -> bool {
    // Dual polygon mode with a line fill type on the front face.
    ((su_sc_mode_cntl >> 3) & 0b11) == 2 && ((su_sc_mode_cntl >> 5) & 0b111) == POLY_PTYPE_LINE
}

impl PipelineCache {
    pub(super) fn update_render_targets(
        &mut self,
        regs: &impl RegisterFile,
    ) -> Result<UpdateStatus, StateError> {
        let snapshot = &mut self.render_targets;
        let mut dirty = false;
        dirty |= set_if_changed(
            &mut snapshot.mode_control,
            regs.read(reg::RB_MODECONTROL) & 0b111,
        );
        dirty |= set_if_changed(&mut snapshot.surface_info, regs.read(reg::RB_SURFACE_INFO));
        for (slot, index) in snapshot.color_info.iter_mut().zip(reg::COLOR_INFO) {
            dirty |= set_if_changed(slot, regs.read(index));
        }
        dirty |= set_if_changed(&mut snapshot.depth_info, regs.read(reg::RB_DEPTH_INFO));
        dirty |= set_if_changed(&mut snapshot.color_mask, regs.read(reg::RB_COLOR_MASK));

        let color_writes_enabled = snapshot.mode_control == EDRAM_MODE_COLOR_DEPTH;
        for (index, target) in self.params.color_targets.iter_mut().enumerate() {
            let mask = (snapshot.color_mask >> (index * 4)) & 0xF;
            *target = if color_writes_enabled && mask != 0 {
                Some(ColorTargetParams {
                    format: ColorTargetFormat::from_raw(snapshot.color_info[index] >> 16)
                        .to_wgpu(),
                    // Blend state and write mask are owned by the color
                    // blend category, which runs after this one.
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            } else {
                None
            };
        }
        self.params.depth_stencil.format =
            DepthTargetFormat::from_raw(snapshot.depth_info >> 16).to_wgpu();

        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_shader_stages(
        &mut self,
        regs: &impl RegisterFile,
        draw: &DrawParams,
        translator: &mut dyn ShaderTranslator,
        host: &mut dyn HostDevice,
    ) -> Result<UpdateStatus, StateError> {
        let program_cntl = regs.read(reg::SQ_PROGRAM_CNTL);
        let translation =
            translate_primitive(draw.primitive_type, line_mode(regs.read(reg::PA_SU_SC_MODE_CNTL)))?;
        if translation.expansion.is_some() && !self.caps.geometry_expansion {
            return Err(StateError::Unsupported("geometry expansion stages"));
        }

        let vertex_hash = self.shaders.record(draw.vertex_shader).hash();
        let pixel_hash = draw
            .pixel_shader
            .map(|id| self.shaders.record(id).hash())
            .unwrap_or(0);

        let snapshot = &mut self.shader_stages;
        let mut dirty = false;
        dirty |= set_if_changed(&mut snapshot.vertex_hash, vertex_hash);
        dirty |= set_if_changed(&mut snapshot.pixel_hash, pixel_hash);
        dirty |= set_if_changed(&mut snapshot.program_cntl, program_cntl);
        dirty |= set_if_changed(
            &mut snapshot.expansion,
            translation.expansion.map(|e| e as u32).unwrap_or(0),
        );

        let vertex_modifier = TranslationModifier {
            register_count: (program_cntl & 0xFF) as u8,
            export_mode: ((program_cntl >> 27) & 0b111) as u8,
            param_gen: false,
        };
        let vertex_translation = self.shaders.get_or_create_translation(
            draw.vertex_shader,
            vertex_modifier,
            translator,
            host,
        )?;
        self.params.vertex_module = self.shaders.module(vertex_translation);

        self.params.fragment_module = match draw.pixel_shader {
            Some(pixel_shader) => {
                let pixel_modifier = TranslationModifier {
                    register_count: ((program_cntl >> 8) & 0xFF) as u8,
                    export_mode: 0,
                    param_gen: program_cntl & (1 << 18) != 0,
                };
                let pixel_translation = self.shaders.get_or_create_translation(
                    pixel_shader,
                    pixel_modifier,
                    translator,
                    host,
                )?;
                self.shaders.module(pixel_translation)
            }
            None => self.shaders.dummy_pixel_module(host),
        };
        self.params.geometry_expansion = translation.expansion;

        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_vertex_input(
        &mut self,
        draw: &DrawParams,
    ) -> Result<UpdateStatus, StateError> {
        // The vertex layout is declared by the shader's fetch instructions;
        // analysis ran during the shader-stages update.
        let bindings = self
            .shaders
            .record(draw.vertex_shader)
            .analysis()
            .map(|a| a.vertex_bindings.clone())
            .unwrap_or_default();

        let mut hasher = Xxh3::new();
        for binding in &bindings {
            hasher.update(&binding.stride.to_le_bytes());
            for attribute in &binding.attributes {
                hasher.update(&attribute.location.to_le_bytes());
                hasher.update(&attribute.offset.to_le_bytes());
                hasher.update(&(attribute.format as u32).to_le_bytes());
            }
        }
        let dirty = set_if_changed(&mut self.vertex_input.layout_hash, hasher.digest());

        self.params.vertex_buffers = bindings
            .iter()
            .map(|binding| VertexBufferParams {
                stride: binding.stride,
                attributes: binding
                    .attributes
                    .iter()
                    .map(|attribute| wgpu::VertexAttribute {
                        format: attribute.format,
                        offset: attribute.offset,
                        shader_location: attribute.location,
                    })
                    .collect(),
            })
            .collect();

        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_input_assembly(
        &mut self,
        regs: &impl RegisterFile,
        draw: &DrawParams,
    ) -> Result<UpdateStatus, StateError> {
        let su_sc_mode_cntl = regs.read(reg::PA_SU_SC_MODE_CNTL);
        let translation = translate_primitive(draw.primitive_type, line_mode(su_sc_mode_cntl))?;

        let snapshot = &mut self.input_assembly;
        let mut dirty = false;
        dirty |= set_if_changed(&mut snapshot.primitive_type, draw.primitive_type as u32);
        dirty |= set_if_changed(&mut snapshot.restart_enabled, (su_sc_mode_cntl >> 21) & 1);
        dirty |= set_if_changed(
            &mut snapshot.restart_index,
            regs.read(reg::VGT_MULTI_PRIM_IB_RESET_INDX),
        );

        self.params.topology = translation.topology;
        self.params.strip_index_format = match translation.topology {
            wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip => {
                if snapshot.restart_index > u32::from(u16::MAX) {
                    Some(wgpu::IndexFormat::Uint32)
                } else {
                    Some(wgpu::IndexFormat::Uint16)
                }
            }
            _ => None,
        };

        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_viewport(
        &mut self,
        regs: &impl RegisterFile,
    ) -> Result<UpdateStatus, StateError> {
        // Viewport and scissor are dynamic state; the transform enables are
        // shadowed only to keep the descriptor hash stable. Nothing here
        // ever forces a pipeline change.
        set_if_changed(&mut self.viewport.vte_cntl, regs.read(reg::PA_CL_VTE_CNTL));
        Ok(UpdateStatus::Compatible)
    }

    pub(super) fn update_rasterization(
        &mut self,
        regs: &impl RegisterFile,
    ) -> Result<UpdateStatus, StateError> {
        let snapshot = &mut self.rasterization;
        let mut dirty = false;
        dirty |= set_if_changed(
            &mut snapshot.su_sc_mode_cntl,
            regs.read(reg::PA_SU_SC_MODE_CNTL),
        );
        dirty |= set_if_changed(&mut snapshot.clip_cntl, regs.read(reg::PA_CL_CLIP_CNTL));
        dirty |= set_if_changed(&mut snapshot.line_cntl, regs.read(reg::PA_SU_LINE_CNTL));

        let mode = snapshot.su_sc_mode_cntl;
        let cull_front = mode & 0b01 != 0;
        let cull_back = mode & 0b10 != 0;
        self.params.cull_mode = match (cull_front, cull_back) {
            (false, false) => None,
            (true, false) => Some(wgpu::Face::Front),
            (false, true) => Some(wgpu::Face::Back),
            (true, true) => {
                // Both faces culled draws nothing; there is no host cull
                // mode for it.
                return Err(StateError::Unsupported("culling both faces"));
            }
        };
        self.params.front_face = if mode & 0b100 != 0 {
            wgpu::FrontFace::Ccw
        } else {
            wgpu::FrontFace::Cw
        };

        self.params.polygon_mode = if ((mode >> 3) & 0b11) == 2 {
            let front_ptype = (mode >> 5) & 0b111;
            let back_ptype = (mode >> 8) & 0b111;
            if front_ptype != back_ptype && !self.caps.separate_fill_modes {
                return Err(StateError::Unsupported(
                    "different front/back polygon fill modes",
                ));
            }
            let polygon_mode = match front_ptype {
                POLY_PTYPE_POINT => wgpu::PolygonMode::Point,
                POLY_PTYPE_LINE => wgpu::PolygonMode::Line,
                _ => wgpu::PolygonMode::Fill,
            };
            if polygon_mode != wgpu::PolygonMode::Fill && !self.caps.non_solid_fill {
                return Err(StateError::Unsupported("non-solid polygon fill"));
            }
            polygon_mode
        } else {
            wgpu::PolygonMode::Fill
        };

        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_multisample(
        &mut self,
        regs: &impl RegisterFile,
    ) -> Result<UpdateStatus, StateError> {
        let samples = MsaaSamples::from_raw(regs.read(reg::RB_SURFACE_INFO) >> 16);
        if samples.count() > self.caps.max_sample_count {
            return Err(StateError::Unsupported("sample count above host limit"));
        }

        let snapshot = &mut self.multisample;
        let mut dirty = false;
        dirty |= set_if_changed(&mut snapshot.sample_count, samples.count());
        dirty |= set_if_changed(&mut snapshot.aa_config, regs.read(reg::PA_SC_AA_CONFIG));

        self.params.sample_count = snapshot.sample_count;
        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_depth_stencil(
        &mut self,
        regs: &impl RegisterFile,
    ) -> Result<UpdateStatus, StateError> {
        let snapshot = &mut self.depth_stencil;
        let mut dirty = false;
        dirty |= set_if_changed(&mut snapshot.depth_control, regs.read(reg::RB_DEPTHCONTROL));
        dirty |= set_if_changed(&mut snapshot.depth_info, regs.read(reg::RB_DEPTH_INFO));

        let control = snapshot.depth_control;
        let depth_test = control & 0b010 != 0;
        let params = &mut self.params.depth_stencil;
        if depth_test {
            params.depth_compare = compare_function(control >> 4);
            params.depth_write_enabled = control & 0b100 != 0;
        } else {
            params.depth_compare = wgpu::CompareFunction::Always;
            params.depth_write_enabled = false;
        }

        let stencil_enable = control & 0b001 != 0;
        if stencil_enable {
            let front = wgpu::StencilFaceState {
                compare: compare_function(control >> 8),
                fail_op: stencil_operation(control >> 11),
                pass_op: stencil_operation(control >> 14),
                depth_fail_op: stencil_operation(control >> 17),
            };
            // Separate back-face state only when BACKFACE_ENABLE is set.
            let back = if control & (1 << 7) != 0 {
                wgpu::StencilFaceState {
                    compare: compare_function(control >> 20),
                    fail_op: stencil_operation(control >> 23),
                    pass_op: stencil_operation(control >> 26),
                    depth_fail_op: stencil_operation(control >> 29),
                }
            } else {
                front
            };
            params.stencil.front = front;
            params.stencil.back = back;
        } else {
            params.stencil.front = wgpu::StencilFaceState::IGNORE;
            params.stencil.back = wgpu::StencilFaceState::IGNORE;
        }
        // Compare/write masks stay dynamic; the baked masks are all-ones.
        params.stencil.read_mask = 0xFF;
        params.stencil.write_mask = 0xFF;

        Ok(UpdateStatus::from_dirty(dirty))
    }

    pub(super) fn update_color_blend(
        &mut self,
        regs: &impl RegisterFile,
    ) -> Result<UpdateStatus, StateError> {
        let snapshot = &mut self.color_blend;
        let mut dirty = false;
        dirty |= set_if_changed(&mut snapshot.color_control, regs.read(reg::RB_COLORCONTROL));
        for (slot, index) in snapshot.blend_control.iter_mut().zip(reg::BLENDCONTROL) {
            dirty |= set_if_changed(slot, regs.read(index));
        }
        dirty |= set_if_changed(&mut snapshot.color_mask, regs.read(reg::RB_COLOR_MASK));

        for (index, target) in self.params.color_targets.iter_mut().enumerate() {
            let Some(target) = target.as_mut() else {
                continue;
            };
            target.write_mask = wgpu::ColorWrites::from_bits_truncate(
                (snapshot.color_mask >> (index * 4)) & 0xF,
            );

            let control = snapshot.blend_control[index];
            let color = wgpu::BlendComponent {
                src_factor: blend_factor(control),
                operation: blend_operation(control >> 5),
                dst_factor: blend_factor(control >> 8),
            };
            let alpha = wgpu::BlendComponent {
                src_factor: blend_factor(control >> 16),
                operation: blend_operation(control >> 21),
                dst_factor: blend_factor(control >> 24),
            };
            let passthrough = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
                dst_factor: wgpu::BlendFactor::Zero,
            };
            target.blend = if color == passthrough && alpha == passthrough {
                None
            } else {
                Some(wgpu::BlendState { color, alpha })
            };
        }

        Ok(UpdateStatus::from_dirty(dirty))
    }
}
