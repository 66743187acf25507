//! Per-draw dynamic state.
//!
//! The host lets viewport, scissor, depth bias, blend constants, stencil
//! reference/masks and a small push-constant block vary without a pipeline
//! rebuild. On every draw each value is recomputed from the registers,
//! compared against the last value issued, and only pushed when it differs
//! (or unconditionally on `full_update`, after a context rebind or pipeline
//! change).

use bytemuck::{Pod, Zeroable};
use tracing::trace;

use crate::host::{HostCommandSink, ScissorRect, Viewport};
use crate::regs::{reg, sign_extend_window_offset, RegisterFile, VteCntl};
use crate::translate::MsaaSamples;

/// Viewport extent used when the hardware viewport transform is disabled:
/// the guest then works in a fixed 2560x2560 window space.
const FALLBACK_VIEWPORT_EXTENT: f32 = 2560.0;

/// Push-constant block handed to the host on change.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DrawConstants {
    /// xy: MSAA window scale; zw: signed window offset.
    pub window_scale: [f32; 4],
    /// Vertex attribute unnormalization flags: xy format, z format,
    /// w0 format (1.0 = already transformed), plus padding.
    pub vertex_format: [f32; 4],
    /// xy: point width/height; zw: clamp min/max. 12.4 fixed point in the
    /// registers.
    pub point_size: [f32; 4],
    /// x: alpha test enable; y: compare function; z: reference value.
    pub alpha_test: [f32; 4],
    /// Per-render-target exponent bias as a linear scale (2^bias).
    pub color_exp_bias: [f32; 4],
    /// Interpolator index receiving generated parameters, `u32::MAX` when
    /// param generation is off.
    pub param_gen_index: u32,
    pub _pad: [u32; 3],
}

/// Shadow of the dynamic values last issued to the host.
#[derive(Default)]
pub struct DynamicState {
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    blend_constants: Option<[f32; 4]>,
    depth_bias: Option<(f32, f32)>,
    stencil_reference: Option<u32>,
    stencil_compare_mask: Option<u32>,
    stencil_write_mask: Option<u32>,
    draw_constants: Option<DrawConstants>,
}

fn update<T: Copy + PartialEq>(shadow: &mut Option<T>, value: T, full_update: bool) -> bool {
    if full_update || *shadow != Some(value) {
        *shadow = Some(value);
        true
    } else {
        false
    }
}

impl DynamicState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every issued value, forcing the next [`apply`](Self::apply)
    /// to re-issue everything even without `full_update`.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    /// Recomputes all dynamic state from `regs` and pushes what changed.
    pub fn apply(
        &mut self,
        regs: &impl RegisterFile,
        full_update: bool,
        sink: &mut impl HostCommandSink,
    ) {
        let samples = MsaaSamples::from_raw(regs.read(reg::RB_SURFACE_INFO) >> 16);
        let (scale_x, scale_y) = samples.window_scale();
        let window_offset = regs.read(reg::PA_SC_WINDOW_OFFSET);
        let offset_x = sign_extend_window_offset(window_offset);
        let offset_y = sign_extend_window_offset(window_offset >> 16);

        let viewport = compute_viewport(regs, scale_x, scale_y, offset_x, offset_y);
        if update(&mut self.viewport, viewport, full_update) {
            trace!(?viewport, "set viewport");
            sink.set_viewport(viewport);
        }

        let scissor = compute_scissor(regs, scale_x, scale_y, offset_x, offset_y);
        if update(&mut self.scissor, scissor, full_update) {
            sink.set_scissor(scissor);
        }

        let bias = compute_depth_bias(regs);
        if update(&mut self.depth_bias, bias, full_update) {
            sink.set_depth_bias(bias.0, bias.1);
        }

        let blend_constants = [
            regs.read_f32(reg::RB_BLEND_RED),
            regs.read_f32(reg::RB_BLEND_GREEN),
            regs.read_f32(reg::RB_BLEND_BLUE),
            regs.read_f32(reg::RB_BLEND_ALPHA),
        ];
        if update(&mut self.blend_constants, blend_constants, full_update) {
            sink.set_blend_constants(blend_constants);
        }

        let refmask = regs.read(reg::RB_STENCILREFMASK);
        if update(&mut self.stencil_reference, refmask & 0xFF, full_update) {
            sink.set_stencil_reference(refmask & 0xFF);
        }
        if update(
            &mut self.stencil_compare_mask,
            (refmask >> 8) & 0xFF,
            full_update,
        ) {
            sink.set_stencil_compare_mask((refmask >> 8) & 0xFF);
        }
        if update(
            &mut self.stencil_write_mask,
            (refmask >> 16) & 0xFF,
            full_update,
        ) {
            sink.set_stencil_write_mask((refmask >> 16) & 0xFF);
        }

        let constants = compute_draw_constants(regs, scale_x, scale_y, offset_x, offset_y);
        if update(&mut self.draw_constants, constants, full_update) {
            sink.push_draw_constants(&constants);
        }
    }
}

fn compute_viewport(
    regs: &impl RegisterFile,
    scale_x: u32,
    scale_y: u32,
    offset_x: i16,
    offset_y: i16,
) -> Viewport {
    let vte = VteCntl::from_bits_truncate(regs.read(reg::PA_CL_VTE_CNTL));
    let scale_x = scale_x as f32;
    let scale_y = scale_y as f32;
    let offset_x = f32::from(offset_x);
    let offset_y = f32::from(offset_y);

    // The enables come in scale/offset pairs per axis; hardware programs
    // them together.
    let xy_enabled = vte.contains(VteCntl::X_SCALE_ENA);
    debug_assert_eq!(
        xy_enabled,
        vte.contains(VteCntl::Y_SCALE_ENA),
        "split viewport enables"
    );

    let (x, y, width, height) = if xy_enabled {
        let xscale = regs.read_f32(reg::PA_CL_VPORT_XSCALE);
        let yscale = regs.read_f32(reg::PA_CL_VPORT_YSCALE);
        let xoffset = if vte.contains(VteCntl::X_OFFSET_ENA) {
            regs.read_f32(reg::PA_CL_VPORT_XOFFSET)
        } else {
            0.0
        };
        let yoffset = if vte.contains(VteCntl::Y_OFFSET_ENA) {
            regs.read_f32(reg::PA_CL_VPORT_YOFFSET)
        } else {
            0.0
        };
        let width = 2.0 * scale_x * xscale;
        let height = 2.0 * scale_y * yscale;
        (
            scale_x * xoffset - width / 2.0 + offset_x,
            scale_y * yoffset - height / 2.0 + offset_y,
            width,
            height,
        )
    } else {
        // Viewport transform disabled: positions arrive in a fixed
        // 2560x2560 window space centered on the origin.
        let width = 2.0 * FALLBACK_VIEWPORT_EXTENT * scale_x;
        let height = 2.0 * FALLBACK_VIEWPORT_EXTENT * scale_y;
        (
            -FALLBACK_VIEWPORT_EXTENT * scale_x + offset_x,
            -FALLBACK_VIEWPORT_EXTENT * scale_y + offset_y,
            width,
            height,
        )
    };

    let (min_depth, max_depth) = if vte.contains(VteCntl::Z_SCALE_ENA) {
        let zscale = regs.read_f32(reg::PA_CL_VPORT_ZSCALE);
        let zoffset = if vte.contains(VteCntl::Z_OFFSET_ENA) {
            regs.read_f32(reg::PA_CL_VPORT_ZOFFSET)
        } else {
            0.0
        };
        (zoffset, zoffset + zscale)
    } else {
        (0.0, 1.0)
    };

    Viewport {
        x,
        y,
        width,
        height,
        min_depth,
        max_depth,
    }
}

fn compute_scissor(
    regs: &impl RegisterFile,
    scale_x: u32,
    scale_y: u32,
    offset_x: i16,
    offset_y: i16,
) -> ScissorRect {
    let tl = regs.read(reg::PA_SC_WINDOW_SCISSOR_TL);
    let br = regs.read(reg::PA_SC_WINDOW_SCISSOR_BR);
    let mut x0 = (tl & 0x7FFF) as i32;
    let mut y0 = ((tl >> 16) & 0x7FFF) as i32;
    let mut x1 = (br & 0x7FFF) as i32;
    let mut y1 = ((br >> 16) & 0x7FFF) as i32;

    // Bit 31 of TL disables the window offset for this rectangle.
    if tl & (1 << 31) == 0 {
        x0 += i32::from(offset_x);
        y0 += i32::from(offset_y);
        x1 += i32::from(offset_x);
        y1 += i32::from(offset_y);
    }

    x0 *= scale_x as i32;
    x1 *= scale_x as i32;
    y0 *= scale_y as i32;
    y1 *= scale_y as i32;

    let x = x0.max(0);
    let y = y0.max(0);
    ScissorRect {
        x: x as u32,
        y: y as u32,
        width: (x1 - x).max(0) as u32,
        height: (y1 - y).max(0) as u32,
    }
}

/// Depth bias as `(constant, slope scale)`.
///
/// The host has a single-sided bias model. Front bias wins unless front
/// faces are culled; when the front bias is zero and the back bias is not,
/// the back bias is used. This mirrors observed hardware-era content, not a
/// documented rule; keep the heuristic as is.
fn compute_depth_bias(regs: &impl RegisterFile) -> (f32, f32) {
    let mode = regs.read(reg::PA_SU_SC_MODE_CNTL);
    let front = if mode & (1 << 11) != 0 {
        (
            regs.read_f32(reg::PA_SU_POLY_OFFSET_FRONT_OFFSET),
            regs.read_f32(reg::PA_SU_POLY_OFFSET_FRONT_SCALE),
        )
    } else {
        (0.0, 0.0)
    };
    let back = if mode & (1 << 12) != 0 {
        (
            regs.read_f32(reg::PA_SU_POLY_OFFSET_BACK_OFFSET),
            regs.read_f32(reg::PA_SU_POLY_OFFSET_BACK_SCALE),
        )
    } else {
        (0.0, 0.0)
    };

    let front_culled = mode & 0b01 != 0;
    if front_culled {
        back
    } else if front == (0.0, 0.0) && back != (0.0, 0.0) {
        back
    } else {
        front
    }
}

fn compute_draw_constants(
    regs: &impl RegisterFile,
    scale_x: u32,
    scale_y: u32,
    offset_x: i16,
    offset_y: i16,
) -> DrawConstants {
    let vte = VteCntl::from_bits_truncate(regs.read(reg::PA_CL_VTE_CNTL));
    let point_size = regs.read(reg::PA_SU_POINT_SIZE);
    let point_minmax = regs.read(reg::PA_SU_POINT_MINMAX);
    let color_control = regs.read(reg::RB_COLORCONTROL);
    let program_cntl = regs.read(reg::SQ_PROGRAM_CNTL);

    let flag = |bit: VteCntl| if vte.contains(bit) { 1.0 } else { 0.0 };

    let mut color_exp_bias = [1.0f32; 4];
    for (bias, index) in color_exp_bias.iter_mut().zip(reg::COLOR_INFO) {
        // Signed 6-bit exponent bias applied as a linear scale.
        let raw = (regs.read(index) >> 16) & 0x3F;
        let exp = if raw & 0x20 != 0 {
            (raw | !0x3F) as i32
        } else {
            raw as i32
        };
        *bias = 2f32.powi(exp);
    }

    let param_gen_index = if program_cntl & (1 << 18) != 0 {
        (regs.read(reg::SQ_CONTEXT_MISC) >> 8) & 0xFF
    } else {
        u32::MAX
    };

    DrawConstants {
        window_scale: [
            scale_x as f32,
            scale_y as f32,
            f32::from(offset_x),
            f32::from(offset_y),
        ],
        vertex_format: [
            flag(VteCntl::VTX_XY_FMT),
            flag(VteCntl::VTX_XY_FMT),
            flag(VteCntl::VTX_Z_FMT),
            flag(VteCntl::VTX_W0_FMT),
        ],
        point_size: [
            ((point_size >> 16) & 0xFFFF) as f32 / 16.0,
            (point_size & 0xFFFF) as f32 / 16.0,
            (point_minmax & 0xFFFF) as f32 / 16.0,
            ((point_minmax >> 16) & 0xFFFF) as f32 / 16.0,
        ],
        alpha_test: [
            if color_control & (1 << 3) != 0 { 1.0 } else { 0.0 },
            (color_control & 0b111) as f32,
            regs.read_f32(reg::RB_ALPHA_REF),
            0.0,
        ],
        color_exp_bias,
        param_gen_index,
        _pad: [0; 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::ArrayRegisterFile;

    #[derive(Default)]
    struct RecordingSink {
        viewports: Vec<Viewport>,
        scissors: Vec<ScissorRect>,
        blend_constants: Vec<[f32; 4]>,
        depth_biases: Vec<(f32, f32)>,
        stencil_references: Vec<u32>,
        draw_constants: Vec<DrawConstants>,
    }

    impl HostCommandSink for RecordingSink {
        fn set_viewport(&mut self, viewport: Viewport) {
            self.viewports.push(viewport);
        }
        fn set_scissor(&mut self, scissor: ScissorRect) {
            self.scissors.push(scissor);
        }
        fn set_blend_constants(&mut self, color: [f32; 4]) {
            self.blend_constants.push(color);
        }
        fn set_depth_bias(&mut self, constant: f32, slope_scale: f32) {
            self.depth_biases.push((constant, slope_scale));
        }
        fn set_stencil_reference(&mut self, reference: u32) {
            self.stencil_references.push(reference);
        }
        fn set_stencil_compare_mask(&mut self, _mask: u32) {}
        fn set_stencil_write_mask(&mut self, _mask: u32) {}
        fn push_draw_constants(&mut self, constants: &DrawConstants) {
            self.draw_constants.push(*constants);
        }
    }

    fn base_regs() -> ArrayRegisterFile {
        let mut regs = ArrayRegisterFile::new();
        // Hardware viewport: 1280x720 centered.
        regs.write(reg::PA_CL_VTE_CNTL, 0b111111);
        regs.write_f32(reg::PA_CL_VPORT_XSCALE, 640.0);
        regs.write_f32(reg::PA_CL_VPORT_XOFFSET, 640.0);
        regs.write_f32(reg::PA_CL_VPORT_YSCALE, -360.0);
        regs.write_f32(reg::PA_CL_VPORT_YOFFSET, 360.0);
        regs.write_f32(reg::PA_CL_VPORT_ZSCALE, 1.0);
        regs.write_f32(reg::PA_CL_VPORT_ZOFFSET, 0.0);
        regs.write(reg::PA_SC_WINDOW_SCISSOR_BR, (720 << 16) | 1280);
        regs
    }

    #[test]
    fn unchanged_registers_issue_nothing_on_second_apply() {
        let regs = base_regs();
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);
        let first_count = sink.viewports.len();
        assert_eq!(first_count, 1);

        dynamic.apply(&regs, false, &mut sink);
        assert_eq!(sink.viewports.len(), first_count);
        assert_eq!(sink.scissors.len(), 1);
        assert_eq!(sink.draw_constants.len(), 1);
    }

    #[test]
    fn full_update_reissues_everything() {
        let regs = base_regs();
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);
        dynamic.apply(&regs, true, &mut sink);
        assert_eq!(sink.viewports.len(), 2);
        assert_eq!(sink.blend_constants.len(), 2);
    }

    #[test]
    fn hardware_viewport_math() {
        let regs = base_regs();
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);

        let viewport = sink.viewports[0];
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, -720.0);
        assert_eq!(viewport.x, 0.0);
        // yoffset 360 - height/2 (=-360) = 720.
        assert_eq!(viewport.y, 720.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn disabled_viewport_uses_fixed_window_space() {
        let mut regs = base_regs();
        regs.write(reg::PA_CL_VTE_CNTL, 0);
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);

        let viewport = sink.viewports[0];
        assert_eq!(viewport.width, 5120.0);
        assert_eq!(viewport.height, 5120.0);
        assert_eq!(viewport.x, -2560.0);
        assert_eq!(viewport.y, -2560.0);
    }

    #[test]
    fn window_offset_shifts_viewport_and_scissor() {
        let mut regs = base_regs();
        // x = -16, y = 32 (15-bit signed fields).
        let offset_x = (-16i16 as u16 as u32) & 0x7FFF;
        regs.write(reg::PA_SC_WINDOW_OFFSET, offset_x | (32 << 16));
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);

        assert_eq!(sink.viewports[0].x, -16.0);
        // Scissor x0 = 0 + (-16) clamps to 0; x1 = 1280 - 16 = 1264.
        let scissor = sink.scissors[0];
        assert_eq!(scissor.x, 0);
        assert_eq!(scissor.width, 1264);
        assert_eq!(scissor.y, 32);
        assert_eq!(scissor.height, 720);
    }

    #[test]
    fn msaa_scales_window_dimensions() {
        let mut regs = base_regs();
        regs.write(reg::RB_SURFACE_INFO, 2 << 16); // 4x
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);

        assert_eq!(sink.viewports[0].width, 2560.0);
        assert_eq!(sink.scissors[0].width, 2560);
        assert_eq!(sink.scissors[0].height, 1440);
    }

    #[test]
    fn depth_bias_prefers_front_then_falls_back_to_back() {
        let mut regs = base_regs();
        regs.write(reg::PA_SU_SC_MODE_CNTL, (1 << 11) | (1 << 12));
        regs.write_f32(reg::PA_SU_POLY_OFFSET_FRONT_OFFSET, 4.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_FRONT_SCALE, 1.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_BACK_OFFSET, 8.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_BACK_SCALE, 2.0);
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);
        assert_eq!(sink.depth_biases[0], (4.0, 1.0));

        // Zero front bias with a non-zero back bias: use the back bias.
        regs.write_f32(reg::PA_SU_POLY_OFFSET_FRONT_OFFSET, 0.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_FRONT_SCALE, 0.0);
        dynamic.apply(&regs, false, &mut sink);
        assert_eq!(sink.depth_biases[1], (8.0, 2.0));

        // Front faces culled: the back bias applies even with a non-zero
        // front bias programmed.
        regs.write(reg::PA_SU_SC_MODE_CNTL, (1 << 11) | (1 << 12) | 0b01);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_FRONT_OFFSET, 4.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_FRONT_SCALE, 1.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_BACK_OFFSET, 16.0);
        regs.write_f32(reg::PA_SU_POLY_OFFSET_BACK_SCALE, 4.0);
        dynamic.apply(&regs, false, &mut sink);
        assert_eq!(sink.depth_biases[2], (16.0, 4.0));
    }

    #[test]
    fn stencil_fields_unpack_from_refmask() {
        let mut regs = base_regs();
        regs.write(reg::RB_STENCILREFMASK, 0x00C0_F0AA);
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);
        assert_eq!(sink.stencil_references[0], 0xAA);
    }

    #[test]
    fn param_gen_index_follows_program_cntl() {
        let mut regs = base_regs();
        regs.write(reg::SQ_PROGRAM_CNTL, 1 << 18);
        regs.write(reg::SQ_CONTEXT_MISC, 5 << 8);
        let mut dynamic = DynamicState::new();
        let mut sink = RecordingSink::default();
        dynamic.apply(&regs, true, &mut sink);
        assert_eq!(sink.draw_constants[0].param_gen_index, 5);

        regs.write(reg::SQ_PROGRAM_CNTL, 0);
        dynamic.apply(&regs, false, &mut sink);
        assert_eq!(sink.draw_constants[1].param_gen_index, u32::MAX);
    }
}
