//! Shadow register snapshots and dirty tracking.
//!
//! Each pipeline-state category keeps a plain `#[repr(C)]` snapshot of the
//! register values it depends on. Updaters write through [`set_if_changed`]
//! and OR the results; the snapshot bytes double as the category's
//! contribution to the pipeline descriptor hash. Float registers are stored
//! and compared as raw bits, never with an epsilon.

use bytemuck::{Pod, Zeroable};

/// Writes `value` into `slot` and reports whether it differed.
///
/// Comparison is by value; for floats the caller passes raw `u32` bits so
/// the comparison is bit-exact.
pub fn set_if_changed<T: Copy + PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RenderTargetSnapshot {
    pub mode_control: u32,
    pub surface_info: u32,
    pub color_info: [u32; 4],
    pub depth_info: u32,
    pub color_mask: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ShaderStagesSnapshot {
    /// Microcode hash of the bound vertex shader.
    pub vertex_hash: u64,
    /// Microcode hash of the bound pixel shader; zero for depth-only draws
    /// (the dummy module).
    pub pixel_hash: u64,
    pub program_cntl: u32,
    /// Geometry expansion stage in use (0 = none).
    pub expansion: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexInputSnapshot {
    /// Hash of the vertex layout declared by the bound vertex shader.
    pub layout_hash: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InputAssemblySnapshot {
    pub primitive_type: u32,
    pub restart_enabled: u32,
    pub restart_index: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ViewportSnapshot {
    /// Viewport transform enables; selects the hardware-viewport or
    /// fixed-fallback path in the dynamic applier.
    pub vte_cntl: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RasterizationSnapshot {
    pub su_sc_mode_cntl: u32,
    pub clip_cntl: u32,
    pub line_cntl: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MultisampleSnapshot {
    pub sample_count: u32,
    pub aa_config: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DepthStencilSnapshot {
    pub depth_control: u32,
    pub depth_info: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ColorBlendSnapshot {
    pub color_control: u32,
    pub blend_control: [u32; 4],
    pub color_mask: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_if_changed_reports_first_write_and_changes() {
        let mut slot = 0u32;
        assert!(!set_if_changed(&mut slot, 0));
        assert!(set_if_changed(&mut slot, 7));
        assert!(!set_if_changed(&mut slot, 7));
        assert!(set_if_changed(&mut slot, 8));
        assert_eq!(slot, 8);
    }

    #[test]
    fn float_bits_compare_exactly() {
        // -0.0 and 0.0 are equal as floats but distinct as register bits;
        // shadowing raw bits must treat them as a change.
        let mut slot = 0.0f32.to_bits();
        assert!(set_if_changed(&mut slot, (-0.0f32).to_bits()));
    }

    #[test]
    fn snapshots_have_no_padding() {
        // Pod-derive would reject padding at compile time; these sizes pin
        // the hashed byte footprint of each category.
        assert_eq!(std::mem::size_of::<RenderTargetSnapshot>(), 32);
        assert_eq!(std::mem::size_of::<ShaderStagesSnapshot>(), 24);
        assert_eq!(std::mem::size_of::<ColorBlendSnapshot>(), 24);
    }
}
