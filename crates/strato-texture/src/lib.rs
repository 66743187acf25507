//! Guest texture layout and addressing for a register-programmed, tile-based
//! guest GPU.
//!
//! The guest stores textures in a proprietary tiled/swizzled memory layout,
//! with small mip levels ("packed mips") sharing a single tile. This crate
//! computes, from a raw texture fetch constant:
//!
//! - decoded texture geometry and guest page addresses ([`fetch`]),
//! - per-mip block extents and byte sizes ([`layout`]),
//! - physical byte offsets inside a tiled subresource ([`tiling`]).
//!
//! Everything here is a pure function of its inputs; callers may use these
//! from any thread. Actual pixel decompression and host resource creation are
//! out of scope.

pub mod fetch;
pub mod format;
pub mod layout;
pub mod tiling;

pub use fetch::{
    component_signs, ComponentSigns, FetchFlags, FetchParams, RawTextureFetch, SwizzleSource,
    TextureFetch, TextureSign, PAGE_SIZE_BYTES,
};
pub use format::{FormatInfo, TextureDimension, TextureFormat};
pub use layout::{
    mip_block_extent, mip_slice_layout, packed_mip_offset, texture_total_size, BlockExtent,
    PackedMipOffset, SliceLayout, TextureSize,
};
pub use tiling::{tiled_offset_2d, tiled_offset_3d};

/// Rounds `value` up to a multiple of `align`. `align` must be a power of two.
pub(crate) fn align_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + (align - 1)) & !(align - 1)
}

/// `floor(log2(value))` for `value >= 1`.
pub(crate) fn log2_floor(value: u32) -> u32 {
    debug_assert!(value != 0);
    31 - value.leading_zeros()
}

/// `ceil(log2(value))` for `value >= 1`.
pub(crate) fn log2_ceil(value: u32) -> u32 {
    debug_assert!(value != 0);
    32 - (value - 1).leading_zeros()
}
