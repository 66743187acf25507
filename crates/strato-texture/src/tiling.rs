//! Tiled (swizzled) address computation.
//!
//! The guest GPU stores tiled surfaces in a bit-interleaved layout tuned for
//! its memory controller. The mappings below were reverse engineered from the
//! hardware's tiling helpers and must stay bit-exact: any deviation corrupts
//! every tiled texture upload. Shifts, masks and additions only.

use crate::align_up;

/// Maps a logical 2D block coordinate to its byte offset inside a tiled
/// subresource.
///
/// `pitch` is the subresource width in blocks (it is tile-aligned
/// internally); `bpp_log2` is log2 of the bytes per block.
pub fn tiled_offset_2d(x: u32, y: u32, pitch: u32, bpp_log2: u32) -> u32 {
    let width = align_up(pitch, 32);
    // Macro tile (32x32 blocks), then the 8x2 micro tile inside it.
    let macro_off = ((x >> 5) + (y >> 5) * (width >> 5)) << (bpp_log2 + 7);
    let micro = ((x & 7) + ((y & 6) << 2)) << bpp_log2;
    let offset = macro_off
        + ((micro & !15) << 1)
        + (micro & 15)
        + ((y & 8) << (3 + bpp_log2))
        + ((y & 1) << 4);
    ((offset & !511) << 3)
        + ((offset & 448) << 2)
        + (offset & 63)
        + ((y & 16) << 7)
        + (((((y & 8) >> 2) + (x >> 3)) & 3) << 6)
}

/// Maps a logical 3D block coordinate to its byte offset inside a tiled
/// volume subresource.
///
/// Volume tiles are 32x32x4 blocks; `pitch` and `height` are the subresource
/// width/height in blocks. Reconstructed from the hardware's volume-tiling
/// helper; the low-bit mixing mirrors the 2D scheme with the intra-slab z
/// folded into the micro tile.
pub fn tiled_offset_3d(x: u32, y: u32, z: u32, pitch: u32, height: u32, bpp_log2: u32) -> u32 {
    let width = align_up(pitch, 32);
    let height = align_up(height, 32);
    // 4-deep slabs of 32x16 macro columns.
    let macro_outer = ((y >> 4) + (z >> 2) * (height >> 4)) * (width >> 5);
    let macro_off = ((((x >> 5) + macro_outer) << (bpp_log2 + 6)) & 0x0FFF_FFFF) << 1;
    let micro = (((x & 7) + ((y & 6) << 2)) << (bpp_log2 + 6)) >> 6;
    let offset_outer = ((y >> 3) + (z >> 2)) & 1;
    let offset1 = offset_outer + ((((x >> 3) + (offset_outer << 1)) & 3) << 1);
    let offset2 = ((macro_off + (micro & !15)) << 1)
        + (micro & 15)
        + ((z & 3) << (bpp_log2 + 6))
        + ((y & 1) << 4);
    ((offset2 & !63) << 3) + (offset1 << 6) + (offset2 & 63)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn offsets_within_one_tile_are_distinct() {
        // Every (x, y) inside a 32x32 tile must map to a unique byte offset
        // for a given bytes-per-block.
        for bpp_log2 in [0u32, 1, 2] {
            let mut seen = HashSet::new();
            for y in 0..32 {
                for x in 0..32 {
                    let offset = tiled_offset_2d(x, y, 32, bpp_log2);
                    assert!(
                        seen.insert(offset),
                        "duplicate offset {offset} at ({x}, {y}), bpp_log2 {bpp_log2}"
                    );
                }
            }
            assert_eq!(seen.len(), 32 * 32);
        }
    }

    #[test]
    fn offset_is_a_pure_function() {
        let a = tiled_offset_2d(17, 23, 128, 2);
        let b = tiled_offset_2d(17, 23, 128, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn origin_maps_to_zero() {
        assert_eq!(tiled_offset_2d(0, 0, 256, 2), 0);
        assert_eq!(tiled_offset_3d(0, 0, 0, 32, 32, 2), 0);
    }

    #[test]
    fn pitch_is_tile_aligned_internally() {
        // Pitches inside the same 32-block tile column behave identically.
        assert_eq!(tiled_offset_2d(5, 9, 33, 1), tiled_offset_2d(5, 9, 64, 1));
    }

    #[test]
    fn volume_offsets_are_distinct_within_a_slab() {
        let mut seen = HashSet::new();
        for z in 0..4 {
            for y in 0..32 {
                for x in 0..32 {
                    let offset = tiled_offset_3d(x, y, z, 32, 32, 1);
                    assert!(
                        seen.insert(offset),
                        "duplicate volume offset {offset} at ({x}, {y}, {z})"
                    );
                }
            }
        }
        assert_eq!(seen.len(), 4 * 32 * 32);
    }
}
