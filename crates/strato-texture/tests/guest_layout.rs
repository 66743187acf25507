//! Addressing flow as the texture cache uses it: decode a fetch constant,
//! size the subresources, and locate blocks inside the tiled layout.

use strato_texture::{
    mip_block_extent, mip_slice_layout, packed_mip_offset, texture_total_size, tiled_offset_2d,
    FetchParams, TextureDimension, TextureFetch, TextureFormat,
};

#[test]
fn decoded_fetch_drives_layout_queries() {
    let params = FetchParams {
        width: 256,
        height: 256,
        format: TextureFormat::Dxt1,
        base_page: 0x40,
        mip_page: 0x80,
        mip_max_level: 15,
        ..FetchParams::default()
    };
    let fetch = TextureFetch::decode(&params.pack());
    assert_eq!(fetch.mip_max_level, 8);

    // Base level: 64x64 DXT1 blocks, tiled, one slice.
    let extent = mip_block_extent(
        fetch.dimension,
        fetch.width,
        fetch.height,
        fetch.depth_or_faces,
        fetch.format,
        0,
    );
    let layout = mip_slice_layout(extent, true, fetch.format, true);
    assert_eq!(layout.row_pitch_bytes, 512);
    assert_eq!(layout.size_bytes, 512 * 64);

    let total = texture_total_size(
        fetch.dimension,
        fetch.width,
        fetch.height,
        fetch.depth_or_faces,
        fetch.format,
        true,
        fetch.mip_max_level,
    );
    assert_eq!(total.base_size_bytes, layout.size_bytes);
    assert!(total.mip_chain_size_bytes > 0);

    // 256x256 DXT1 packs once the shorter axis reaches 16 texels: mip 4.
    assert!(packed_mip_offset(256, 256, 1, TextureFormat::Dxt1, 3).is_none());
    assert!(packed_mip_offset(256, 256, 1, TextureFormat::Dxt1, 4).is_some());
}

#[test]
fn tiled_offsets_stay_inside_the_slice() {
    let extent = mip_block_extent(
        TextureDimension::D2,
        128,
        128,
        1,
        TextureFormat::R8G8B8A8,
        0,
    );
    let layout = mip_slice_layout(extent, true, TextureFormat::R8G8B8A8, false);

    for y in (0..128).step_by(17) {
        for x in (0..128).step_by(13) {
            let offset = tiled_offset_2d(x, y, extent.width_blocks, 2);
            assert!(
                offset + 4 <= layout.size_bytes,
                "block ({x}, {y}) addressed past the slice: {offset}"
            );
        }
    }
}
