//! Guest texture formats and their storage geometry.
//!
//! Only the geometry of each format matters here (block dimensions and bits
//! per texel); pixel decoding/decompression is handled elsewhere.

use std::fmt;

/// Texture dimensionality as encoded in a fetch constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// 1D texture. Stacking does not apply.
    D1,
    /// 2D texture, possibly an array ("stacked") of 2D slices.
    D2,
    /// Volume texture; depth halves with each mip level.
    D3,
    /// Cube map; always six faces.
    Cube,
}

impl TextureDimension {
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0 => Self::D1,
            1 => Self::D2,
            2 => Self::D3,
            _ => Self::Cube,
        }
    }
}

/// Guest texture formats consumed by the addressing engine.
///
/// The numeric values match the 6-bit format field of the fetch constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureFormat {
    R8 = 2,
    R1G5B5A1 = 3,
    R4G4B4A4 = 4,
    R5G6B5 = 5,
    R8G8 = 10,
    R8G8B8A8 = 6,
    B2G10R10A10 = 7,
    R16 = 14,
    R16G16 = 15,
    R16G16B16A16 = 16,
    R16G16B16A16Float = 26,
    R32Float = 36,
    R32G32Float = 37,
    R32G32B32A32Float = 38,
    Dxt1 = 18,
    Dxt2_3 = 19,
    Dxt4_5 = 20,
    Dxn = 21,
    Dxt5A = 22,
    Ctx1 = 23,
    D24S8 = 44,
    D24FS8 = 45,
}

impl TextureFormat {
    /// Decodes the 6-bit fetch-constant format field. Unknown values fall
    /// back to `R8G8B8A8` so addressing stays deterministic for malformed
    /// guest content.
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0x3F {
            2 => Self::R8,
            3 => Self::R1G5B5A1,
            4 => Self::R4G4B4A4,
            5 => Self::R5G6B5,
            6 => Self::R8G8B8A8,
            7 => Self::B2G10R10A10,
            10 => Self::R8G8,
            14 => Self::R16,
            15 => Self::R16G16,
            16 => Self::R16G16B16A16,
            18 => Self::Dxt1,
            19 => Self::Dxt2_3,
            20 => Self::Dxt4_5,
            21 => Self::Dxn,
            22 => Self::Dxt5A,
            23 => Self::Ctx1,
            26 => Self::R16G16B16A16Float,
            36 => Self::R32Float,
            37 => Self::R32G32Float,
            38 => Self::R32G32B32A32Float,
            44 => Self::D24S8,
            45 => Self::D24FS8,
            _ => Self::R8G8B8A8,
        }
    }

    pub fn info(self) -> FormatInfo {
        match self {
            Self::R8 => FormatInfo::linear(8),
            Self::R1G5B5A1 | Self::R4G4B4A4 | Self::R5G6B5 | Self::R8G8 | Self::R16 => {
                FormatInfo::linear(16)
            }
            Self::R8G8B8A8
            | Self::B2G10R10A10
            | Self::R16G16
            | Self::R32Float
            | Self::D24S8
            | Self::D24FS8 => FormatInfo::linear(32),
            Self::R16G16B16A16 | Self::R16G16B16A16Float | Self::R32G32Float => {
                FormatInfo::linear(64)
            }
            Self::R32G32B32A32Float => FormatInfo::linear(128),
            // BC-style 4x4 block compression. Bits are per texel.
            Self::Dxt1 | Self::Dxt5A | Self::Ctx1 => FormatInfo::compressed(4, 4, 4),
            Self::Dxt2_3 | Self::Dxt4_5 | Self::Dxn => FormatInfo::compressed(4, 4, 8),
        }
    }

}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Storage geometry of a [`TextureFormat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// Block width in texels (1 for uncompressed formats).
    pub block_width: u32,
    /// Block height in texels (1 for uncompressed formats).
    pub block_height: u32,
    /// Storage bits per texel, including compression.
    pub bits_per_pixel: u32,
}

impl FormatInfo {
    const fn linear(bits_per_pixel: u32) -> Self {
        Self {
            block_width: 1,
            block_height: 1,
            bits_per_pixel,
        }
    }

    const fn compressed(block_width: u32, block_height: u32, bits_per_pixel: u32) -> Self {
        Self {
            block_width,
            block_height,
            bits_per_pixel,
        }
    }

    /// Byte size of one block row of `width_blocks` blocks.
    pub fn block_row_bytes(&self, width_blocks: u32) -> u32 {
        width_blocks * self.block_width * self.block_height * self.bits_per_pixel / 8
    }
}
