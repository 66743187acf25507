//! Texture fetch constant decoding.
//!
//! A texture fetch constant is a group of six 32-bit registers describing one
//! texture: dimensions, guest addresses, format, tiling flags and the
//! component swizzle. Dimensions are stored minus one; addresses are 4 KiB
//! page indices. [`TextureFetch::decode`] normalizes all of that into actual
//! counts and resolves the mip range against the texture geometry.

use bitflags::bitflags;
use tracing::warn;

use crate::format::{TextureDimension, TextureFormat};
use crate::log2_floor;

/// Guest page size used for texture base/mip addresses.
pub const PAGE_SIZE_BYTES: u32 = 4096;

bitflags! {
    /// Layout flags decoded from a fetch constant.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FetchFlags: u32 {
        /// The subresources use the tiled physical layout.
        const TILED = 1 << 0;
        /// 2D texture with stacked array slices.
        const STACKED = 1 << 1;
        /// Small mip levels share a single packed tile.
        const PACKED_MIPS = 1 << 2;
    }
}

/// Per-channel sign mode stored in the fetch constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureSign {
    Unsigned = 0,
    Signed = 1,
    UnsignedBiased = 2,
    Gamma = 3,
}

impl TextureSign {
    fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0 => Self::Unsigned,
            1 => Self::Signed,
            2 => Self::UnsignedBiased,
            _ => Self::Gamma,
        }
    }
}

/// What a shader-visible component reads from: a raw channel or a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwizzleSource {
    Channel(u8),
    Zero,
    One,
}

impl SwizzleSource {
    fn from_raw(raw: u32) -> Self {
        match raw & 0b111 {
            c @ 0..=3 => Self::Channel(c as u8),
            4 => Self::Zero,
            _ => Self::One,
        }
    }
}

/// Resolved per-component signedness for one fetch constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentSigns {
    /// Sign mode feeding each of the four shader-visible components.
    /// Components sourced from constant 0/1 report `Unsigned`.
    pub signs: [TextureSign; 4],
    /// `true` when at least one component reads signed data and none read
    /// unsigned real data, in which case a signed host view is preferred.
    pub prefer_signed: bool,
}

/// The raw six-dword fetch constant as read from the register file.
///
/// Field layout (dword.bits):
/// - `0.[1:0]` constant type, `0.[3:2]`..`0.[9:8]` per-channel signs,
///   `0.[30:22]` pitch in 32-block units, `0.[31]` tiled
/// - `1.[5:0]` format, `1.[7:6]` endianness, `1.[8]` stacked,
///   `1.[31:12]` base page
/// - `2` size (packed by dimension, stored minus one)
/// - `3.[0]` numeric format, `3.[12:1]` swizzle (3 bits per component)
/// - `4.[3:0]` min mip level, `4.[7:4]` max mip level, `4.[31:30]` dimension
/// - `5.[0]` packed mips, `5.[31:12]` mip page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawTextureFetch {
    pub dwords: [u32; 6],
}

impl RawTextureFetch {
    pub fn sign(&self, channel: usize) -> TextureSign {
        debug_assert!(channel < 4);
        TextureSign::from_raw(self.dwords[0] >> (2 + channel * 2))
    }

    pub fn pitch_blocks(&self) -> u32 {
        ((self.dwords[0] >> 22) & 0x1FF) * 32
    }

    pub fn is_tiled(&self) -> bool {
        self.dwords[0] & (1 << 31) != 0
    }

    pub fn format(&self) -> TextureFormat {
        TextureFormat::from_raw(self.dwords[1])
    }

    pub fn is_stacked(&self) -> bool {
        self.dwords[1] & (1 << 8) != 0
    }

    pub fn base_page(&self) -> u32 {
        self.dwords[1] >> 12
    }

    pub fn swizzle(&self, component: usize) -> SwizzleSource {
        debug_assert!(component < 4);
        SwizzleSource::from_raw(self.dwords[3] >> (1 + component * 3))
    }

    pub fn mip_min_level(&self) -> u32 {
        self.dwords[4] & 0xF
    }

    pub fn mip_max_level(&self) -> u32 {
        (self.dwords[4] >> 4) & 0xF
    }

    pub fn dimension(&self) -> TextureDimension {
        TextureDimension::from_raw(self.dwords[4] >> 30)
    }

    pub fn has_packed_mips(&self) -> bool {
        self.dwords[5] & 1 != 0
    }

    pub fn mip_page(&self) -> u32 {
        self.dwords[5] >> 12
    }

    /// Raw size field split by dimension; all stored minus one.
    fn size(&self) -> (u32, u32, u32) {
        let size = self.dwords[2];
        match self.dimension() {
            TextureDimension::D1 => (size & 0xFF_FFFF, 0, 0),
            TextureDimension::D2 | TextureDimension::Cube => {
                (size & 0x1FFF, (size >> 13) & 0x1FFF, size >> 26)
            }
            TextureDimension::D3 => (size & 0x7FF, (size >> 11) & 0x7FF, size >> 22),
        }
    }
}

/// A decoded fetch constant with normalized geometry and a resolved mip
/// range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureFetch {
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub flags: FetchFlags,
    pub width: u32,
    pub height: u32,
    /// Array slices for stacked 2D, six for cube maps, volume depth for 3D,
    /// one otherwise.
    pub depth_or_faces: u32,
    /// Row pitch of the base level in blocks (zero when the guest relies on
    /// the width-derived pitch).
    pub pitch_blocks: u32,
    /// Page index of the base level, zero when the base is unused.
    pub base_page: u32,
    /// Page index of the mip chain, zero when there are no mips.
    pub mip_page: u32,
    pub mip_min_level: u32,
    pub mip_max_level: u32,
}

impl TextureFetch {
    /// Decodes a raw fetch constant.
    ///
    /// Malformed dimension/stacking combinations are a guest-programming
    /// error; decoding warns and clamps deterministically rather than
    /// failing (the resulting geometry is still well-defined).
    pub fn decode(raw: &RawTextureFetch) -> Self {
        let dimension = raw.dimension();
        let (w_minus_1, h_minus_1, d_minus_1) = raw.size();

        let width = w_minus_1 + 1;
        let height = h_minus_1 + 1;
        let depth_or_faces = match dimension {
            TextureDimension::D1 => 1,
            TextureDimension::D2 => {
                if raw.is_stacked() {
                    d_minus_1 + 1
                } else {
                    1
                }
            }
            TextureDimension::D3 => d_minus_1 + 1,
            TextureDimension::Cube => 6,
        };

        match dimension {
            TextureDimension::D1 => {
                if raw.is_stacked() {
                    warn!(dwords = ?raw.dwords, "1D fetch constant with stacking set");
                    debug_assert!(false, "stacked 1D texture");
                }
            }
            TextureDimension::Cube => {
                if raw.is_stacked() {
                    warn!(dwords = ?raw.dwords, "cube fetch constant with stacking set");
                    debug_assert!(false, "stacked cube texture");
                }
            }
            TextureDimension::D2 | TextureDimension::D3 => {}
        }

        let mut flags = FetchFlags::empty();
        flags.set(FetchFlags::TILED, raw.is_tiled());
        flags.set(
            FetchFlags::STACKED,
            dimension == TextureDimension::D2 && raw.is_stacked(),
        );
        flags.set(FetchFlags::PACKED_MIPS, raw.has_packed_mips());

        // The deepest usable level comes from the longest axis.
        let longest = width.max(height).max(match dimension {
            TextureDimension::D3 => depth_or_faces,
            _ => 1,
        });
        let max_level = log2_floor(longest);

        let mut mip_min_level = raw.mip_min_level().min(max_level);
        let mut mip_max_level = raw.mip_max_level().min(max_level);

        let mut base_page = raw.base_page();
        let mut mip_page = raw.mip_page();

        // Texture streaming writes the mip address over the base address
        // while the base level is still non-resident; sample from the mips
        // only.
        if base_page == mip_page {
            mip_min_level = mip_min_level.max(1);
            base_page = 0;
        }
        mip_max_level = mip_max_level.max(mip_min_level);

        if mip_min_level != 0 {
            // Base level never sampled.
            base_page = 0;
        }
        if mip_max_level == 0 {
            // No mips past the base.
            mip_page = 0;
        }

        Self {
            dimension,
            format: raw.format(),
            flags,
            width,
            height,
            depth_or_faces,
            pitch_blocks: raw.pitch_blocks(),
            base_page,
            mip_page,
            mip_min_level,
            mip_max_level,
        }
    }

    pub fn base_address_bytes(&self) -> u32 {
        self.base_page * PAGE_SIZE_BYTES
    }

    pub fn mip_address_bytes(&self) -> u32 {
        self.mip_page * PAGE_SIZE_BYTES
    }
}

/// Resolves the per-component signedness of a fetch constant.
///
/// Components whose swizzle selects a constant 0/1 carry no sign of their
/// own. When every component is a constant, the would-be signs of the raw
/// channels are reported so callers can still pick a host view. A signed
/// host view is preferred when signed data is read and no unsigned real
/// data is.
pub fn component_signs(raw: &RawTextureFetch) -> ComponentSigns {
    let mut signs = [TextureSign::Unsigned; 4];
    let mut any_real = false;
    let mut any_signed = false;
    let mut any_unsigned_real = false;

    for component in 0..4 {
        match raw.swizzle(component) {
            SwizzleSource::Channel(channel) => {
                let sign = raw.sign(channel as usize);
                signs[component] = sign;
                any_real = true;
                match sign {
                    TextureSign::Signed => any_signed = true,
                    TextureSign::Unsigned => any_unsigned_real = true,
                    _ => {}
                }
            }
            SwizzleSource::Zero | SwizzleSource::One => {
                signs[component] = TextureSign::Unsigned;
            }
        }
    }

    if !any_real {
        // All constants: report the raw channels' configured signs.
        for (component, sign) in signs.iter_mut().enumerate() {
            *sign = raw.sign(component);
        }
        any_signed = signs.contains(&TextureSign::Signed);
        any_unsigned_real = signs.contains(&TextureSign::Unsigned);
    }

    ComponentSigns {
        signs,
        prefer_signed: any_signed && !any_unsigned_real,
    }
}

/// Field-level description used to assemble a [`RawTextureFetch`], mainly by
/// the surrounding command processor's tests and tooling.
#[derive(Clone, Copy, Debug)]
pub struct FetchParams {
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub stacked: bool,
    pub tiled: bool,
    pub packed_mips: bool,
    pub base_page: u32,
    pub mip_page: u32,
    pub mip_min_level: u32,
    pub mip_max_level: u32,
    pub signs: [TextureSign; 4],
    pub swizzle: [SwizzleSource; 4],
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            dimension: TextureDimension::D2,
            format: TextureFormat::R8G8B8A8,
            width: 1,
            height: 1,
            depth: 1,
            stacked: false,
            tiled: true,
            packed_mips: true,
            base_page: 0,
            mip_page: 0,
            mip_min_level: 0,
            mip_max_level: 0,
            signs: [TextureSign::Unsigned; 4],
            swizzle: [
                SwizzleSource::Channel(0),
                SwizzleSource::Channel(1),
                SwizzleSource::Channel(2),
                SwizzleSource::Channel(3),
            ],
        }
    }
}

impl FetchParams {
    pub fn pack(&self) -> RawTextureFetch {
        let mut dwords = [0u32; 6];

        dwords[0] = 0b10; // texture constant type
        for (channel, sign) in self.signs.iter().enumerate() {
            dwords[0] |= (*sign as u32) << (2 + channel * 2);
        }
        if self.tiled {
            dwords[0] |= 1 << 31;
        }

        dwords[1] = self.format as u32;
        if self.stacked {
            dwords[1] |= 1 << 8;
        }
        dwords[1] |= self.base_page << 12;

        dwords[2] = match self.dimension {
            TextureDimension::D1 => (self.width - 1) & 0xFF_FFFF,
            TextureDimension::D2 | TextureDimension::Cube => {
                ((self.width - 1) & 0x1FFF)
                    | (((self.height - 1) & 0x1FFF) << 13)
                    | (((self.depth - 1) & 0x3F) << 26)
            }
            TextureDimension::D3 => {
                ((self.width - 1) & 0x7FF)
                    | (((self.height - 1) & 0x7FF) << 11)
                    | (((self.depth - 1) & 0x3FF) << 22)
            }
        };

        for (component, source) in self.swizzle.iter().enumerate() {
            let raw = match source {
                SwizzleSource::Channel(c) => *c as u32,
                SwizzleSource::Zero => 4,
                SwizzleSource::One => 5,
            };
            dwords[3] |= raw << (1 + component * 3);
        }

        dwords[4] = (self.mip_min_level & 0xF)
            | ((self.mip_max_level & 0xF) << 4)
            | (match self.dimension {
                TextureDimension::D1 => 0,
                TextureDimension::D2 => 1,
                TextureDimension::D3 => 2,
                TextureDimension::Cube => 3,
            } << 30);

        if self.packed_mips {
            dwords[5] |= 1;
        }
        dwords[5] |= self.mip_page << 12;

        RawTextureFetch { dwords }
    }
}
