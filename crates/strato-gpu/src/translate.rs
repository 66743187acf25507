//! Translation of raw guest register fields into host (`wgpu`) state enums.
//!
//! These are semantic mappings only; anything without a host equivalent is
//! reported as a [`StateError`] so the caller can skip the draw.

use crate::error::StateError;

/// Guest primitive types as encoded in the draw initiator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrimitiveType {
    None = 0,
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    TriangleList = 4,
    TriangleFan = 5,
    TriangleStrip = 6,
    TriangleWithWFlags = 7,
    RectangleList = 8,
    LineLoop = 12,
    QuadList = 13,
    QuadStrip = 14,
    PolygonList = 15,
    TrianglePatch = 17,
    QuadPatch = 18,
}

impl PrimitiveType {
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0x3F {
            1 => Self::PointList,
            2 => Self::LineList,
            3 => Self::LineStrip,
            4 => Self::TriangleList,
            5 => Self::TriangleFan,
            6 => Self::TriangleStrip,
            7 => Self::TriangleWithWFlags,
            8 => Self::RectangleList,
            12 => Self::LineLoop,
            13 => Self::QuadList,
            14 => Self::QuadStrip,
            15 => Self::PolygonList,
            17 => Self::TrianglePatch,
            18 => Self::QuadPatch,
            _ => Self::None,
        }
    }
}

/// Fixed geometry-expansion stages compiled ahead of time.
///
/// Selected purely from `(primitive type, line mode)`; the stage rewrites
/// unsupported primitives into host-native ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GeometryExpansion {
    /// Expands point sprites into screen-aligned quads.
    PointList = 1,
    /// Expands two-vertex "rectangles" into two triangles.
    RectangleList = 2,
    /// Expands four-vertex quads into two triangles.
    QuadList = 3,
    /// Expands quads into line-list outlines for wireframe fill.
    LineQuadList = 4,
}

/// Result of mapping a guest primitive type onto the host topology model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopologyTranslation {
    pub topology: wgpu::PrimitiveTopology,
    /// Geometry stage required to draw this primitive, if any.
    pub expansion: Option<GeometryExpansion>,
    /// The host has no triangle fan; the caller must expand indices.
    pub needs_fan_index_expansion: bool,
}

/// Maps a guest primitive type to a host topology plus any required
/// emulation.
///
/// Tessellation-style primitives and quad strips have no host path and are
/// rejected.
pub fn translate_primitive(
    primitive: PrimitiveType,
    line_mode: bool,
) -> Result<TopologyTranslation, StateError> {
    use wgpu::PrimitiveTopology as T;
    let native = |topology| TopologyTranslation {
        topology,
        expansion: None,
        needs_fan_index_expansion: false,
    };
    match primitive {
        PrimitiveType::PointList => Ok(TopologyTranslation {
            topology: T::TriangleList,
            expansion: Some(GeometryExpansion::PointList),
            needs_fan_index_expansion: false,
        }),
        PrimitiveType::LineList => Ok(native(T::LineList)),
        PrimitiveType::LineStrip | PrimitiveType::LineLoop => Ok(native(T::LineStrip)),
        PrimitiveType::TriangleList => Ok(native(T::TriangleList)),
        PrimitiveType::TriangleStrip => Ok(native(T::TriangleStrip)),
        PrimitiveType::TriangleFan => Ok(TopologyTranslation {
            topology: T::TriangleList,
            expansion: None,
            needs_fan_index_expansion: true,
        }),
        PrimitiveType::RectangleList => Ok(TopologyTranslation {
            topology: T::TriangleList,
            expansion: Some(GeometryExpansion::RectangleList),
            needs_fan_index_expansion: false,
        }),
        PrimitiveType::QuadList => Ok(TopologyTranslation {
            topology: if line_mode { T::LineList } else { T::TriangleList },
            expansion: Some(if line_mode {
                GeometryExpansion::LineQuadList
            } else {
                GeometryExpansion::QuadList
            }),
            needs_fan_index_expansion: false,
        }),
        // Tessellation patches and quad strips have no host path.
        PrimitiveType::None
        | PrimitiveType::TriangleWithWFlags
        | PrimitiveType::QuadStrip
        | PrimitiveType::PolygonList
        | PrimitiveType::TrianglePatch
        | PrimitiveType::QuadPatch => Err(StateError::UnsupportedPrimitive(primitive)),
    }
}

/// 3-bit guest compare function.
pub fn compare_function(raw: u32) -> wgpu::CompareFunction {
    use wgpu::CompareFunction as F;
    match raw & 0b111 {
        0 => F::Never,
        1 => F::Less,
        2 => F::Equal,
        3 => F::LessEqual,
        4 => F::Greater,
        5 => F::NotEqual,
        6 => F::GreaterEqual,
        _ => F::Always,
    }
}

/// 3-bit guest stencil operation.
pub fn stencil_operation(raw: u32) -> wgpu::StencilOperation {
    use wgpu::StencilOperation as S;
    match raw & 0b111 {
        0 => S::Keep,
        1 => S::Zero,
        2 => S::Replace,
        3 => S::IncrementClamp,
        4 => S::DecrementClamp,
        5 => S::Invert,
        6 => S::IncrementWrap,
        _ => S::DecrementWrap,
    }
}

/// 5-bit guest blend factor. Unknown encodings collapse to `One`, which is
/// what the hardware does for reserved values.
pub fn blend_factor(raw: u32) -> wgpu::BlendFactor {
    use wgpu::BlendFactor as B;
    match raw & 0x1F {
        0 => B::Zero,
        1 => B::One,
        4 => B::Src,
        5 => B::OneMinusSrc,
        6 => B::SrcAlpha,
        7 => B::OneMinusSrcAlpha,
        8 => B::Dst,
        9 => B::OneMinusDst,
        10 => B::DstAlpha,
        11 => B::OneMinusDstAlpha,
        12 => B::Constant,
        13 => B::OneMinusConstant,
        14 => B::Constant,
        15 => B::OneMinusConstant,
        16 => B::SrcAlphaSaturated,
        _ => B::One,
    }
}

/// 3-bit guest blend combine function.
pub fn blend_operation(raw: u32) -> wgpu::BlendOperation {
    use wgpu::BlendOperation as O;
    match raw & 0b111 {
        0 => O::Add,
        1 => O::Subtract,
        2 => O::Min,
        3 => O::Max,
        4 => O::ReverseSubtract,
        _ => O::Add,
    }
}

/// Color render-target formats from `RB_COLOR_INFO`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ColorTargetFormat {
    Rgba8 = 0,
    Rgba8Gamma = 1,
    Rgb10A2 = 2,
    Rgb10A2Float = 3,
    Rg16 = 4,
    Rgba16 = 5,
    Rg16Float = 6,
    Rgba16Float = 7,
}

impl ColorTargetFormat {
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0xF {
            1 => Self::Rgba8Gamma,
            2 => Self::Rgb10A2,
            3 => Self::Rgb10A2Float,
            4 => Self::Rg16,
            5 => Self::Rgba16,
            6 => Self::Rg16Float,
            7 => Self::Rgba16Float,
            _ => Self::Rgba8,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as F;
        match self {
            Self::Rgba8 => F::Rgba8Unorm,
            Self::Rgba8Gamma => F::Rgba8UnormSrgb,
            Self::Rgb10A2 => F::Rgb10a2Unorm,
            // No 10-bit float target on the host; widen to half floats.
            Self::Rgb10A2Float => F::Rgba16Float,
            Self::Rg16 => F::Rg16Unorm,
            Self::Rgba16 => F::Rgba16Unorm,
            Self::Rg16Float => F::Rg16Float,
            Self::Rgba16Float => F::Rgba16Float,
        }
    }
}

/// Depth/stencil formats from `RB_DEPTH_INFO`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DepthTargetFormat {
    D24S8 = 0,
    D24FS8 = 1,
}

impl DepthTargetFormat {
    pub fn from_raw(raw: u32) -> Self {
        if raw & 1 != 0 {
            Self::D24FS8
        } else {
            Self::D24S8
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::D24S8 => wgpu::TextureFormat::Depth24PlusStencil8,
            // 20e4 float depth widens to 32-bit float on the host.
            Self::D24FS8 => wgpu::TextureFormat::Depth32FloatStencil8,
        }
    }
}

/// MSAA mode from `RB_SURFACE_INFO`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsaaSamples {
    X1,
    X2,
    X4,
}

impl MsaaSamples {
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            1 => Self::X2,
            2 => Self::X4,
            _ => Self::X1,
        }
    }

    pub fn count(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    /// Scaling the sample pattern applies to guest window width/height.
    pub fn window_scale(self) -> (u32, u32) {
        match self {
            Self::X1 => (1, 1),
            Self::X2 => (1, 2),
            Self::X4 => (2, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_strip_is_rejected() {
        assert_eq!(
            translate_primitive(PrimitiveType::QuadStrip, false),
            Err(StateError::UnsupportedPrimitive(PrimitiveType::QuadStrip))
        );
    }

    #[test]
    fn quad_list_expansion_follows_line_mode() {
        let solid = translate_primitive(PrimitiveType::QuadList, false).unwrap();
        assert_eq!(solid.expansion, Some(GeometryExpansion::QuadList));
        assert_eq!(solid.topology, wgpu::PrimitiveTopology::TriangleList);

        let wire = translate_primitive(PrimitiveType::QuadList, true).unwrap();
        assert_eq!(wire.expansion, Some(GeometryExpansion::LineQuadList));
        assert_eq!(wire.topology, wgpu::PrimitiveTopology::LineList);
    }

    #[test]
    fn triangle_fan_needs_index_expansion() {
        let fan = translate_primitive(PrimitiveType::TriangleFan, false).unwrap();
        assert!(fan.needs_fan_index_expansion);
        assert_eq!(fan.expansion, None);
    }

    #[test]
    fn blend_factor_reserved_values_collapse_to_one() {
        assert_eq!(blend_factor(2), wgpu::BlendFactor::One);
        assert_eq!(blend_factor(16), wgpu::BlendFactor::SrcAlphaSaturated);
    }
}
