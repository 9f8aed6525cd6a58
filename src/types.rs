//! Core vertex types: interleaving layouts, primitive kinds, and the records
//! exchanged with the GPU and the vector-output backend.

use bytemuck::{Pod, Zeroable};

/// `GL_QUADS` is a compatibility-profile constant that glow does not name.
pub(crate) const GL_QUADS: u32 = 0x0007;

/// A fixed interleaving scheme of floats per vertex.
///
/// The layout tag fully determines both the contents of a [`VertexBuffer`]
/// and the attribute pointer setup at draw time: stride and offsets are
/// derived from it, never stored separately.
///
/// | layout                  | stride | attributes (float offset)           |
/// |-------------------------|--------|-------------------------------------|
/// | `Vertex`                | 3      | vertex(0)                           |
/// | `VertexNormal`          | 6      | vertex(0), normal(3)                |
/// | `VertexColor`           | 7      | vertex(0), color(3)                 |
/// | `VertexTexture0`        | 5      | vertex(0), texcoord0(3)             |
/// | `VertexNormalColor`     | 10     | vertex(0), normal(3), color(6)      |
/// | `VertexNormalTexture0`  | 8      | vertex(0), normal(3), texcoord0(6)  |
///
/// [`VertexBuffer`]: crate::buffer::VertexBuffer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttribLayout {
    /// Position only.
    Vertex,
    /// Position + surface normal.
    VertexNormal,
    /// Position + RGBA color.
    VertexColor,
    /// Position + palette texture coordinate.
    VertexTexture0,
    /// Position + normal + RGBA color.
    VertexNormalColor,
    /// Position + normal + palette texture coordinate.
    VertexNormalTexture0,
}

impl AttribLayout {
    /// Number of floats per vertex record.
    #[must_use]
    pub fn stride(self) -> usize {
        match self {
            Self::Vertex => 3,
            Self::VertexNormal => 6,
            Self::VertexColor => 7,
            Self::VertexTexture0 => 5,
            Self::VertexNormalColor => 10,
            Self::VertexNormalTexture0 => 8,
        }
    }

    /// Float offset of the normal attribute, if the layout carries one.
    #[must_use]
    pub fn normal_offset(self) -> Option<usize> {
        match self {
            Self::VertexNormal | Self::VertexNormalColor | Self::VertexNormalTexture0 => Some(3),
            _ => None,
        }
    }

    /// Float offset of the RGBA color attribute, if the layout carries one.
    #[must_use]
    pub fn color_offset(self) -> Option<usize> {
        match self {
            Self::VertexColor => Some(3),
            Self::VertexNormalColor => Some(6),
            _ => None,
        }
    }

    /// Float offset of the texture coordinate, if the layout carries one.
    #[must_use]
    pub fn texcoord_offset(self) -> Option<usize> {
        match self {
            Self::VertexTexture0 => Some(3),
            Self::VertexNormalTexture0 => Some(6),
            _ => None,
        }
    }

    /// Whether drawing this layout samples the palette texture.
    #[must_use]
    pub fn is_textured(self) -> bool {
        matches!(self, Self::VertexTexture0 | Self::VertexNormalTexture0)
    }
}

/// The primitive topology a buffer is drawn with.
///
/// Strips and loops exist only on the builder side: [`LineBuilder`] flattens
/// them into discrete segments before they reach a buffer, so buffers only
/// ever hold `Lines`, `Triangles`, or `Quads`.
///
/// [`LineBuilder`]: crate::builder::LineBuilder
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Independent points.
    Points,
    /// Discrete segments, 2 vertices each.
    Lines,
    /// Connected polyline.
    LineStrip,
    /// Connected polyline, closed back to the first vertex.
    LineLoop,
    /// Independent triangles, 3 vertices each.
    Triangles,
    /// Independent quadrilaterals, 4 vertices each.
    Quads,
}

impl PrimitiveKind {
    /// The raw GL enum value for `draw_arrays`.
    #[must_use]
    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Points => glow::POINTS,
            Self::Lines => glow::LINES,
            Self::LineStrip => glow::LINE_STRIP,
            Self::LineLoop => glow::LINE_LOOP,
            Self::Triangles => glow::TRIANGLES,
            Self::Quads => GL_QUADS,
        }
    }

    /// The transform-feedback capture mode, for the primitive kinds that have
    /// a defined reconstruction rule. Points and higher-order primitives have
    /// none and cannot be captured.
    #[must_use]
    pub fn feedback_mode(self) -> Option<u32> {
        match self {
            Self::Triangles => Some(glow::TRIANGLES),
            Self::Lines => Some(glow::LINES),
            _ => None,
        }
    }
}

/// A raw GPU-transformed vertex read back from the transform-feedback buffer.
///
/// Matches the interleaved varying capture order registered at print-program
/// link time: clip-space position, interpolated color, clip-plane signed
/// distance. Produced per draw call and consumed immediately by the
/// reconstruction step; never persisted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FeedbackVertex {
    /// Clip-space position (pre w-divide).
    pub pos: [f32; 4],
    /// Interpolated RGBA color.
    pub color: [f32; 4],
    /// Signed distance to the active clip plane; negative is clipped away.
    pub clip_coord: f32,
}

/// A reconstructed vertex in floating-point device space, as handed to the
/// vector-graphics backend: window coordinates plus depth, and RGBA color.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrintVertex {
    /// Device-space x, y and NDC depth z.
    pub pos: [f32; 3],
    /// RGBA color.
    pub color: [f32; 4],
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stride_matches_layout_table() {
        assert_eq!(AttribLayout::Vertex.stride(), 3);
        assert_eq!(AttribLayout::VertexNormal.stride(), 6);
        assert_eq!(AttribLayout::VertexColor.stride(), 7);
        assert_eq!(AttribLayout::VertexTexture0.stride(), 5);
        assert_eq!(AttribLayout::VertexNormalColor.stride(), 10);
        assert_eq!(AttribLayout::VertexNormalTexture0.stride(), 8);
    }

    #[test]
    fn attribute_offsets_match_layout_table() {
        assert_eq!(AttribLayout::Vertex.normal_offset(), None);
        assert_eq!(AttribLayout::VertexNormal.normal_offset(), Some(3));
        assert_eq!(AttribLayout::VertexColor.color_offset(), Some(3));
        assert_eq!(AttribLayout::VertexTexture0.texcoord_offset(), Some(3));
        assert_eq!(AttribLayout::VertexNormalColor.color_offset(), Some(6));
        assert_eq!(AttribLayout::VertexNormalTexture0.texcoord_offset(), Some(6));
        assert_eq!(AttribLayout::VertexNormalTexture0.color_offset(), None);
    }

    #[test]
    fn only_texture_layouts_are_textured() {
        assert!(AttribLayout::VertexTexture0.is_textured());
        assert!(AttribLayout::VertexNormalTexture0.is_textured());
        assert!(!AttribLayout::VertexNormalColor.is_textured());
    }

    #[test]
    fn feedback_mode_only_for_lines_and_triangles() {
        assert_eq!(
            PrimitiveKind::Triangles.feedback_mode(),
            Some(glow::TRIANGLES)
        );
        assert_eq!(PrimitiveKind::Lines.feedback_mode(), Some(glow::LINES));
        assert_eq!(PrimitiveKind::Points.feedback_mode(), None);
        assert_eq!(PrimitiveKind::Quads.feedback_mode(), None);
    }

    #[test]
    fn feedback_vertex_is_tightly_packed() {
        // The mapped transform-feedback buffer is reinterpreted as a slice of
        // these records; any padding would shear the capture stream.
        assert_eq!(std::mem::size_of::<FeedbackVertex>(), 9 * 4);
    }
}
