//! Immediate-style geometry builders.
//!
//! A builder lives for one logical draw call: begin it on a parent
//! [`BufferCollection`], push vertices and attribute state, and `end()` it to
//! move the accumulated records into the buffer selected by the resulting
//! (layout, primitive) key. The move empties the builder; `end()` consumes it.

use crate::buffer::BufferCollection;
use crate::types::{AttribLayout, PrimitiveKind};

/// Accumulates line geometry, flattening strips and loops into the discrete
/// segments the target buffers store.
///
/// Two orthogonal flags, fixed before the first vertex, select the record
/// layout: per-vertex color appends a trailing RGBA quad to each record, and
/// stippling routes the whole call to the dedicated stipple buffer with no
/// color interleaved (the pattern implies one shared color for the call).
pub struct LineBuilder<'a> {
    parent: &'a mut BufferCollection,
    kind: PrimitiveKind,
    pts: Vec<f32>,
    count: usize,
    color: [f32; 4],
    has_color: bool,
    stippled: bool,
}

impl<'a> LineBuilder<'a> {
    /// Start a line draw call of the given kind (`Lines`, `LineStrip`, or
    /// `LineLoop`) writing into `parent`.
    pub fn begin(parent: &'a mut BufferCollection, kind: PrimitiveKind) -> Self {
        Self {
            parent,
            kind,
            pts: Vec::new(),
            count: 0,
            color: [0.0, 0.0, 0.0, 1.0],
            has_color: false,
            stippled: false,
        }
    }

    /// Interleave the current color into every record. Must be selected
    /// before the first vertex.
    #[must_use]
    pub fn with_color(mut self) -> Self {
        debug_assert_eq!(self.count, 0);
        self.has_color = true;
        self
    }

    /// Mark the call as stippled. Must be selected before the first vertex.
    #[must_use]
    pub fn with_stipple(mut self) -> Self {
        debug_assert_eq!(self.count, 0);
        self.stippled = true;
        self
    }

    fn record_stride(&self) -> usize {
        if self.has_color && !self.stippled {
            7
        } else {
            3
        }
    }

    /// Set the current color, opaque.
    pub fn color(&mut self, r: f32, g: f32, b: f32) {
        self.color = [r, g, b, 1.0];
    }

    /// Set the current color with alpha.
    pub fn color4(&mut self, rgba: [f32; 4]) {
        self.color = rgba;
    }

    /// Push a vertex. In strip and loop mode, every vertex after the second
    /// is prefixed with a copy of the previous record, so the pending data is
    /// always a flat sequence of independent segments.
    pub fn vertex(&mut self, x: f32, y: f32, z: f32) {
        let stride = self.record_stride();
        if self.count >= 2
            && matches!(self.kind, PrimitiveKind::LineStrip | PrimitiveKind::LineLoop)
        {
            let start = self.pts.len() - stride;
            self.pts.extend_from_within(start..);
        }
        self.pts.extend_from_slice(&[x, y, z]);
        if self.has_color && !self.stippled {
            self.pts.extend_from_slice(&self.color);
        }
        self.count += 1;
    }

    /// Flush the pending records into the parent collection.
    ///
    /// Degenerate input (fewer than 2 points, or exactly 2 for a loop) is
    /// discarded with no output. A loop gains a closing segment from the last
    /// point back to the first. Kinds other than the three line kinds are
    /// reported and dropped.
    pub fn end(mut self) {
        match self.kind {
            PrimitiveKind::Lines | PrimitiveKind::LineStrip | PrimitiveKind::LineLoop => {}
            other => {
                log::error!("line builder cannot emit {other:?}; dropping {} points", self.count);
                return;
            }
        }
        if self.count < 2 || (self.count == 2 && self.kind == PrimitiveKind::LineLoop) {
            return;
        }
        if self.kind == PrimitiveKind::LineLoop {
            // Closing segment: last point, then first point again.
            let stride = self.record_stride();
            let start = self.pts.len() - stride;
            self.pts.extend_from_within(start..);
            self.pts.extend_from_within(..stride);
        }
        let target = if self.stippled {
            self.parent.stipple_buffer()
        } else if self.has_color {
            self.parent
                .get_buffer(AttribLayout::VertexColor, PrimitiveKind::Lines)
        } else {
            self.parent
                .get_buffer(AttribLayout::Vertex, PrimitiveKind::Lines)
        };
        target.append_floats(&mut self.pts);
    }
}

/// Accumulates triangle and quad geometry with a mandatory per-vertex normal,
/// optionally carrying per-vertex color or a palette texture coordinate
/// (mutually exclusive, fixed before the first vertex).
pub struct PolyBuilder<'a> {
    parent: &'a mut BufferCollection,
    kind: PrimitiveKind,
    pts: Vec<f32>,
    count: usize,
    normal: [f32; 3],
    color: [f32; 4],
    texcoord: [f32; 2],
    use_color: bool,
    use_color_tex: bool,
}

impl<'a> PolyBuilder<'a> {
    /// Start a polygon draw call of the given kind writing into `parent`.
    pub fn begin(parent: &'a mut BufferCollection, kind: PrimitiveKind) -> Self {
        Self {
            parent,
            kind,
            pts: Vec::new(),
            count: 0,
            normal: [0.0, 0.0, 1.0],
            color: [0.0, 0.0, 0.0, 1.0],
            texcoord: [0.0, 0.0],
            use_color: false,
            use_color_tex: false,
        }
    }

    /// Interleave the current color into every record.
    #[must_use]
    pub fn with_color(mut self) -> Self {
        debug_assert_eq!(self.count, 0);
        debug_assert!(!self.use_color_tex);
        self.use_color = true;
        self
    }

    /// Interleave the current palette coordinate into every record.
    #[must_use]
    pub fn with_color_texture(mut self) -> Self {
        debug_assert_eq!(self.count, 0);
        debug_assert!(!self.use_color);
        self.use_color_tex = true;
        self
    }

    /// Set the current normal.
    pub fn normal(&mut self, x: f32, y: f32, z: f32) {
        self.normal = [x, y, z];
    }

    /// Set the current color, opaque.
    pub fn color(&mut self, r: f32, g: f32, b: f32) {
        self.color = [r, g, b, 1.0];
    }

    /// Set the current color with alpha.
    pub fn color4(&mut self, rgba: [f32; 4]) {
        self.color = rgba;
    }

    /// Set the current palette texture coordinate.
    pub fn texcoord(&mut self, u: f32, v: f32) {
        self.texcoord = [u, v];
    }

    /// Push a vertex with the current normal and, per the layout flags, the
    /// current color or palette coordinate.
    pub fn vertex(&mut self, x: f32, y: f32, z: f32) {
        self.pts.extend_from_slice(&[x, y, z]);
        self.pts.extend_from_slice(&self.normal);
        if self.use_color {
            self.pts.extend_from_slice(&self.color);
        } else if self.use_color_tex {
            self.pts.extend_from_slice(&self.texcoord);
        }
        self.count += 1;
    }

    /// Flush the pending records into the parent collection.
    ///
    /// Only `Triangles` and `Quads` are valid here; any other kind is
    /// reported and the pending data dropped.
    pub fn end(mut self) {
        let layout = if self.use_color {
            AttribLayout::VertexNormalColor
        } else if self.use_color_tex {
            AttribLayout::VertexNormalTexture0
        } else {
            AttribLayout::VertexNormal
        };
        if !matches!(self.kind, PrimitiveKind::Triangles | PrimitiveKind::Quads) {
            log::error!(
                "polygon builder cannot emit {:?}; dropping {} vertices",
                self.kind,
                self.count
            );
            return;
        }
        self.parent
            .get_buffer(layout, self.kind)
            .append_floats(&mut self.pts);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pending(coll: &BufferCollection, layout: AttribLayout, kind: PrimitiveKind) -> usize {
        coll.get(layout, kind)
            .map_or(0, crate::buffer::VertexBuffer::pending_vertex_count)
    }

    #[test]
    fn strip_of_three_points_yields_four_records() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::LineStrip);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.vertex(1.0, 1.0, 0.0);
        b.end();
        // 2 segments, 2 records each.
        assert_eq!(pending(&coll, AttribLayout::Vertex, PrimitiveKind::Lines), 4);
    }

    #[test]
    fn strip_duplicates_the_previous_record() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::LineStrip);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.vertex(2.0, 0.0, 0.0);
        b.end();
        let buf = coll.get(AttribLayout::Vertex, PrimitiveKind::Lines).unwrap();
        assert_eq!(
            buf.pending_floats(),
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0]
        );
    }

    #[test]
    fn loop_of_two_points_is_degenerate() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::LineLoop);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.end();
        assert_eq!(pending(&coll, AttribLayout::Vertex, PrimitiveKind::Lines), 0);
    }

    #[test]
    fn loop_of_three_points_closes_back_to_the_first() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::LineLoop);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.vertex(0.0, 1.0, 0.0);
        b.end();
        // 3 segments, closing one included.
        let buf = coll.get(AttribLayout::Vertex, PrimitiveKind::Lines).unwrap();
        assert_eq!(buf.pending_vertex_count(), 6);
        let floats = buf.pending_floats();
        // Final record is the first point again.
        assert_eq!(&floats[floats.len() - 3..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn single_point_is_discarded() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::LineStrip);
        b.vertex(0.0, 0.0, 0.0);
        b.end();
        assert_eq!(pending(&coll, AttribLayout::Vertex, PrimitiveKind::Lines), 0);
    }

    #[test]
    fn discrete_lines_pass_through_unduplicated() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::Lines);
        for i in 0..4 {
            #[allow(clippy::cast_precision_loss)]
            b.vertex(i as f32, 0.0, 0.0);
        }
        b.end();
        assert_eq!(pending(&coll, AttribLayout::Vertex, PrimitiveKind::Lines), 4);
    }

    #[test]
    fn per_vertex_color_interleaves_rgba() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::Lines).with_color();
        b.color(1.0, 0.0, 0.0);
        b.vertex(0.0, 0.0, 0.0);
        b.color(0.0, 1.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.end();
        let buf = coll
            .get(AttribLayout::VertexColor, PrimitiveKind::Lines)
            .unwrap();
        assert_eq!(buf.pending_vertex_count(), 2);
        assert_eq!(
            buf.pending_floats(),
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, //
                1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0,
            ]
        );
    }

    #[test]
    fn stipple_routes_to_the_dedicated_buffer_without_color() {
        let mut coll = BufferCollection::new();
        let mut b = LineBuilder::begin(&mut coll, PrimitiveKind::Lines)
            .with_color()
            .with_stipple();
        b.color(1.0, 0.0, 0.0);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.end();
        // Stipple wins over color: position-only records, dedicated buffer.
        assert_eq!(coll.stipple_buffer().pending_vertex_count(), 2);
        assert_eq!(
            pending(&coll, AttribLayout::VertexColor, PrimitiveKind::Lines),
            0
        );
    }

    #[test]
    fn poly_builder_interleaves_normals() {
        let mut coll = BufferCollection::new();
        let mut b = PolyBuilder::begin(&mut coll, PrimitiveKind::Triangles);
        b.normal(0.0, 0.0, 1.0);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.vertex(0.0, 1.0, 0.0);
        b.end();
        let buf = coll
            .get(AttribLayout::VertexNormal, PrimitiveKind::Triangles)
            .unwrap();
        assert_eq!(buf.pending_vertex_count(), 3);
        assert_eq!(&buf.pending_floats()[..6], &[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn poly_builder_color_selects_ten_float_layout() {
        let mut coll = BufferCollection::new();
        let mut b = PolyBuilder::begin(&mut coll, PrimitiveKind::Quads).with_color();
        b.color(0.5, 0.5, 0.5);
        for _ in 0..4 {
            b.vertex(0.0, 0.0, 0.0);
        }
        b.end();
        let buf = coll
            .get(AttribLayout::VertexNormalColor, PrimitiveKind::Quads)
            .unwrap();
        assert_eq!(buf.pending_vertex_count(), 4);
    }

    #[test]
    fn poly_builder_texture_selects_eight_float_layout() {
        let mut coll = BufferCollection::new();
        let mut b = PolyBuilder::begin(&mut coll, PrimitiveKind::Triangles).with_color_texture();
        b.texcoord(0.25, 0.0);
        for _ in 0..3 {
            b.vertex(0.0, 0.0, 0.0);
        }
        b.end();
        let buf = coll
            .get(AttribLayout::VertexNormalTexture0, PrimitiveKind::Triangles)
            .unwrap();
        assert_eq!(buf.pending_vertex_count(), 3);
    }

    #[test]
    fn poly_builder_rejects_line_kinds() {
        let mut coll = BufferCollection::new();
        let mut b = PolyBuilder::begin(&mut coll, PrimitiveKind::Lines);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.end();
        assert_eq!(
            pending(&coll, AttribLayout::VertexNormal, PrimitiveKind::Lines),
            0
        );
    }
}
