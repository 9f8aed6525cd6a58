//! Buffered geometry: typed float arrays, their GPU upload, and the
//! per-scene collection keyed by (layout, primitive kind).

use std::collections::HashMap;
use std::sync::Arc;

use glow::HasContext;

use crate::handle::BufferHandle;
use crate::state::{Attrib, GlState};
use crate::types::{AttribLayout, PrimitiveKind};

const FLOAT_BYTES: usize = std::mem::size_of::<f32>();

/// Interleaved vertex data tagged with a layout, plus the GPU buffer holding
/// the last uploaded snapshot of it.
///
/// Lifecycle: created empty, appended to by builders across a scene
/// preparation pass, uploaded once via [`buffer_data`](Self::buffer_data),
/// then drawn any number of times until the geometry is rebuilt (cleared and
/// re-appended).
pub struct VertexBuffer {
    layout: AttribLayout,
    data: Vec<f32>,
    /// Number of floats covered by the last upload; drawing covers this many,
    /// not whatever is pending in `data`.
    buffered_size: usize,
    handle: Option<BufferHandle>,
}

impl VertexBuffer {
    /// Create an empty buffer for the given layout.
    #[must_use]
    pub fn new(layout: AttribLayout) -> Self {
        Self {
            layout,
            data: Vec::new(),
            buffered_size: 0,
            handle: None,
        }
    }

    /// The layout this buffer holds.
    #[must_use]
    pub fn layout(&self) -> AttribLayout {
        self.layout
    }

    /// Move a builder's accumulated floats into this buffer.
    ///
    /// This is a transfer of ownership: after the call `src` is empty. The
    /// moved data must consist of whole records of this buffer's layout.
    pub fn append_floats(&mut self, src: &mut Vec<f32>) {
        debug_assert_eq!(src.len() % self.layout.stride(), 0);
        self.data.append(src);
    }

    /// Number of whole vertices pending upload.
    #[must_use]
    pub fn pending_vertex_count(&self) -> usize {
        self.data.len() / self.layout.stride()
    }

    /// Number of whole vertices the last upload covered, which is the count a
    /// draw call will issue.
    #[must_use]
    pub fn buffered_vertex_count(&self) -> usize {
        self.buffered_size / self.layout.stride()
    }

    /// Whether no data is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The pending interleaved floats, in record order.
    #[must_use]
    pub fn pending_floats(&self) -> &[f32] {
        &self.data
    }

    /// Discard pending data for a geometry rebuild. The next upload fully
    /// replaces the previous contents; nothing from the prior pass survives.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Upload the accumulated floats verbatim and record the uploaded count.
    /// No-op (and no GPU calls) when nothing is pending.
    ///
    /// # Safety
    ///
    /// Requires a current GL context matching `gl`.
    ///
    /// # Errors
    ///
    /// Buffer creation can fail on a lost context.
    pub unsafe fn buffer_data(&mut self, gl: &Arc<glow::Context>) -> Result<(), String> {
        if self.data.is_empty() {
            return Ok(());
        }
        debug_assert_eq!(self.data.len() % self.layout.stride(), 0);
        if self.handle.is_none() {
            let raw = unsafe { gl.create_buffer() }?;
            self.handle = Some(BufferHandle::new(Arc::clone(gl), raw));
        }
        if let Some(handle) = &self.handle {
            unsafe {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(handle.raw()));
                gl.buffer_data_u8_slice(
                    glow::ARRAY_BUFFER,
                    bytemuck::cast_slice(&self.data),
                    glow::STATIC_DRAW,
                );
                gl.bind_buffer(glow::ARRAY_BUFFER, None);
            }
        }
        self.buffered_size = self.data.len();
        Ok(())
    }

    /// Draw the uploaded contents as the given primitive kind.
    ///
    /// Selects color or texture mode from the layout, configures the
    /// attribute pointers the layout implies, and issues one `draw_arrays`
    /// over `buffered / stride` vertices. No-op when nothing was uploaded.
    /// Repeated calls on an unchanged buffer issue identical draws.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; `state` must be the context's render
    /// state.
    pub unsafe fn draw(&self, state: &mut GlState, primitive: PrimitiveKind) {
        if self.buffered_size == 0 {
            return;
        }
        let Some(handle) = &self.handle else {
            return;
        };

        unsafe {
            if self.layout.is_textured() {
                state.set_mode_color_texture();
            } else {
                state.set_mode_color();
            }

            let gl = Arc::clone(state.gl());
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(handle.raw()));

            let stride = self.layout.stride();
            // Strides and offsets are a handful of floats, far below i32::MAX.
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let stride_bytes = (stride * FLOAT_BYTES) as i32;
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let byte_off = |floats: usize| (floats * FLOAT_BYTES) as i32;

            state.enable_attrib(Attrib::Vertex);
            if let Some(loc) = state.attrib_loc(Attrib::Vertex) {
                gl.vertex_attrib_pointer_f32(loc, 3, glow::FLOAT, false, stride_bytes, 0);
            }
            if let Some(off) = self.layout.normal_offset() {
                state.enable_attrib(Attrib::Normal);
                if let Some(loc) = state.attrib_loc(Attrib::Normal) {
                    gl.vertex_attrib_pointer_f32(
                        loc,
                        3,
                        glow::FLOAT,
                        false,
                        stride_bytes,
                        byte_off(off),
                    );
                }
            }
            if let Some(off) = self.layout.color_offset() {
                state.enable_attrib(Attrib::Color);
                if let Some(loc) = state.attrib_loc(Attrib::Color) {
                    gl.vertex_attrib_pointer_f32(
                        loc,
                        4,
                        glow::FLOAT,
                        false,
                        stride_bytes,
                        byte_off(off),
                    );
                }
            }
            if let Some(off) = self.layout.texcoord_offset() {
                state.enable_attrib(Attrib::Texcoord0);
                if let Some(loc) = state.attrib_loc(Attrib::Texcoord0) {
                    gl.vertex_attrib_pointer_f32(
                        loc,
                        2,
                        glow::FLOAT,
                        false,
                        stride_bytes,
                        byte_off(off),
                    );
                }
            }

            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let count = (self.buffered_size / stride) as i32;
            gl.draw_arrays(primitive.gl_enum(), 0, count);

            if self.layout.texcoord_offset().is_some() {
                state.disable_attrib(Attrib::Texcoord0);
            }
            if self.layout.color_offset().is_some() {
                state.disable_attrib(Attrib::Color);
            }
            if self.layout.normal_offset().is_some() {
                state.disable_attrib(Attrib::Normal);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }
}

/// The per-scene set of vertex buffers, keyed by (layout, primitive kind).
///
/// Buffers are created on first use; insertion order is irrelevant. Stippled
/// line geometry bypasses the map and lands in one dedicated position-only
/// buffer, since a stipple pattern implies a single shared color for the
/// whole call.
pub struct BufferCollection {
    buffers: HashMap<(AttribLayout, PrimitiveKind), VertexBuffer>,
    stipple_lines: VertexBuffer,
}

impl Default for BufferCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            stipple_lines: VertexBuffer::new(AttribLayout::Vertex),
        }
    }

    /// The buffer for this (layout, primitive) combination, created empty on
    /// first use.
    pub fn get_buffer(
        &mut self,
        layout: AttribLayout,
        primitive: PrimitiveKind,
    ) -> &mut VertexBuffer {
        self.buffers
            .entry((layout, primitive))
            .or_insert_with(|| VertexBuffer::new(layout))
    }

    /// The buffer for this combination, without creating it.
    #[must_use]
    pub fn get(&self, layout: AttribLayout, primitive: PrimitiveKind) -> Option<&VertexBuffer> {
        self.buffers.get(&(layout, primitive))
    }

    /// The dedicated buffer for stippled line segments.
    pub fn stipple_buffer(&mut self) -> &mut VertexBuffer {
        &mut self.stipple_lines
    }

    /// All buffers with their draw primitive, the stipple buffer included.
    pub fn iter(&self) -> impl Iterator<Item = (PrimitiveKind, &VertexBuffer)> {
        self.buffers
            .iter()
            .map(|(&(_, primitive), buf)| (primitive, buf))
            .chain(std::iter::once((
                PrimitiveKind::Lines,
                &self.stipple_lines,
            )))
    }

    /// Discard all pending data for a scene rebuild.
    pub fn clear(&mut self) {
        for buf in self.buffers.values_mut() {
            buf.clear();
        }
        self.stipple_lines.clear();
    }

    /// Upload every member buffer.
    ///
    /// # Safety
    ///
    /// Requires a current GL context matching `gl`.
    ///
    /// # Errors
    ///
    /// Propagates the first buffer creation failure.
    pub unsafe fn buffer_all(&mut self, gl: &Arc<glow::Context>) -> Result<(), String> {
        for buf in self.buffers.values_mut() {
            unsafe { buf.buffer_data(gl)? };
        }
        unsafe { self.stipple_lines.buffer_data(gl)? };
        Ok(())
    }

    /// Draw every uploaded buffer with its keyed primitive.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_all(&self, state: &mut GlState) {
        for (&(_, primitive), buf) in &self.buffers {
            unsafe { buf.draw(state, primitive) };
        }
        unsafe { self.stipple_lines.draw(state, PrimitiveKind::Lines) };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn append_moves_and_empties_source() {
        let mut buf = VertexBuffer::new(AttribLayout::Vertex);
        let mut pts = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        buf.append_floats(&mut pts);
        assert!(pts.is_empty());
        assert_eq!(buf.pending_vertex_count(), 2);
    }

    #[test]
    fn pending_count_scales_with_stride() {
        let mut buf = VertexBuffer::new(AttribLayout::VertexNormalColor);
        let mut pts = vec![0.0; 30];
        buf.append_floats(&mut pts);
        assert_eq!(buf.pending_vertex_count(), 3);
    }

    #[test]
    fn clear_discards_pending_data() {
        let mut buf = VertexBuffer::new(AttribLayout::Vertex);
        let mut first = vec![1.0; 9];
        buf.append_floats(&mut first);
        buf.clear();
        assert!(buf.is_empty());
        let mut second = vec![2.0; 3];
        buf.append_floats(&mut second);
        assert_eq!(buf.pending_vertex_count(), 1);
        assert_eq!(buf.data, vec![2.0; 3]);
    }

    #[test]
    fn nothing_buffered_before_upload() {
        let mut buf = VertexBuffer::new(AttribLayout::VertexColor);
        let mut pts = vec![0.0; 14];
        buf.append_floats(&mut pts);
        assert_eq!(buf.buffered_vertex_count(), 0);
    }

    #[test]
    fn collection_creates_buffers_on_first_use() {
        let mut coll = BufferCollection::new();
        assert!(coll
            .get(AttribLayout::VertexNormal, PrimitiveKind::Triangles)
            .is_none());
        coll.get_buffer(AttribLayout::VertexNormal, PrimitiveKind::Triangles);
        assert!(coll
            .get(AttribLayout::VertexNormal, PrimitiveKind::Triangles)
            .is_some());
    }

    #[test]
    fn collection_keys_are_distinct_per_primitive() {
        let mut coll = BufferCollection::new();
        let mut tri = vec![0.0; 18];
        coll.get_buffer(AttribLayout::VertexNormal, PrimitiveKind::Triangles)
            .append_floats(&mut tri);
        let mut quad = vec![0.0; 24];
        coll.get_buffer(AttribLayout::VertexNormal, PrimitiveKind::Quads)
            .append_floats(&mut quad);

        let tri_buf = coll
            .get(AttribLayout::VertexNormal, PrimitiveKind::Triangles)
            .unwrap();
        let quad_buf = coll
            .get(AttribLayout::VertexNormal, PrimitiveKind::Quads)
            .unwrap();
        assert_eq!(tri_buf.pending_vertex_count(), 3);
        assert_eq!(quad_buf.pending_vertex_count(), 4);
    }

    #[test]
    fn clear_reaches_every_buffer() {
        let mut coll = BufferCollection::new();
        let mut pts = vec![0.0; 6];
        coll.get_buffer(AttribLayout::Vertex, PrimitiveKind::Lines)
            .append_floats(&mut pts);
        let mut stipple = vec![0.0; 6];
        coll.stipple_buffer().append_floats(&mut stipple);
        coll.clear();
        assert!(coll
            .get(AttribLayout::Vertex, PrimitiveKind::Lines)
            .unwrap()
            .is_empty());
        assert!(coll.stipple_buffer().is_empty());
    }

    #[test]
    fn iter_includes_the_stipple_buffer() {
        let mut coll = BufferCollection::new();
        coll.get_buffer(AttribLayout::Vertex, PrimitiveKind::Lines);
        let kinds: Vec<_> = coll.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.iter().all(|&k| k == PrimitiveKind::Lines));
    }
}
