//! Screen-space text overlay: pre-rasterized glyph geometry anchored at a
//! world-space point.

use std::sync::Arc;

use glow::HasContext;

use crate::handle::BufferHandle;
use crate::state::{Attrib, GlState};

/// The external font/atlas service: rasterizes a string into a GPU buffer of
/// glyph quads.
///
/// The produced buffer must hold 6 vertices per glyph (two triangles), each
/// vertex 4 floats: 2 screen-space position, 2 atlas texture coordinates.
pub trait GlyphAtlas {
    /// Tessellate `text` into a new GPU buffer and return it. Ownership of
    /// the buffer passes to the caller.
    ///
    /// # Safety
    ///
    /// Requires a current GL context matching `gl`.
    ///
    /// # Errors
    ///
    /// Buffer creation or atlas lookup failure.
    unsafe fn buffer_text(
        &mut self,
        gl: &Arc<glow::Context>,
        text: &str,
    ) -> Result<glow::Buffer, String>;
}

/// Number of vertices a string's glyph geometry occupies: two triangles per
/// glyph.
#[must_use]
pub fn glyph_vertex_count(text: &str) -> usize {
    text.chars().count() * 6
}

/// A string rendered as glyph quads, anchored at a 3D raster position.
///
/// Owns its glyph buffer exclusively; the buffer is released when the
/// `TextBuffer` drops. Immutable after construction; changed text means a
/// new `TextBuffer`.
pub struct TextBuffer {
    handle: BufferHandle,
    anchor: [f32; 3],
    vertex_count: usize,
}

impl TextBuffer {
    /// Rasterize `text` through the atlas service and retain the resulting
    /// buffer and vertex count.
    ///
    /// # Safety
    ///
    /// Requires a current GL context matching `gl`.
    ///
    /// # Errors
    ///
    /// Propagates atlas failure.
    pub unsafe fn new(
        gl: &Arc<glow::Context>,
        atlas: &mut dyn GlyphAtlas,
        x: f32,
        y: f32,
        z: f32,
        text: &str,
    ) -> Result<Self, String> {
        let raw = unsafe { atlas.buffer_text(gl, text) }?;
        Ok(Self {
            handle: BufferHandle::new(Arc::clone(gl), raw),
            anchor: [x, y, z],
            vertex_count: glyph_vertex_count(text),
        })
    }

    /// The world-space raster anchor.
    #[must_use]
    pub fn anchor(&self) -> [f32; 3] {
        self.anchor
    }

    /// Number of glyph vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Draw all glyphs in one triangle call.
    ///
    /// Switches the context into text mode for the duration of the call only
    /// and restores color mode before returning; callers must not rely on a
    /// persistent mode change.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; `state` must be the context's render
    /// state.
    pub unsafe fn draw(&self, state: &mut GlState) {
        if self.vertex_count == 0 {
            return;
        }
        unsafe {
            state.set_mode_render_text(self.anchor[0], self.anchor[1], self.anchor[2]);

            state.enable_attrib(Attrib::TextVertex);
            state.enable_attrib(Attrib::Texcoord1);

            let gl = Arc::clone(state.gl());
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.handle.raw()));

            // 4 floats per glyph vertex: 2 position + 2 texcoord.
            let stride = 16;
            if let Some(loc) = state.attrib_loc(Attrib::TextVertex) {
                gl.vertex_attrib_pointer_f32(loc, 2, glow::FLOAT, false, stride, 0);
            }
            if let Some(loc) = state.attrib_loc(Attrib::Texcoord1) {
                gl.vertex_attrib_pointer_f32(loc, 2, glow::FLOAT, false, stride, 8);
            }

            // A label's glyph count is tiny, far below i32::MAX.
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let count = self.vertex_count as i32;
            gl.draw_arrays(glow::TRIANGLES, 0, count);

            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            state.disable_attrib(Attrib::TextVertex);
            state.disable_attrib(Attrib::Texcoord1);
            state.set_mode_color();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn six_vertices_per_glyph() {
        assert_eq!(glyph_vertex_count(""), 0);
        assert_eq!(glyph_vertex_count("a"), 6);
        assert_eq!(glyph_vertex_count("mesh"), 24);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(glyph_vertex_count("µm²"), 18);
    }
}
