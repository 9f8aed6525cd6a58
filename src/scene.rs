//! Drawable scene elements.
//!
//! Solution variants are a closed set of tagged drawable kinds rather than a
//! subclass hierarchy: each variant owns the geometry it prepares, and all of
//! them are driven through the same two-step capability, `prepare` (rebuild
//! the batched geometry through builders) then `draw`.

use std::sync::Arc;

use crate::buffer::BufferCollection;
use crate::capture::{FeedbackHook, VectorBackend};
use crate::state::GlState;
use crate::text::TextBuffer;
use crate::types::PrimitiveKind;

/// A renderable view of the externally supplied finite-element data.
pub enum Drawable {
    /// Scalar field: colored/palette surface geometry, mesh lines, and
    /// optional element/vertex numbering labels.
    ScalarField {
        /// Surface and line geometry.
        buffers: BufferCollection,
        /// Numbering overlays.
        labels: Vec<TextBuffer>,
    },
    /// Vector field: arrow glyph geometry (segments and head triangles).
    VectorField {
        /// Glyph geometry.
        buffers: BufferCollection,
    },
    /// Mesh wireframe with no solution data; only line geometry is drawn.
    MeshOnly {
        /// Edge geometry. Non-line buffers that end up here are ignored at
        /// draw time.
        buffers: BufferCollection,
    },
}

impl Drawable {
    /// An empty scalar-field drawable.
    #[must_use]
    pub fn scalar_field() -> Self {
        Self::ScalarField {
            buffers: BufferCollection::new(),
            labels: Vec::new(),
        }
    }

    /// An empty vector-field drawable.
    #[must_use]
    pub fn vector_field() -> Self {
        Self::VectorField {
            buffers: BufferCollection::new(),
        }
    }

    /// An empty mesh-only drawable.
    #[must_use]
    pub fn mesh_only() -> Self {
        Self::MeshOnly {
            buffers: BufferCollection::new(),
        }
    }

    fn buffers(&self) -> &BufferCollection {
        match self {
            Self::ScalarField { buffers, .. }
            | Self::VectorField { buffers }
            | Self::MeshOnly { buffers } => buffers,
        }
    }

    fn buffers_mut(&mut self) -> &mut BufferCollection {
        match self {
            Self::ScalarField { buffers, .. }
            | Self::VectorField { buffers }
            | Self::MeshOnly { buffers } => buffers,
        }
    }

    /// Begin a geometry rebuild: prior batched geometry (and labels) is
    /// discarded, and the returned collection is the target for a fresh
    /// builder pass.
    pub fn prepare(&mut self) -> &mut BufferCollection {
        if let Self::ScalarField { labels, .. } = self {
            labels.clear();
        }
        let buffers = self.buffers_mut();
        buffers.clear();
        buffers
    }

    /// Attach a numbering label. Only the scalar-field variant displays
    /// labels; other variants drop them with a note.
    pub fn push_label(&mut self, label: TextBuffer) {
        if let Self::ScalarField { labels, .. } = self {
            labels.push(label);
        } else {
            log::warn!("labels are only drawn on scalar-field drawables; dropping");
        }
    }

    /// Upload every prepared buffer.
    ///
    /// # Safety
    ///
    /// Requires a current GL context matching `gl`.
    ///
    /// # Errors
    ///
    /// Propagates buffer creation failure.
    pub unsafe fn upload(&mut self, gl: &Arc<glow::Context>) -> Result<(), String> {
        unsafe { self.buffers_mut().buffer_all(gl) }
    }

    /// Draw the prepared geometry.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; `state` must be the context's render
    /// state.
    pub unsafe fn draw(&self, state: &mut GlState) {
        match self {
            Self::ScalarField { buffers, labels } => unsafe {
                buffers.draw_all(state);
                for label in labels {
                    label.draw(state);
                }
            },
            Self::VectorField { buffers } => unsafe { buffers.draw_all(state) },
            Self::MeshOnly { buffers } => {
                for (kind, buf) in buffers.iter() {
                    if kind == PrimitiveKind::Lines {
                        unsafe { buf.draw(state, kind) };
                    }
                }
            }
        }
    }

    /// Draw the prepared geometry through the vector-output hook, emitting
    /// reconstructed primitives to `backend`. Labels are drawn with
    /// rasterization suppressed and produce no vector output.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; `state` must be the context's render
    /// state.
    ///
    /// # Errors
    ///
    /// Propagates feedback-buffer creation failure.
    pub unsafe fn print<B: VectorBackend>(
        &self,
        state: &mut GlState,
        hook: &mut FeedbackHook,
        backend: &mut B,
    ) -> Result<(), String> {
        let mesh_only = matches!(self, Self::MeshOnly { .. });
        for (kind, buf) in self.buffers().iter() {
            if mesh_only && kind != PrimitiveKind::Lines {
                continue;
            }
            unsafe { hook.capture(state, buf, kind, backend)? };
        }
        if let Self::ScalarField { labels, .. } = self {
            for label in labels {
                unsafe {
                    hook.pre_draw_text();
                    label.draw(state);
                    hook.post_draw_text();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builder::LineBuilder;
    use crate::types::AttribLayout;

    #[test]
    fn prepare_discards_previous_geometry() {
        let mut drawable = Drawable::mesh_only();
        let coll = drawable.prepare();
        let mut b = LineBuilder::begin(coll, PrimitiveKind::Lines);
        b.vertex(0.0, 0.0, 0.0);
        b.vertex(1.0, 0.0, 0.0);
        b.end();

        let coll = drawable.prepare();
        assert!(coll
            .get(AttribLayout::Vertex, PrimitiveKind::Lines)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rebuild_replaces_rather_than_accumulates() {
        let mut drawable = Drawable::scalar_field();
        for pass in 0..2 {
            let coll = drawable.prepare();
            let mut b = LineBuilder::begin(coll, PrimitiveKind::Lines);
            #[allow(clippy::cast_precision_loss)]
            let x = pass as f32;
            b.vertex(x, 0.0, 0.0);
            b.vertex(x, 1.0, 0.0);
            b.end();
        }
        let Drawable::ScalarField { buffers, .. } = &drawable else {
            unreachable!();
        };
        let buf = buffers
            .get(AttribLayout::Vertex, PrimitiveKind::Lines)
            .unwrap();
        assert_eq!(buf.pending_vertex_count(), 2);
        assert_eq!(buf.pending_floats()[0], 1.0);
    }
}
