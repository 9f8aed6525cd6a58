//! An OpenGL renderer for finite-element meshes and scalar/vector field
//! solutions, via [glow], with transform-feedback vector output.
//!
//! The crate converts geometry described through immediate-style builder
//! calls into batched GPU draw calls, and can replay any draw through a
//! transform-feedback capture pass that reconstructs clipped primitives in
//! device space for a PostScript/PDF backend.
//!
//! # Architecture
//!
//! - [`GlState`] owns the shader programs, cached attribute/uniform
//!   locations, matrices, viewport, and the active rendering mode. It is
//!   passed explicitly into every draw operation.
//! - [`LineBuilder`] and [`PolyBuilder`] accumulate begin/end-scoped
//!   geometry and move it into [`VertexBuffer`]s keyed by (layout, primitive
//!   kind) inside a [`BufferCollection`].
//! - [`TextBuffer`] wraps pre-rasterized glyph geometry from an external
//!   [`GlyphAtlas`] for screen-space overlays.
//! - [`FeedbackHook`] wraps a draw call in a transform-feedback pass and
//!   emits reconstructed, clip-plane-trimmed polygons and lines to a
//!   [`VectorBackend`].
//! - [`Drawable`] is the closed set of scene element kinds (scalar field,
//!   vector field, mesh wireframe) sharing one prepare/draw surface.
//!
//! Mesh and field data, windowing, and the vector-file writer itself are
//! external collaborators; this crate owns only the GL-facing layer.
//!
//! # Safety
//!
//! All rendering methods are `unsafe` because they issue raw GL calls; each
//! requires the context it was created on to be current.
//!
//! [glow]: https://docs.rs/glow

mod buffer;
mod builder;
mod capture;
mod handle;
mod scene;
mod shaders;
mod state;
mod text;
mod types;

pub use buffer::{BufferCollection, VertexBuffer};
pub use builder::{LineBuilder, PolyBuilder};
pub use capture::{
    process_line_feedback, process_triangle_feedback, FeedbackHook, LineStyle, VectorBackend,
    LINE_STYLE,
};
pub use scene::Drawable;
pub use shaders::{
    compile_print_program, compile_program, fragment_source, print_fragment_source,
    print_vertex_source, vertex_source, GLSL_HEADER,
};
pub use state::{Attrib, GlState, ShaderMode};
pub use text::{glyph_vertex_count, GlyphAtlas, TextBuffer};
pub use types::{AttribLayout, FeedbackVertex, PrimitiveKind, PrintVertex};
