//! Scoped-ownership wrappers for raw GL objects.
//!
//! Each wrapper acquires nothing itself (creation stays at the call sites
//! that know the right parameters) but takes exclusive ownership of an
//! already-created object and releases it on every exit path. The wrappers
//! are move-only (no `Clone`/`Copy`), so a GL object can never be deleted
//! twice through them.

use std::sync::Arc;

use glow::HasContext;

/// Exclusive owner of a GL buffer object.
///
/// The buffer is deleted when the wrapper drops. The context the buffer was
/// created on must still be current at that point; dropping after the context
/// is gone leaks the object (the delete call becomes a no-op on a dead
/// context rather than UB, but drivers differ; keep destruction ordered).
pub struct BufferHandle {
    gl: Arc<glow::Context>,
    raw: glow::Buffer,
}

impl BufferHandle {
    /// Take ownership of `raw`, created on `gl`.
    #[must_use]
    pub fn new(gl: Arc<glow::Context>, raw: glow::Buffer) -> Self {
        Self { gl, raw }
    }

    /// The wrapped buffer name, for binding.
    #[must_use]
    pub fn raw(&self) -> glow::Buffer {
        self.raw
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        unsafe { self.gl.delete_buffer(self.raw) };
    }
}

/// Exclusive owner of a linked GL program.
pub struct ProgramHandle {
    gl: Arc<glow::Context>,
    raw: glow::Program,
}

impl ProgramHandle {
    /// Take ownership of `raw`, linked on `gl`.
    #[must_use]
    pub fn new(gl: Arc<glow::Context>, raw: glow::Program) -> Self {
        Self { gl, raw }
    }

    /// The wrapped program name, for `use_program` and location lookups.
    #[must_use]
    pub fn raw(&self) -> glow::Program {
        self.raw
    }
}

impl Drop for ProgramHandle {
    fn drop(&mut self) {
        unsafe { self.gl.delete_program(self.raw) };
    }
}
