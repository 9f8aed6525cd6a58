//! Transform-feedback capture for vector output.
//!
//! Wraps a buffered draw call: vertices are transformed on the GPU with
//! rasterization discarded, read back from a feedback buffer, reconstructed
//! and clipped in floating-point device space, and emitted to a vector
//! graphics backend as filled polygons and stroked lines.

use std::sync::Arc;

use glow::HasContext;

use crate::buffer::VertexBuffer;
use crate::handle::BufferHandle;
use crate::state::GlState;
use crate::types::{FeedbackVertex, PrimitiveKind, PrintVertex};

/// Stroke style passed along with reconstructed line segments.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineStyle {
    /// Stroke width in device units.
    pub width: f32,
    /// 16-bit stipple pattern; `0xFFFF` is solid.
    pub pattern: u16,
    /// Stipple pattern repeat factor.
    pub factor: i32,
}

/// Default stroke for captured line segments.
pub const LINE_STYLE: LineStyle = LineStyle {
    width: 0.2,
    pattern: 0xFFFF,
    factor: 1,
};

/// Byte size of the feedback buffer holding `vertex_count` captured vertices.
///
/// GL buffer sizes are signed 32-bit; a capture request past that limit is
/// rejected before any GL work happens.
fn feedback_buffer_len(vertex_count: usize) -> Result<i32, String> {
    vertex_count
        .checked_mul(std::mem::size_of::<FeedbackVertex>())
        .and_then(|bytes| i32::try_from(bytes).ok())
        .ok_or_else(|| {
            format!("feedback capture of {vertex_count} vertices exceeds the GL buffer size limit")
        })
}

/// The external vector-graphics (PostScript/PDF) backend.
pub trait VectorBackend {
    /// Record a filled triangle in device space.
    fn add_polygon(&mut self, verts: &[PrintVertex; 3]);
    /// Record a stroked line segment in device space.
    fn add_line(&mut self, verts: &[PrintVertex; 2], style: LineStyle);
}

/// Map a captured vertex to device space: divide out the homogeneous w, then
/// scale normalized device coordinates through the viewport.
#[expect(clippy::cast_precision_loss)] // viewport extents are small integers
fn to_device(v: &FeedbackVertex, vp: [i32; 4], half_w: f32, half_h: f32) -> PrintVertex {
    let x = v.pos[0] / v.pos[3];
    let y = v.pos[1] / v.pos[3];
    let z = v.pos[2] / v.pos[3];
    PrintVertex {
        pos: [
            half_w * x + vp[0] as f32 + half_w,
            half_h * y + vp[1] as f32 + half_h,
            z,
        ],
        color: v.color,
    }
}

/// Blend two captured vertices across the clip plane, weighting each by the
/// magnitude of its own signed distance and normalizing by the sum.
fn clip_blend(a: &FeedbackVertex, c: &FeedbackVertex) -> FeedbackVertex {
    let wa = a.clip_coord.abs();
    let wc = c.clip_coord.abs();
    let mut out = FeedbackVertex::default();
    for i in 0..4 {
        out.pos[i] = (a.pos[i] * wa + c.pos[i] * wc) / (wa + wc);
        out.color[i] = (a.color[i] * wa + c.color[i] * wc) / (wa + wc);
    }
    out
}

/// Compute the clip-plane crossing of a line segment, where `a` is the
/// visible endpoint and `b` the clipped one.
///
/// Deliberately the unnormalized form `a*dist_a - b*dist_b`: for the
/// homogeneous position the scale divides out in the w-divide, and the
/// color-scale quirk is kept so vector output stays byte-stable across
/// releases. It is not the triangle case's weighted average.
fn clip_line_vertex(a: &FeedbackVertex, b: &FeedbackVertex) -> FeedbackVertex {
    let mut out = FeedbackVertex::default();
    for i in 0..4 {
        out.pos[i] = a.pos[i] * a.clip_coord - b.pos[i] * b.clip_coord;
        out.color[i] = a.color[i] * a.clip_coord - b.color[i] * b.clip_coord;
    }
    out
}

/// Reconstruct captured triangles, clip them against the plane, and emit
/// filled polygons.
///
/// Per triangle: all three distances non-negative (or no plane active) emits
/// it unchanged; all negative discards it; mixed signs split it on the edge
/// whose endpoints share a side. Two survivors produce a quadrilateral
/// `a, n0, n1, b` split along the 0-2 diagonal; one survivor produces the
/// single triangle `c, n0, n1`.
pub fn process_triangle_feedback<B: VectorBackend>(
    verts: &[FeedbackVertex],
    viewport: [i32; 4],
    clip_enabled: bool,
    backend: &mut B,
) {
    #[expect(clippy::cast_precision_loss)]
    let half_w = (viewport[2] - viewport[0]) as f32 * 0.5;
    #[expect(clippy::cast_precision_loss)]
    let half_h = (viewport[3] - viewport[1]) as f32 * 0.5;

    for tri in verts.chunks_exact(3) {
        if !clip_enabled || tri.iter().all(|v| v.clip_coord >= 0.0) {
            backend.add_polygon(&[
                to_device(&tri[0], viewport, half_w, half_h),
                to_device(&tri[1], viewport, half_w, half_h),
                to_device(&tri[2], viewport, half_w, half_h),
            ]);
            continue;
        }
        if tri.iter().all(|v| v.clip_coord < 0.0) {
            continue;
        }
        for j in 0..3 {
            let a = &tri[j];
            let b = &tri[(j + 1) % 3];
            let c = &tri[(j + 2) % 3];
            if (a.clip_coord < 0.0) != (b.clip_coord < 0.0) {
                continue;
            }
            // a and b share a side; c is alone on the other.
            let n0 = clip_blend(a, c);
            let n1 = clip_blend(b, c);
            if c.clip_coord < 0.0 {
                // a, b survive: quadrilateral a -- n0 -- n1 -- b,
                // split along the 0-2 diagonal.
                let quad = [
                    to_device(a, viewport, half_w, half_h),
                    to_device(&n0, viewport, half_w, half_h),
                    to_device(&n1, viewport, half_w, half_h),
                    to_device(b, viewport, half_w, half_h),
                ];
                backend.add_polygon(&[quad[0], quad[1], quad[2]]);
                backend.add_polygon(&[quad[0], quad[2], quad[3]]);
            } else {
                backend.add_polygon(&[
                    to_device(c, viewport, half_w, half_h),
                    to_device(&n0, viewport, half_w, half_h),
                    to_device(&n1, viewport, half_w, half_h),
                ]);
            }
            break;
        }
    }
}

/// Reconstruct captured line segments, clip them against the plane, and emit
/// stroked lines.
pub fn process_line_feedback<B: VectorBackend>(
    verts: &[FeedbackVertex],
    viewport: [i32; 4],
    clip_enabled: bool,
    backend: &mut B,
) {
    #[expect(clippy::cast_precision_loss)]
    let half_w = (viewport[2] - viewport[0]) as f32 * 0.5;
    #[expect(clippy::cast_precision_loss)]
    let half_h = (viewport[3] - viewport[1]) as f32 * 0.5;

    for seg in verts.chunks_exact(2) {
        if !clip_enabled || (seg[0].clip_coord >= 0.0 && seg[1].clip_coord >= 0.0) {
            backend.add_line(
                &[
                    to_device(&seg[0], viewport, half_w, half_h),
                    to_device(&seg[1], viewport, half_w, half_h),
                ],
                LINE_STYLE,
            );
            continue;
        }
        if seg[0].clip_coord < 0.0 && seg[1].clip_coord < 0.0 {
            continue;
        }
        let (a, b) = if seg[0].clip_coord < 0.0 {
            (&seg[1], &seg[0])
        } else {
            (&seg[0], &seg[1])
        };
        let crossing = clip_line_vertex(a, b);
        backend.add_line(
            &[
                to_device(&crossing, viewport, half_w, half_h),
                to_device(a, viewport, half_w, half_h),
            ],
            LINE_STYLE,
        );
    }
}

/// State machine around one captured draw call.
///
/// Exclusively owns the transform-feedback buffer; the buffer is released
/// when the hook drops, and moving the hook transfers ownership.
pub struct FeedbackHook {
    gl: Arc<glow::Context>,
    buffer: Option<BufferHandle>,
}

impl FeedbackHook {
    /// Create a hook on the given context. The feedback buffer itself is
    /// allocated lazily, sized per draw call.
    #[must_use]
    pub fn new(gl: Arc<glow::Context>) -> Self {
        Self { gl, buffer: None }
    }

    /// Bind and size the feedback buffer for `vertex_count` vertices, enable
    /// rasterizer discard, and begin capture. Returns `false` (capturing
    /// nothing, warning logged) for primitive kinds with no reconstruction
    /// rule.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; the print-capture program must be in
    /// use. Every `true` return must be paired with
    /// [`post_draw`](Self::post_draw) after the draw call.
    ///
    /// # Errors
    ///
    /// A request past the GL buffer size limit is rejected before any GL
    /// work; buffer creation can fail on a lost context. On error no capture
    /// state has been entered.
    pub unsafe fn pre_draw(
        &mut self,
        kind: PrimitiveKind,
        vertex_count: usize,
    ) -> Result<bool, String> {
        let Some(mode) = kind.feedback_mode() else {
            log::warn!("unhandled primitive kind {kind:?} for transform feedback; skipping");
            return Ok(false);
        };
        let byte_len = feedback_buffer_len(vertex_count)?;
        let gl = &self.gl;
        if self.buffer.is_none() {
            let raw = unsafe { gl.create_buffer() }?;
            self.buffer = Some(BufferHandle::new(Arc::clone(gl), raw));
        }
        let Some(buffer) = &self.buffer else {
            return Ok(false);
        };
        unsafe {
            gl.bind_buffer(glow::TRANSFORM_FEEDBACK_BUFFER, Some(buffer.raw()));
            gl.buffer_data_size(glow::TRANSFORM_FEEDBACK_BUFFER, byte_len, glow::STATIC_READ);
            gl.bind_buffer_base(glow::TRANSFORM_FEEDBACK_BUFFER, 0, Some(buffer.raw()));
            gl.enable(glow::RASTERIZER_DISCARD);
            gl.begin_transform_feedback(mode);
        }
        Ok(true)
    }

    /// End capture, read the feedback buffer back (this blocks until prior
    /// GPU work completes), reconstruct the primitives, and emit them.
    ///
    /// # Safety
    ///
    /// Must follow a `true`-returning [`pre_draw`](Self::pre_draw) and the
    /// captured draw call, on a current GL context.
    pub unsafe fn post_draw<B: VectorBackend>(
        &mut self,
        kind: PrimitiveKind,
        vertex_count: usize,
        state: &GlState,
        backend: &mut B,
    ) {
        let gl = &self.gl;
        unsafe {
            gl.end_transform_feedback();
            gl.disable(glow::RASTERIZER_DISCARD);
        }

        let Ok(map_len) = feedback_buffer_len(vertex_count) else {
            return;
        };
        unsafe {
            let ptr = gl.map_buffer_range(
                glow::TRANSFORM_FEEDBACK_BUFFER,
                0,
                map_len,
                glow::MAP_READ_BIT,
            );
            if ptr.is_null() {
                log::warn!("mapping the transform feedback buffer failed; no vector output");
                return;
            }
            // Mapped buffer pointers are aligned for any GL datatype.
            let verts =
                std::slice::from_raw_parts(ptr.cast_const().cast::<FeedbackVertex>(), vertex_count);

            let viewport = state.viewport();
            let clip = state.clip_plane_enabled();
            match kind {
                PrimitiveKind::Triangles => {
                    process_triangle_feedback(verts, viewport, clip, backend);
                }
                PrimitiveKind::Lines => {
                    process_line_feedback(verts, viewport, clip, backend);
                }
                other => {
                    log::warn!("unhandled primitive kind {other:?} during feedback parsing");
                }
            }

            gl.unmap_buffer(glow::TRANSFORM_FEEDBACK_BUFFER);
            gl.bind_buffer(glow::TRANSFORM_FEEDBACK_BUFFER, None);
        }
    }

    /// Capture one buffered draw call end to end: switch to the print
    /// program, wrap the draw in a feedback pass, reconstruct, and restore
    /// the primary program. A primitive kind with no reconstruction rule is
    /// drawn with rasterization suppressed and contributes nothing to the
    /// output; a missing print program degrades to a plain draw. On every
    /// return path, error included, the primary program is the active one.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; `state` must be the context's render
    /// state.
    ///
    /// # Errors
    ///
    /// Propagates feedback-buffer sizing or creation failure.
    pub unsafe fn capture<B: VectorBackend>(
        &mut self,
        state: &mut GlState,
        buffer: &VertexBuffer,
        kind: PrimitiveKind,
        backend: &mut B,
    ) -> Result<(), String> {
        let vertex_count = buffer.buffered_vertex_count();
        if vertex_count == 0 {
            return Ok(());
        }
        if kind.feedback_mode().is_none() {
            log::warn!("unhandled primitive kind {kind:?} for transform feedback; skipping");
            // Keep rasterization suppressed: mid-print geometry must not
            // land in the on-screen framebuffer.
            unsafe {
                self.pre_draw_text();
                buffer.draw(state, kind);
                self.post_draw_text();
            }
            return Ok(());
        }
        if !unsafe { state.begin_print_capture() } {
            unsafe { buffer.draw(state, kind) };
            return Ok(());
        }
        let capturing = match unsafe { self.pre_draw(kind, vertex_count) } {
            Ok(capturing) => capturing,
            Err(err) => {
                // Leave print mode before surfacing the failure; later draws
                // must run through the primary program.
                unsafe { state.end_print_capture() };
                return Err(err);
            }
        };
        unsafe {
            buffer.draw(state, kind);
            if capturing {
                self.post_draw(kind, vertex_count, state, backend);
            }
            state.end_print_capture();
        }
        Ok(())
    }

    /// Suppress rasterization around a text draw; glyph geometry has no
    /// vector reconstruction and is skipped in print output.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn pre_draw_text(&self) {
        unsafe { self.gl.enable(glow::RASTERIZER_DISCARD) };
    }

    /// Re-enable rasterization after a text draw.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn post_draw_text(&self) {
        unsafe { self.gl.disable(glow::RASTERIZER_DISCARD) };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Records emitted primitives instead of writing PostScript.
    #[derive(Default)]
    struct Recorder {
        polygons: Vec<[PrintVertex; 3]>,
        lines: Vec<[PrintVertex; 2]>,
    }

    impl VectorBackend for Recorder {
        fn add_polygon(&mut self, verts: &[PrintVertex; 3]) {
            self.polygons.push(*verts);
        }
        fn add_line(&mut self, verts: &[PrintVertex; 2], _style: LineStyle) {
            self.lines.push(*verts);
        }
    }

    fn vert(pos: [f32; 4], clip: f32) -> FeedbackVertex {
        FeedbackVertex {
            pos,
            color: [1.0, 1.0, 1.0, 1.0],
            clip_coord: clip,
        }
    }

    const VP: [i32; 4] = [0, 0, 800, 600];

    #[test]
    fn ndc_origin_maps_to_viewport_center() {
        let v = vert([0.0, 0.0, 0.0, 1.0], 1.0);
        let d = to_device(&v, VP, 400.0, 300.0);
        assert_eq!(d.pos, [400.0, 300.0, 0.0]);
    }

    #[test]
    fn device_mapping_respects_viewport_offset() {
        let v = vert([-1.0, -1.0, 0.0, 1.0], 1.0);
        let d = to_device(&v, [10, 20, 110, 120], 50.0, 50.0);
        assert_eq!(d.pos[0], 10.0);
        assert_eq!(d.pos[1], 20.0);
    }

    #[test]
    fn device_mapping_divides_by_w() {
        let v = vert([2.0, 2.0, 2.0, 2.0], 1.0);
        let d = to_device(&v, VP, 400.0, 300.0);
        assert_eq!(d.pos, [800.0, 600.0, 1.0]);
    }

    fn triangle(clips: [f32; 3]) -> Vec<FeedbackVertex> {
        vec![
            vert([0.0, 0.0, 0.0, 1.0], clips[0]),
            vert([1.0, 0.0, 0.0, 1.0], clips[1]),
            vert([0.0, 1.0, 0.0, 1.0], clips[2]),
        ]
    }

    #[test]
    fn unclipped_triangle_passes_through() {
        let mut rec = Recorder::default();
        process_triangle_feedback(&triangle([1.0, 1.0, 1.0]), VP, true, &mut rec);
        assert_eq!(rec.polygons.len(), 1);
    }

    #[test]
    fn clip_disabled_ignores_distances() {
        let mut rec = Recorder::default();
        process_triangle_feedback(&triangle([-1.0, -1.0, -1.0]), VP, false, &mut rec);
        assert_eq!(rec.polygons.len(), 1);
    }

    #[test]
    fn fully_clipped_triangle_is_discarded() {
        let mut rec = Recorder::default();
        process_triangle_feedback(&triangle([-1.0, -1.0, -1.0]), VP, true, &mut rec);
        assert!(rec.polygons.is_empty());
    }

    #[test]
    fn one_survivor_emits_a_single_triangle() {
        // Two vertices behind the plane: the visible region is the corner
        // triangle at the surviving vertex.
        let mut rec = Recorder::default();
        process_triangle_feedback(&triangle([1.0, -1.0, -1.0]), VP, true, &mut rec);
        assert_eq!(rec.polygons.len(), 1);
        // First emitted point is the surviving vertex itself.
        let first = rec.polygons[0][0];
        assert_eq!(first.pos[0], 400.0);
        assert_eq!(first.pos[1], 300.0);
    }

    #[test]
    fn two_survivors_emit_a_quad_as_two_triangles() {
        let mut rec = Recorder::default();
        process_triangle_feedback(&triangle([1.0, 1.0, -1.0]), VP, true, &mut rec);
        assert_eq!(rec.polygons.len(), 2);
        // Split along the 0-2 diagonal: both triangles share their first
        // vertex (the first survivor).
        assert_eq!(rec.polygons[0][0], rec.polygons[1][0]);
        // ...and the second triangle starts from the first one's last point.
        assert_eq!(rec.polygons[0][2], rec.polygons[1][1]);
    }

    #[test]
    fn interpolated_point_sits_between_survivor_and_clipped() {
        // Equal distances: the crossing is the midpoint of the edge.
        let mut rec = Recorder::default();
        process_triangle_feedback(&triangle([1.0, -1.0, -1.0]), VP, true, &mut rec);
        let n0 = rec.polygons[0][1];
        // Midpoint of (0,0) and (1,0) in NDC is x = 0.5 -> device 600.
        assert!((n0.pos[0] - 600.0).abs() < 1e-4);
        assert!((n0.pos[1] - 300.0).abs() < 1e-4);
    }

    #[test]
    fn unclipped_line_passes_through() {
        let seg = [
            vert([-1.0, 0.0, 0.0, 1.0], 1.0),
            vert([1.0, 0.0, 0.0, 1.0], 2.0),
        ];
        let mut rec = Recorder::default();
        process_line_feedback(&seg, VP, true, &mut rec);
        assert_eq!(rec.lines.len(), 1);
        assert_eq!(rec.lines[0][0].pos[0], 0.0);
        assert_eq!(rec.lines[0][1].pos[0], 800.0);
    }

    #[test]
    fn fully_clipped_line_is_discarded() {
        let seg = [
            vert([0.0, 0.0, 0.0, 1.0], -1.0),
            vert([1.0, 0.0, 0.0, 1.0], -2.0),
        ];
        let mut rec = Recorder::default();
        process_line_feedback(&seg, VP, true, &mut rec);
        assert!(rec.lines.is_empty());
    }

    #[test]
    fn line_crossing_uses_the_asymmetric_formula() {
        // Distances (+2, -1): the crossing must be a*2 - b*(-1) = 2a + b per
        // component, not the midpoint.
        let a = vert([1.0, 0.0, 0.0, 1.0], 2.0);
        let b = vert([5.0, 0.0, 0.0, 1.0], -1.0);
        let crossing = clip_line_vertex(&a, &b);
        assert_eq!(crossing.pos, [2.0 + 5.0, 0.0, 0.0, 2.0 + 1.0]);
        assert_eq!(crossing.color, [3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn straddling_line_emits_crossing_then_survivor() {
        let seg = [
            vert([0.0, 0.0, 0.0, 1.0], 1.0),
            vert([1.0, 0.0, 0.0, 1.0], -1.0),
        ];
        let mut rec = Recorder::default();
        process_line_feedback(&seg, VP, true, &mut rec);
        assert_eq!(rec.lines.len(), 1);
        // Survivor (NDC x = 0) is the second emitted point.
        assert_eq!(rec.lines[0][1].pos[0], 400.0);
        // Crossing: pos = a*1 - b*(-1) = (1, 0, 0, 2) -> NDC x = 0.5.
        assert!((rec.lines[0][0].pos[0] - 600.0).abs() < 1e-4);
    }

    #[test]
    fn swapped_endpoints_produce_the_same_crossing() {
        let fwd = [
            vert([0.0, 0.0, 0.0, 1.0], 1.0),
            vert([1.0, 0.0, 0.0, 1.0], -1.0),
        ];
        let rev = [fwd[1], fwd[0]];
        let (mut r0, mut r1) = (Recorder::default(), Recorder::default());
        process_line_feedback(&fwd, VP, true, &mut r0);
        process_line_feedback(&rev, VP, true, &mut r1);
        assert_eq!(r0.lines[0][0], r1.lines[0][0]);
    }

    #[test]
    fn feedback_sizing_covers_whole_records() {
        assert_eq!(feedback_buffer_len(0).unwrap(), 0);
        // Two records of 9 floats each.
        assert_eq!(feedback_buffer_len(2).unwrap(), 72);
    }

    #[test]
    fn oversized_capture_is_rejected_before_any_gl_work() {
        // 60M captured vertices overflow the signed 32-bit GL buffer size;
        // the rejection must come out of the sizing step, not a GL error.
        assert!(feedback_buffer_len(60_000_000).is_err());
        assert!(feedback_buffer_len(usize::MAX).is_err());
    }

    #[test]
    fn blend_weights_by_own_distance() {
        // a at distance 3, c at -1: a carries weight 3 of 4, so the blended
        // point lands a quarter of the way from a toward c.
        let a = vert([0.0, 0.0, 0.0, 1.0], 3.0);
        let c = vert([4.0, 0.0, 0.0, 1.0], -1.0);
        let n = clip_blend(&a, &c);
        assert!((n.pos[0] - 1.0).abs() < 1e-6);
    }
}
