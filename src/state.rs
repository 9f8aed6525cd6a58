//! The render context: shader programs, cached locations, matrices, and the
//! active rendering mode.
//!
//! [`GlState`] is owned by the host render loop and passed explicitly into
//! every draw operation. Switching the rendering mode (color / color-texture
//! / text) is a context-wide side effect: draw calls that change it must
//! leave the context in a known mode before returning.

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec4};
use glow::HasContext;

use crate::handle::ProgramHandle;
use crate::shaders;

/// Attribute semantics exposed by the shader programs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attrib {
    /// 3D position, `vertex` (bound to slot 0).
    Vertex,
    /// 2D screen-space glyph position, `textVertex`.
    TextVertex,
    /// Surface normal, `normal`.
    Normal,
    /// RGBA color, `color`.
    Color,
    /// Palette texture coordinate, `texCoord0`.
    Texcoord0,
    /// Font atlas texture coordinate, `texCoord1`.
    Texcoord1,
}

const ATTRIB_COUNT: usize = 6;

impl Attrib {
    fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::TextVertex => 1,
            Self::Normal => 2,
            Self::Color => 3,
            Self::Texcoord0 => 4,
            Self::Texcoord1 => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TextVertex => "textVertex",
            Self::Normal => "normal",
            Self::Color => "color",
            Self::Texcoord0 => "texCoord0",
            Self::Texcoord1 => "texCoord1",
        }
    }

    const ALL: [Self; ATTRIB_COUNT] = [
        Self::Vertex,
        Self::TextVertex,
        Self::Normal,
        Self::Color,
        Self::Texcoord0,
        Self::Texcoord1,
    ];
}

/// The active rendering mode, mirrored into the `containsText` /
/// `useColorTex` shader uniforms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderMode {
    /// Interpolated per-vertex color.
    Color,
    /// Palette texture lookup through `texCoord0`.
    ColorTexture,
    /// Screen-space text through the font atlas.
    Text,
}

/// Uniform locations cached per linked program.
///
/// Locations are valid only while the owning program stays linked; a relink
/// requires a fresh [`Uniforms::fetch`] pass. Uniforms the compiler
/// eliminated come back as `None` and are silently skipped at upload.
struct Uniforms {
    model_view: Option<glow::UniformLocation>,
    projection: Option<glow::UniformLocation>,
    text_proj: Option<glow::UniformLocation>,
    normal_matrix: Option<glow::UniformLocation>,
    text_origin: Option<glow::UniformLocation>,
    use_clip_plane: Option<glow::UniformLocation>,
    clip_plane: Option<glow::UniformLocation>,
    specular: Option<glow::UniformLocation>,
    shininess: Option<glow::UniformLocation>,
    light_position: Option<glow::UniformLocation>,
    contains_text: Option<glow::UniformLocation>,
    use_color_tex: Option<glow::UniformLocation>,
    color_tex: Option<glow::UniformLocation>,
    font_tex: Option<glow::UniformLocation>,
}

impl Uniforms {
    unsafe fn fetch(gl: &glow::Context, program: glow::Program) -> Self {
        unsafe {
            Self {
                model_view: gl.get_uniform_location(program, "modelViewMatrix"),
                projection: gl.get_uniform_location(program, "projectionMatrix"),
                text_proj: gl.get_uniform_location(program, "textProjMatrix"),
                normal_matrix: gl.get_uniform_location(program, "normalMatrix"),
                text_origin: gl.get_uniform_location(program, "textOrigin"),
                use_clip_plane: gl.get_uniform_location(program, "useClipPlane"),
                clip_plane: gl.get_uniform_location(program, "clipPlane"),
                specular: gl.get_uniform_location(program, "material.specular"),
                shininess: gl.get_uniform_location(program, "material.shininess"),
                light_position: gl.get_uniform_location(program, "lightPosition"),
                contains_text: gl.get_uniform_location(program, "containsText"),
                use_color_tex: gl.get_uniform_location(program, "useColorTex"),
                color_tex: gl.get_uniform_location(program, "colorTex"),
                font_tex: gl.get_uniform_location(program, "fontTex"),
            }
        }
    }
}

/// A linked program together with its cached locations.
struct ProgramState {
    program: ProgramHandle,
    uniforms: Uniforms,
    attribs: [Option<u32>; ATTRIB_COUNT],
}

impl ProgramState {
    unsafe fn new(gl: &Arc<glow::Context>, raw: glow::Program) -> Self {
        let uniforms = unsafe { Uniforms::fetch(gl, raw) };
        let mut attribs = [None; ATTRIB_COUNT];
        for attrib in Attrib::ALL {
            attribs[attrib.index()] = unsafe { gl.get_attrib_location(raw, attrib.name()) };
        }
        Self {
            program: ProgramHandle::new(Arc::clone(gl), raw),
            uniforms,
            attribs,
        }
    }
}

/// Owner of the GL pipeline configuration: programs, cached locations,
/// matrices, viewport, and clip-plane state.
pub struct GlState {
    gl: Arc<glow::Context>,

    main: ProgramState,
    /// Print-capture program, linked on demand via
    /// [`enable_print_capture`](Self::enable_print_capture).
    print: Option<ProgramState>,
    /// Whether the print program is the one currently in use.
    printing: bool,

    /// Core-profile contexts refuse to draw without a bound vertex array, so
    /// one is kept bound for the lifetime of the state.
    vao: glow::VertexArray,

    mode: ShaderMode,

    model_view: Mat4,
    projection: Mat4,
    text_projection: Mat4,

    viewport: [i32; 4],

    clip_plane: Vec4,
    clip_enabled: bool,
}

impl GlState {
    /// Compile and link the primary rendering program and initialize the
    /// pipeline state: sampler bindings (palette on unit 0, font atlas on
    /// unit 1), color mode, identity matrices.
    ///
    /// # Safety
    ///
    /// The context must be current and valid, and must remain so for every
    /// later call on the returned state (drop included).
    ///
    /// # Errors
    ///
    /// Shader compilation or link failure is fatal to the renderer: the
    /// diagnostic text is returned and no state is constructed.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Result<Self, String> {
        let raw = unsafe {
            shaders::compile_program(&gl, &shaders::vertex_source(), &shaders::fragment_source())?
        };
        let main = unsafe { ProgramState::new(&gl, raw) };

        let vao = unsafe { gl.create_vertex_array() }?;

        let state = Self {
            gl,
            main,
            print: None,
            printing: false,
            vao,
            mode: ShaderMode::Color,
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            text_projection: Mat4::IDENTITY,
            viewport: [0; 4],
            clip_plane: Vec4::ZERO,
            clip_enabled: false,
        };

        unsafe {
            let gl = &state.gl;
            gl.bind_vertex_array(Some(state.vao));
            gl.use_program(Some(state.main.program.raw()));
            let u = &state.main.uniforms;
            gl.uniform_1_i32(u.color_tex.as_ref(), 0);
            gl.uniform_1_i32(u.font_tex.as_ref(), 1);
            gl.uniform_1_i32(u.contains_text.as_ref(), 0);
            gl.uniform_1_i32(u.use_color_tex.as_ref(), 0);
            gl.uniform_1_i32(u.use_clip_plane.as_ref(), 0);
            state.load_matrix_uniforms();
        }

        Ok(state)
    }

    /// The shared GL context.
    #[must_use]
    pub fn gl(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    fn active(&self) -> &ProgramState {
        if self.printing {
            self.print.as_ref().unwrap_or(&self.main)
        } else {
            &self.main
        }
    }

    /// Location of an attribute in the active program, or `None` if the
    /// compiler eliminated it.
    #[must_use]
    pub fn attrib_loc(&self, attrib: Attrib) -> Option<u32> {
        self.active().attribs[attrib.index()]
    }

    /// Enable the attribute's array in the active program, if it has one.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn enable_attrib(&self, attrib: Attrib) {
        if let Some(loc) = self.attrib_loc(attrib) {
            unsafe { self.gl.enable_vertex_attrib_array(loc) };
        }
    }

    /// Disable the attribute's array in the active program, if it has one.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn disable_attrib(&self, attrib: Attrib) {
        if let Some(loc) = self.attrib_loc(attrib) {
            unsafe { self.gl.disable_vertex_attrib_array(loc) };
        }
    }

    /// The active rendering mode.
    #[must_use]
    pub fn mode(&self) -> ShaderMode {
        self.mode
    }

    /// Switch to interpolated-color rendering.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_mode_color(&mut self) {
        let u = &self.active().uniforms;
        unsafe {
            self.gl.uniform_1_i32(u.contains_text.as_ref(), 0);
            self.gl.uniform_1_i32(u.use_color_tex.as_ref(), 0);
        }
        self.mode = ShaderMode::Color;
    }

    /// Switch to palette-texture rendering.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_mode_color_texture(&mut self) {
        let u = &self.active().uniforms;
        unsafe {
            self.gl.uniform_1_i32(u.contains_text.as_ref(), 0);
            self.gl.uniform_1_i32(u.use_color_tex.as_ref(), 1);
        }
        self.mode = ShaderMode::ColorTexture;
    }

    /// Switch to text rendering, anchoring the glyph quads at the given
    /// world-space raster position.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_mode_render_text(&mut self, x: f32, y: f32, z: f32) {
        let u = &self.active().uniforms;
        unsafe {
            self.gl.uniform_1_i32(u.contains_text.as_ref(), 1);
            self.gl.uniform_1_i32(u.use_color_tex.as_ref(), 0);
            self.gl.uniform_3_f32(u.text_origin.as_ref(), x, y, z);
        }
        self.mode = ShaderMode::Text;
    }

    /// Set the model-view matrix. Call
    /// [`load_matrix_uniforms`](Self::load_matrix_uniforms) to upload.
    pub fn set_model_view(&mut self, m: Mat4) {
        self.model_view = m;
    }

    /// Set the scene projection matrix.
    pub fn set_projection(&mut self, m: Mat4) {
        self.projection = m;
    }

    /// Set the screen-space projection applied to text glyph quads.
    pub fn set_text_projection(&mut self, m: Mat4) {
        self.text_projection = m;
    }

    /// The current model-view matrix.
    #[must_use]
    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    /// The current projection matrix.
    #[must_use]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Upload the matrix uniforms to the active program. The normal matrix
    /// is derived here as the inverse-transpose of the model-view.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn load_matrix_uniforms(&self) {
        let u = &self.active().uniforms;
        let normal = Mat3::from_mat4(self.model_view).inverse().transpose();
        unsafe {
            self.gl.uniform_matrix_4_f32_slice(
                u.model_view.as_ref(),
                false,
                &self.model_view.to_cols_array(),
            );
            self.gl.uniform_matrix_4_f32_slice(
                u.projection.as_ref(),
                false,
                &self.projection.to_cols_array(),
            );
            self.gl.uniform_matrix_4_f32_slice(
                u.text_proj.as_ref(),
                false,
                &self.text_projection.to_cols_array(),
            );
            self.gl
                .uniform_matrix_3_f32_slice(u.normal_matrix.as_ref(), false, &normal.to_cols_array());
        }
    }

    /// Set the viewport, caching it for the vector-output device mapping.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
        self.viewport = [x, y, width, height];
    }

    /// The cached viewport, as `[x, y, width, height]`.
    #[must_use]
    pub fn viewport(&self) -> [i32; 4] {
        self.viewport
    }

    /// Set the clip plane equation (eye-space `ax + by + cz + d`).
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_clip_plane(&mut self, eqn: Vec4) {
        self.clip_plane = eqn;
        let u = &self.active().uniforms;
        unsafe {
            self.gl
                .uniform_4_f32(u.clip_plane.as_ref(), eqn.x, eqn.y, eqn.z, eqn.w);
        }
    }

    /// Enable or disable clipping against the plane.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_clip_plane_enabled(&mut self, enabled: bool) {
        self.clip_enabled = enabled;
        let u = &self.active().uniforms;
        unsafe {
            self.gl
                .uniform_1_i32(u.use_clip_plane.as_ref(), i32::from(enabled));
        }
    }

    /// Whether the clip plane is active.
    #[must_use]
    pub fn clip_plane_enabled(&self) -> bool {
        self.clip_enabled
    }

    /// Set the material parameters used by the lighting block.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_material(&self, specular: [f32; 3], shininess: f32) {
        let u = &self.active().uniforms;
        unsafe {
            self.gl
                .uniform_3_f32(u.specular.as_ref(), specular[0], specular[1], specular[2]);
            self.gl.uniform_1_f32(u.shininess.as_ref(), shininess);
        }
    }

    /// Set the eye-space light position.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn set_light_position(&self, pos: [f32; 3]) {
        let u = &self.active().uniforms;
        unsafe {
            self.gl
                .uniform_3_f32(u.light_position.as_ref(), pos[0], pos[1], pos[2]);
        }
    }

    /// Compile and link the print-capture program. Without this, vector
    /// output is unavailable and [`begin_print_capture`](Self::begin_print_capture)
    /// reports `false`.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Link failure is fatal to the vector-output feature only: the error
    /// carries the driver diagnostic and no print program is stored; regular
    /// rendering is unaffected.
    pub unsafe fn enable_print_capture(&mut self) -> Result<(), String> {
        let raw = unsafe {
            shaders::compile_print_program(
                &self.gl,
                &shaders::print_vertex_source(),
                &shaders::print_fragment_source(),
            )?
        };
        self.print = Some(unsafe { ProgramState::new(&self.gl, raw) });
        Ok(())
    }

    /// Whether the print-capture program is linked.
    #[must_use]
    pub fn has_print_capture(&self) -> bool {
        self.print.is_some()
    }

    /// Switch drawing to the print-capture program, carrying the current
    /// matrices and clip state over. Returns `false` (and changes nothing)
    /// if the print program was never linked.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn begin_print_capture(&mut self) -> bool {
        let Some(print) = self.print.as_ref() else {
            return false;
        };
        unsafe {
            self.gl.use_program(Some(print.program.raw()));
        }
        self.printing = true;
        unsafe {
            self.load_matrix_uniforms();
            let clip = self.clip_plane;
            let enabled = self.clip_enabled;
            self.set_clip_plane(clip);
            self.set_clip_plane_enabled(enabled);
        }
        true
    }

    /// Switch back to the primary program, restoring color mode.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn end_print_capture(&mut self) {
        self.printing = false;
        unsafe {
            self.gl.use_program(Some(self.main.program.raw()));
            self.set_mode_color();
        }
    }

    /// Re-fetch every cached attribute and uniform location.
    ///
    /// Required after any relink: old locations are invalid the moment the
    /// program is relinked.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn refresh_locations(&mut self) {
        unsafe {
            self.main.uniforms = Uniforms::fetch(&self.gl, self.main.program.raw());
            for attrib in Attrib::ALL {
                self.main.attribs[attrib.index()] =
                    self.gl.get_attrib_location(self.main.program.raw(), attrib.name());
            }
            if let Some(print) = self.print.as_mut() {
                print.uniforms = Uniforms::fetch(&self.gl, print.program.raw());
                for attrib in Attrib::ALL {
                    print.attribs[attrib.index()] =
                        self.gl.get_attrib_location(print.program.raw(), attrib.name());
                }
            }
        }
    }

    /// Delete the vertex array object. Program handles release themselves.
    ///
    /// # Safety
    ///
    /// Must be called with the creating context current, at most once.
    pub unsafe fn destroy(&self) {
        unsafe { self.gl.delete_vertex_array(self.vao) };
    }
}
