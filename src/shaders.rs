//! GLSL shader fragments and compilation helpers.
//!
//! Shader text is assembled from fixed fragments (clip-plane block, lighting
//! block, core vertex/fragment stages, print-capture stages) prefixed by a
//! header selected at build time: GLSL 1.30 on desktop, an ES-style precision
//! header on the embedded/web profile.

use glow::HasContext;

/// Per-target GLSL header (desktop profile).
#[cfg(not(target_arch = "wasm32"))]
pub const GLSL_HEADER: &str = "#version 130\n";

/// Per-target GLSL header (embedded/web profile).
#[cfg(target_arch = "wasm32")]
pub const GLSL_HEADER: &str = "precision mediump float;\n";

/// Names of the varyings captured by the print program, in the interleaved
/// order matching [`FeedbackVertex`](crate::types::FeedbackVertex):
/// clip-space position, color, clip-plane distance.
pub(crate) const FEEDBACK_VARYINGS: [&str; 3] = ["gl_Position", "fColor", "fClipCoord"];

/// Clip-plane block shared by both vertex stages.
///
/// Computes the signed distance of the eye-space position to the active clip
/// plane; with the plane disabled every vertex reports a positive distance so
/// nothing is discarded downstream.
const CLIP_PLANE_VERT: &str = r"
uniform bool useClipPlane;
uniform vec4 clipPlane;

varying float fClipCoord;

void setupClipPlane(in vec4 eyePos) {
    if (useClipPlane) {
        fClipCoord = dot(eyePos, clipPlane);
    } else {
        fClipCoord = 1.0;
    }
}
";

/// Core vertex stage.
///
/// Transforms positions by the model-view/projection pair and forwards
/// normal, color and texture coordinates. Text glyphs take a separate path:
/// the anchor point is projected once and the glyph quad is offset from it in
/// screen space through `textProjMatrix`.
///
/// # Uniforms
///
/// | Name               | Type   | Description                         |
/// |--------------------|--------|-------------------------------------|
/// | `modelViewMatrix`  | `mat4` | Eye-space transform                 |
/// | `projectionMatrix` | `mat4` | Scene projection                    |
/// | `textProjMatrix`   | `mat4` | Screen-space glyph projection       |
/// | `normalMatrix`     | `mat3` | Inverse-transpose of the model-view |
/// | `textOrigin`       | `vec3` | World-space raster anchor for text  |
/// | `containsText`     | `bool` | Text mode toggle                    |
const DEFAULT_VERT: &str = r"
attribute vec3 vertex;
attribute vec2 textVertex;
attribute vec3 normal;
attribute vec4 color;
attribute vec2 texCoord0;
attribute vec2 texCoord1;

uniform mat4 modelViewMatrix;
uniform mat4 projectionMatrix;
uniform mat4 textProjMatrix;
uniform mat3 normalMatrix;
uniform vec3 textOrigin;
uniform bool containsText;

varying vec4 fColor;
varying vec3 fNormal;
varying vec3 fPosition;
varying vec2 fTexCoord;
varying vec2 fFontTexCoord;

void main() {
    vec4 eyePos = modelViewMatrix * vec4(vertex, 1.0);
    fPosition = eyePos.xyz;
    fNormal = normalize(normalMatrix * normal);
    fColor = color;
    fTexCoord = texCoord0;
    fFontTexCoord = texCoord1;
    setupClipPlane(eyePos);

    if (containsText) {
        vec4 anchor = projectionMatrix * modelViewMatrix * vec4(textOrigin, 1.0);
        anchor /= anchor.w;
        gl_Position = anchor + textProjMatrix * vec4(textVertex, 0.0, 0.0);
    } else {
        gl_Position = projectionMatrix * eyePos;
    }
}
";

/// Lighting block for the fragment stage: a single light with a
/// specular/shininess material, applied to the interpolated base color.
const LIGHTING_GLSL: &str = r"
struct Material {
    vec3 specular;
    float shininess;
};

uniform Material material;
uniform vec3 lightPosition;

vec4 lighting(in vec3 pos, in vec3 normal, in vec4 baseColor) {
    vec3 n = normalize(normal);
    vec3 toLight = normalize(lightPosition - pos);
    vec3 toEye = normalize(-pos);
    float diffuse = max(dot(n, toLight), 0.0);
    vec3 halfway = normalize(toLight + toEye);
    float spec = pow(max(dot(n, halfway), 0.0), material.shininess);
    vec3 rgb = baseColor.rgb * (0.3 + 0.7 * diffuse) + material.specular * spec;
    return vec4(rgb, baseColor.a);
}
";

/// Clip-plane block for the fragment stage: discards fragments on the
/// negative side of the plane.
const CLIP_PLANE_FRAG: &str = r"
void fragmentClipPlane() {
    if (useClipPlane && fClipCoord < 0.0) {
        discard;
    }
}
";

/// Core fragment stage.
///
/// Resolves the base color (interpolated color, or a palette lookup through
/// `colorTex` when `useColorTex` is set), applies lighting, and overrides the
/// whole computation in text mode with a font-atlas alpha lookup.
///
/// Texture unit 0 carries the color palette, unit 1 the font atlas.
const DEFAULT_FRAG: &str = r"
uniform bool containsText;
uniform bool useColorTex;
uniform sampler2D colorTex;
uniform sampler2D fontTex;

void main() {
    fragmentClipPlane();
    vec4 base = fColor;
    if (useColorTex) {
        base = texture2D(colorTex, fTexCoord);
    }
    vec4 shaded = lighting(fPosition, fNormal, base);
    if (containsText) {
        shaded = vec4(fColor.rgb, fColor.a * texture2D(fontTex, fFontTexCoord).a);
    }
    gl_FragColor = shaded;
}
";

/// Vertex stage for the print-capture program.
///
/// Same position transform as the core stage, but every varying the feedback
/// buffer records is written explicitly; text and texturing are not captured.
const PRINT_VERT: &str = r"
attribute vec3 vertex;
attribute vec3 normal;
attribute vec4 color;

uniform mat4 modelViewMatrix;
uniform mat4 projectionMatrix;

varying vec4 fColor;

void main() {
    vec4 eyePos = modelViewMatrix * vec4(vertex, 1.0);
    setupClipPlane(eyePos);
    fColor = color;
    gl_Position = projectionMatrix * eyePos;
}
";

/// Fragment stage for the print-capture program. Rasterizer discard is active
/// during capture, so this stage only has to be linkable.
const PRINT_FRAG: &str = r"
varying vec4 fColor;
varying float fClipCoord;

void main() {
    gl_FragColor = fColor;
}
";

/// Assemble the primary vertex shader source.
#[must_use]
pub fn vertex_source() -> String {
    format!("{GLSL_HEADER}{CLIP_PLANE_VERT}{DEFAULT_VERT}")
}

/// Assemble the primary fragment shader source.
#[must_use]
pub fn fragment_source() -> String {
    format!(
        "{GLSL_HEADER}\
        uniform bool useClipPlane;\n\
        varying float fClipCoord;\n\
        varying vec4 fColor;\n\
        varying vec3 fNormal;\n\
        varying vec3 fPosition;\n\
        varying vec2 fTexCoord;\n\
        varying vec2 fFontTexCoord;\n\
        {LIGHTING_GLSL}{CLIP_PLANE_FRAG}{DEFAULT_FRAG}"
    )
}

/// Assemble the print-capture vertex shader source.
#[must_use]
pub fn print_vertex_source() -> String {
    format!("{GLSL_HEADER}{CLIP_PLANE_VERT}{PRINT_VERT}")
}

/// Assemble the print-capture fragment shader source.
#[must_use]
pub fn print_fragment_source() -> String {
    format!("{GLSL_HEADER}{PRINT_FRAG}")
}

/// Compile and link a shader program from vertex and fragment sources.
///
/// `"vertex"` is bound to attribute slot 0 before linking; some drivers
/// (notably macOS) refuse to draw unless slot 0 is an enabled array. The
/// compiled shader objects are detached and deleted after successful linking,
/// so only the program handle needs to be cleaned up by the caller.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns the compiler or linker diagnostic text on failure; no program
/// handle is leaked or left half-linked.
pub unsafe fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, String> {
    unsafe { link_program(gl, vertex_src, fragment_src, false) }
}

/// Compile and link the print-capture program, registering the interleaved
/// transform-feedback varyings before the link so post-transform position,
/// color, and clip distance are recorded per vertex.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns the compiler or linker diagnostic text on failure.
pub unsafe fn compile_print_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, String> {
    unsafe { link_program(gl, vertex_src, fragment_src, true) }
}

unsafe fn link_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
    with_feedback: bool,
) -> Result<glow::Program, String> {
    let program = unsafe { gl.create_program() }?;

    let vs = unsafe { compile_shader(gl, glow::VERTEX_SHADER, vertex_src) }?;
    let fs = unsafe { compile_shader(gl, glow::FRAGMENT_SHADER, fragment_src) }?;

    unsafe {
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.bind_attrib_location(program, 0, "vertex");
        if with_feedback {
            gl.transform_feedback_varyings(program, &FEEDBACK_VARYINGS, glow::INTERLEAVED_ATTRIBS);
        }
        gl.link_program(program);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(format!("Program link error: {log}"));
        }

        // Shaders can be detached and deleted after successful linking.
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
    }

    Ok(program)
}

/// Compile a single shader stage (vertex or fragment) from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, String> {
    unsafe {
        let shader = gl.create_shader(shader_type)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(format!("Shader compile error: {log}"));
        }

        Ok(shader)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sources_start_with_target_header() {
        assert!(vertex_source().starts_with(GLSL_HEADER));
        assert!(fragment_source().starts_with(GLSL_HEADER));
        assert!(print_vertex_source().starts_with(GLSL_HEADER));
        assert!(print_fragment_source().starts_with(GLSL_HEADER));
    }

    #[test]
    fn clip_plane_block_present_in_both_vertex_stages() {
        assert!(vertex_source().contains("useClipPlane"));
        assert!(print_vertex_source().contains("useClipPlane"));
        assert!(print_vertex_source().contains("fClipCoord"));
    }

    #[test]
    fn fragment_stage_composes_lighting_and_clip_blocks() {
        let frag = fragment_source();
        assert!(frag.contains("Material"));
        assert!(frag.contains("fragmentClipPlane"));
        assert!(frag.contains("fontTex"));
    }

    #[test]
    fn feedback_varyings_match_capture_record_order() {
        // Position, color, clip distance: the field order of FeedbackVertex.
        assert_eq!(FEEDBACK_VARYINGS, ["gl_Position", "fColor", "fClipCoord"]);
        let vs = print_vertex_source();
        for name in &FEEDBACK_VARYINGS[1..] {
            assert!(vs.contains(name), "missing varying {name}");
        }
    }
}
