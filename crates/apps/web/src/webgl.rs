use std::collections::HashMap;

use gpu::{
    BufferId, BufferKind, DrawCall, GpuContext, GpuError, NORMAL_OFFSET, TextureId, UV_OFFSET,
    VERTEX_STRIDE,
};
use web_sys::{
    WebGl2RenderingContext as Gl, WebGlBuffer, WebGlProgram, WebGlShader, WebGlTexture,
    WebGlUniformLocation, WebGlVertexArrayObject,
};

const VERTEX_SHADER: &str = r#"#version 300 es
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec2 a_uv;
uniform mat4 u_matrix;
out vec3 v_normal;
out vec2 v_uv;
void main() {
    v_normal = a_normal;
    v_uv = a_uv;
    gl_Position = u_matrix * vec4(a_position, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
in vec3 v_normal;
in vec2 v_uv;
uniform vec4 u_base_color;
uniform float u_textured;
uniform sampler2D u_texture;
out vec4 color;
void main() {
    vec4 base = u_base_color;
    if (u_textured > 0.5) {
        base *= texture(u_texture, v_uv);
    }
    vec3 light = normalize(vec3(0.4, 0.8, 0.45));
    float lambert = max(dot(normalize(v_normal), light), 0.0);
    color = vec4(base.rgb * (0.35 + 0.65 * lambert), base.a);
}
"#;

struct Pipeline {
    program: WebGlProgram,
    vao: WebGlVertexArrayObject,
    u_matrix: WebGlUniformLocation,
    u_base_color: Option<WebGlUniformLocation>,
    u_textured: Option<WebGlUniformLocation>,
    u_texture: Option<WebGlUniformLocation>,
}

/// [`GpuContext`] over the map canvas's WebGL2 context.
///
/// Draws go through a private vertex array object; program, VAO and texture
/// bindings are cleared after each draw.
pub struct WebGlContext {
    gl: Gl,
    pipeline: Option<Pipeline>,
    buffers: HashMap<BufferId, (BufferKind, WebGlBuffer)>,
    textures: HashMap<TextureId, WebGlTexture>,
    next_id: u64,
}

impl WebGlContext {
    pub fn new(gl: Gl) -> Self {
        Self {
            gl,
            pipeline: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
        }
    }

    fn pipeline(&mut self) -> Result<&Pipeline, GpuError> {
        if self.pipeline.is_none() {
            self.pipeline = Some(build_pipeline(&self.gl)?);
        }
        self.pipeline
            .as_ref()
            .ok_or_else(|| GpuError::Backend("pipeline unavailable".into()))
    }

    fn buffer(&self, id: BufferId, kind: BufferKind) -> Result<&WebGlBuffer, GpuError> {
        match self.buffers.get(&id) {
            Some((k, buf)) if *k == kind => Ok(buf),
            _ => Err(GpuError::UnknownBuffer(id)),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn target(kind: BufferKind) -> u32 {
    match kind {
        BufferKind::Vertex => Gl::ARRAY_BUFFER,
        BufferKind::Index => Gl::ELEMENT_ARRAY_BUFFER,
    }
}

fn compile(gl: &Gl, kind: u32, source: &str) -> Result<WebGlShader, GpuError> {
    let shader = gl
        .create_shader(kind)
        .ok_or_else(|| GpuError::Backend("create_shader failed".into()))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);
    if gl
        .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(shader)
    } else {
        let log = gl.get_shader_info_log(&shader).unwrap_or_default();
        gl.delete_shader(Some(&shader));
        Err(GpuError::Backend(format!("shader compile failed: {log}")))
    }
}

fn build_pipeline(gl: &Gl) -> Result<Pipeline, GpuError> {
    let vs = compile(gl, Gl::VERTEX_SHADER, VERTEX_SHADER)?;
    let fs = compile(gl, Gl::FRAGMENT_SHADER, FRAGMENT_SHADER)?;
    let program = gl
        .create_program()
        .ok_or_else(|| GpuError::Backend("create_program failed".into()))?;
    gl.attach_shader(&program, &vs);
    gl.attach_shader(&program, &fs);
    gl.link_program(&program);
    gl.delete_shader(Some(&vs));
    gl.delete_shader(Some(&fs));
    if !gl
        .get_program_parameter(&program, Gl::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        let log = gl.get_program_info_log(&program).unwrap_or_default();
        gl.delete_program(Some(&program));
        return Err(GpuError::Backend(format!("program link failed: {log}")));
    }
    let Some(u_matrix) = gl.get_uniform_location(&program, "u_matrix") else {
        gl.delete_program(Some(&program));
        return Err(GpuError::Backend("u_matrix missing".into()));
    };
    let Some(vao) = gl.create_vertex_array() else {
        gl.delete_program(Some(&program));
        return Err(GpuError::Backend("create_vertex_array failed".into()));
    };
    Ok(Pipeline {
        u_base_color: gl.get_uniform_location(&program, "u_base_color"),
        u_textured: gl.get_uniform_location(&program, "u_textured"),
        u_texture: gl.get_uniform_location(&program, "u_texture"),
        program,
        vao,
        u_matrix,
    })
}

impl GpuContext for WebGlContext {
    fn is_lost(&self) -> bool {
        self.gl.is_context_lost()
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId, GpuError> {
        if self.is_lost() {
            return Err(GpuError::ContextLost);
        }
        let buf = self.gl.create_buffer().ok_or(GpuError::Allocation {
            kind,
            bytes: data.len(),
        })?;
        let t = target(kind);
        self.gl.bind_buffer(t, Some(&buf));
        self.gl.buffer_data_with_u8_array(t, data, Gl::STATIC_DRAW);
        self.gl.bind_buffer(t, None);
        if self.gl.get_error() == Gl::OUT_OF_MEMORY {
            self.gl.delete_buffer(Some(&buf));
            return Err(GpuError::Allocation {
                kind,
                bytes: data.len(),
            });
        }
        let id = BufferId(self.next_id());
        self.buffers.insert(id, (kind, buf));
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some((_, buf)) = self.buffers.remove(&id) {
            self.gl.delete_buffer(Some(&buf));
        }
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GpuError> {
        if self.is_lost() {
            return Err(GpuError::ContextLost);
        }
        let alloc_failed = GpuError::TextureAllocation { width, height };
        if width == 0 || height == 0 || rgba.len() != width as usize * height as usize * 4 {
            return Err(alloc_failed);
        }
        let tex = self.gl.create_texture().ok_or(alloc_failed.clone())?;
        let gl = &self.gl;
        gl.bind_texture(Gl::TEXTURE_2D, Some(&tex));
        gl.pixel_storei(Gl::UNPACK_ALIGNMENT, 1);
        let uploaded = gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            Gl::TEXTURE_2D,
            0,
            Gl::RGBA8 as i32,
            width as i32,
            height as i32,
            0,
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            Some(rgba),
        );
        gl.pixel_storei(Gl::UNPACK_ALIGNMENT, 4);
        if uploaded.is_err() || gl.get_error() == Gl::OUT_OF_MEMORY {
            gl.bind_texture(Gl::TEXTURE_2D, None);
            gl.delete_texture(Some(&tex));
            return Err(alloc_failed);
        }
        gl.generate_mipmap(Gl::TEXTURE_2D);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MIN_FILTER, Gl::LINEAR_MIPMAP_LINEAR as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MAG_FILTER, Gl::LINEAR as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_WRAP_S, Gl::REPEAT as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_WRAP_T, Gl::REPEAT as i32);
        gl.bind_texture(Gl::TEXTURE_2D, None);

        let id = TextureId(self.next_id());
        self.textures.insert(id, tex);
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(tex) = self.textures.remove(&id) {
            self.gl.delete_texture(Some(&tex));
        }
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        if self.is_lost() {
            return Err(GpuError::ContextLost);
        }
        let vertices = self.buffer(call.vertices, BufferKind::Vertex)?.clone();
        let indices = self.buffer(call.indices, BufferKind::Index)?.clone();
        let texture = match call.texture {
            Some(id) => Some(
                self.textures
                    .get(&id)
                    .cloned()
                    .ok_or(GpuError::UnknownTexture(id))?,
            ),
            None => None,
        };
        let gl = self.gl.clone();
        let p = self.pipeline()?;

        gl.use_program(Some(&p.program));
        gl.bind_vertex_array(Some(&p.vao));
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&vertices));
        let stride = VERTEX_STRIDE as i32;
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_with_i32(0, 3, Gl::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_with_i32(1, 3, Gl::FLOAT, false, stride, NORMAL_OFFSET as i32);
        gl.enable_vertex_attrib_array(2);
        gl.vertex_attrib_pointer_with_i32(2, 2, Gl::FLOAT, false, stride, UV_OFFSET as i32);
        gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&indices));
        gl.uniform_matrix4fv_with_f32_array(Some(&p.u_matrix), false, &call.transform);
        gl.uniform4fv_with_f32_array(p.u_base_color.as_ref(), &call.base_color);
        gl.uniform1f(p.u_textured.as_ref(), if texture.is_some() { 1.0 } else { 0.0 });
        gl.active_texture(Gl::TEXTURE0);
        gl.bind_texture(Gl::TEXTURE_2D, texture.as_ref());
        gl.uniform1i(p.u_texture.as_ref(), 0);

        gl.enable(Gl::DEPTH_TEST);
        gl.depth_func(Gl::LEQUAL);
        gl.draw_elements_with_i32(Gl::TRIANGLES, call.index_count as i32, Gl::UNSIGNED_INT, 0);

        gl.bind_texture(Gl::TEXTURE_2D, None);
        gl.bind_vertex_array(None);
        gl.bind_buffer(Gl::ARRAY_BUFFER, None);
        gl.use_program(None);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(p) = self.pipeline.take() {
            self.gl.delete_vertex_array(Some(&p.vao));
            self.gl.delete_program(Some(&p.program));
        }
    }
}
