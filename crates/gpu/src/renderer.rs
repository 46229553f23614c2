use bytemuck::{Pod, Zeroable};
use formats::{MeshData, ModelScene};
use foundation::math::Mat4;

use crate::context::{BufferId, BufferKind, DrawCall, GpuContext, GpuError, TextureId};

/// Interleaved vertex as uploaded to the vertex buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Byte stride of [`ModelVertex`]; the host-side attribute setup relies on it.
pub const VERTEX_STRIDE: usize = std::mem::size_of::<ModelVertex>();
pub const NORMAL_OFFSET: usize = 12;
pub const UV_OFFSET: usize = 24;

/// Meshes without normals get a constant up vector so shading stays defined.
const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];

pub fn interleave(mesh: &MeshData) -> Vec<ModelVertex> {
    mesh.positions
        .iter()
        .enumerate()
        .map(|(i, &position)| ModelVertex {
            position,
            normal: mesh
                .normals
                .as_ref()
                .and_then(|n| n.get(i).copied())
                .unwrap_or(DEFAULT_NORMAL),
            uv: mesh
                .uvs
                .as_ref()
                .and_then(|u| u.get(i).copied())
                .unwrap_or([0.0; 2]),
        })
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct GpuMesh {
    vertices: BufferId,
    indices: BufferId,
    index_count: u32,
    base_color: [f32; 4],
    texture: Option<TextureId>,
}

/// Device buffers and textures for one loaded model.
///
/// Must be released with [`GpuScene::dispose`]; dropping it leaks them on
/// the device.
#[derive(Debug, Default)]
pub struct GpuScene {
    meshes: Vec<GpuMesh>,
    textures: Vec<TextureId>,
}

impl GpuScene {
    /// Uploads every texture and non-empty mesh. On failure, everything created
    /// so far is destroyed before the error is returned.
    pub fn upload<G: GpuContext + ?Sized>(ctx: &mut G, scene: &ModelScene) -> Result<Self, GpuError> {
        let mut out = GpuScene::default();
        if let Err(e) = out.upload_all(ctx, scene) {
            out.dispose(ctx);
            return Err(e);
        }
        tracing::debug!(
            meshes = out.meshes.len(),
            textures = out.textures.len(),
            "model uploaded"
        );
        Ok(out)
    }

    fn upload_all<G: GpuContext + ?Sized>(&mut self, ctx: &mut G, scene: &ModelScene) -> Result<(), GpuError> {
        for image in &scene.textures {
            let id = ctx.create_texture(image.width, image.height, &image.rgba)?;
            self.textures.push(id);
        }
        for mesh in scene.meshes.iter().filter(|m| !m.indices.is_empty()) {
            let texture = mesh.texture.and_then(|slot| self.textures.get(slot).copied());
            self.meshes.push(upload_mesh(ctx, mesh, texture)?);
        }
        Ok(())
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn draw<G: GpuContext + ?Sized>(&self, ctx: &mut G, mvp: &Mat4) -> Result<(), GpuError> {
        let transform = mvp.to_f32();
        for m in &self.meshes {
            ctx.draw(&DrawCall {
                vertices: m.vertices,
                indices: m.indices,
                index_count: m.index_count,
                transform,
                base_color: m.base_color,
                texture: m.texture,
            })?;
        }
        Ok(())
    }

    pub fn dispose<G: GpuContext + ?Sized>(&mut self, ctx: &mut G) {
        for m in self.meshes.drain(..) {
            ctx.destroy_buffer(m.vertices);
            ctx.destroy_buffer(m.indices);
        }
        for t in self.textures.drain(..) {
            ctx.destroy_texture(t);
        }
    }
}

fn upload_mesh<G: GpuContext + ?Sized>(
    ctx: &mut G,
    mesh: &MeshData,
    texture: Option<TextureId>,
) -> Result<GpuMesh, GpuError> {
    let vertices = interleave(mesh);
    let vb = ctx.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&vertices))?;
    let ib = match ctx.create_buffer(BufferKind::Index, bytemuck::cast_slice(&mesh.indices)) {
        Ok(id) => id,
        Err(e) => {
            ctx.destroy_buffer(vb);
            return Err(e);
        }
    };
    Ok(GpuMesh {
        vertices: vb,
        indices: ib,
        index_count: mesh.indices.len() as u32,
        base_color: mesh.base_color,
        texture,
    })
}
