use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("graphics context was lost")]
    ContextLost,
    #[error("could not allocate {kind:?} buffer of {bytes} bytes")]
    Allocation { kind: BufferKind, bytes: usize },
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("could not allocate {width}x{height} texture")]
    TextureAllocation { width: u32, height: u32 },
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("{0}")]
    Backend(String),
}

/// One indexed triangle draw with a column-major model-view-projection matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub vertices: BufferId,
    pub indices: BufferId,
    pub index_count: u32,
    pub transform: [f32; 16],
    /// Multiplied with the sampled texture, or used alone without one.
    pub base_color: [f32; 4],
    pub texture: Option<TextureId>,
}

/// Graphics calls issued from inside the host map's custom-layer callback.
///
/// Implementations share the host's context; they must leave its pipeline
/// state as they found it after each draw.
pub trait GpuContext {
    fn is_lost(&self) -> bool;
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId, GpuError>;
    fn destroy_buffer(&mut self, id: BufferId);
    /// Uploads tightly packed RGBA8 rows, top row first.
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GpuError>;
    fn destroy_texture(&mut self, id: TextureId);
    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError>;
    /// Frees programs and other state built lazily for drawing. The next draw
    /// rebuilds them.
    fn release(&mut self);
}

/// In-memory context used by tests and headless tools.
#[derive(Debug, Default)]
pub struct RecordingContext {
    next_id: u64,
    buffers: BTreeMap<BufferId, (BufferKind, usize)>,
    textures: BTreeMap<TextureId, (u32, u32)>,
    draws: Vec<DrawCall>,
    lost: bool,
    fail_after: Option<usize>,
    created: usize,
    destroyed: usize,
    releases: usize,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lose_context(&mut self) {
        self.lost = true;
    }

    /// Allocation fails once `n` buffers have been created.
    pub fn fail_allocations_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.buffers.values().map(|(_, len)| len).sum()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// How many times [`GpuContext::release`] was called.
    pub fn releases(&self) -> usize {
        self.releases
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }
}

impl GpuContext for RecordingContext {
    fn is_lost(&self) -> bool {
        self.lost
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId, GpuError> {
        if self.lost {
            return Err(GpuError::ContextLost);
        }
        if self.fail_after.is_some_and(|n| self.created >= n) {
            return Err(GpuError::Allocation {
                kind,
                bytes: data.len(),
            });
        }
        self.next_id += 1;
        let id = BufferId(self.next_id);
        self.buffers.insert(id, (kind, data.len()));
        self.created += 1;
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_some() {
            self.destroyed += 1;
        }
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GpuError> {
        if self.lost {
            return Err(GpuError::ContextLost);
        }
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(GpuError::TextureAllocation { width, height });
        }
        self.next_id += 1;
        let id = TextureId(self.next_id);
        self.textures.insert(id, (width, height));
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        if self.lost {
            return Err(GpuError::ContextLost);
        }
        for id in [call.vertices, call.indices] {
            if !self.buffers.contains_key(&id) {
                return Err(GpuError::UnknownBuffer(id));
            }
        }
        if let Some(t) = call.texture {
            if !self.textures.contains_key(&t) {
                return Err(GpuError::UnknownTexture(t));
            }
        }
        self.draws.push(call.clone());
        Ok(())
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferKind, DrawCall, GpuContext, GpuError, RecordingContext, TextureId};

    #[test]
    fn tracks_live_buffers() {
        let mut ctx = RecordingContext::new();
        let a = ctx.create_buffer(BufferKind::Vertex, &[0; 24]).unwrap();
        let b = ctx.create_buffer(BufferKind::Index, &[0; 12]).unwrap();
        assert_eq!(ctx.live_bytes(), 36);
        ctx.destroy_buffer(a);
        ctx.destroy_buffer(a);
        assert_eq!(ctx.live_buffers(), 1);
        assert_eq!(ctx.destroyed(), 1);

        let err = ctx
            .draw(&DrawCall {
                vertices: a,
                indices: b,
                index_count: 3,
                transform: [0.0; 16],
                base_color: [1.0; 4],
                texture: None,
            })
            .unwrap_err();
        assert_eq!(err, GpuError::UnknownBuffer(a));
    }

    #[test]
    fn textures_are_validated_and_tracked() {
        let mut ctx = RecordingContext::new();
        let t = ctx.create_texture(2, 1, &[0; 8]).unwrap();
        assert_eq!(ctx.live_textures(), 1);
        assert_eq!(
            ctx.create_texture(2, 2, &[0; 8]),
            Err(GpuError::TextureAllocation { width: 2, height: 2 })
        );
        ctx.destroy_texture(t);
        assert_eq!(ctx.live_textures(), 0);

        let vb = ctx.create_buffer(BufferKind::Vertex, &[0; 32]).unwrap();
        let ib = ctx.create_buffer(BufferKind::Index, &[0; 12]).unwrap();
        let err = ctx
            .draw(&DrawCall {
                vertices: vb,
                indices: ib,
                index_count: 3,
                transform: [0.0; 16],
                base_color: [1.0; 4],
                texture: Some(TextureId(999)),
            })
            .unwrap_err();
        assert_eq!(err, GpuError::UnknownTexture(TextureId(999)));
    }

    #[test]
    fn lost_context_rejects_work() {
        let mut ctx = RecordingContext::new();
        ctx.lose_context();
        assert!(ctx.is_lost());
        assert_eq!(
            ctx.create_buffer(BufferKind::Vertex, &[0; 4]),
            Err(GpuError::ContextLost)
        );
    }

    #[test]
    fn allocation_failure_after_limit() {
        let mut ctx = RecordingContext::new();
        ctx.fail_allocations_after(1);
        assert!(ctx.create_buffer(BufferKind::Vertex, &[0; 4]).is_ok());
        assert!(matches!(
            ctx.create_buffer(BufferKind::Index, &[0; 4]),
            Err(GpuError::Allocation { bytes: 4, .. })
        ));
    }
}
