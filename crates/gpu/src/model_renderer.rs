use std::sync::Arc;

use formats::ModelScene;
use foundation::SiteId;
use foundation::math::{Mat4, compose_yaw};
use layers::MapEngine;
use runtime::{Generation, GenerationToken};
use scene::ModelAnchor;
use serde::{Deserialize, Serialize};

use crate::anchor::AnchorTransform;
use crate::context::GpuContext;
use crate::renderer::GpuScene;

/// Custom layer id registered with the host map while a model is shown.
pub const MODEL_LAYER_ID: &str = "site-model-3d";

/// Devices reporting less memory than this get the 2-D advisory.
pub const DEFAULT_ADVISORY_MEMORY_GB: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelViewState {
    Inactive,
    Loading { percent: u8 },
    Ready,
    /// `attempts` counts failures since activation so the UI can cap retries.
    Error { message: String, attempts: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub degrees_per_px: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            degrees_per_px: 0.5,
        }
    }
}

/// Best-effort capability check. `None` means the runtime did not say.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct DeviceProfile {
    pub memory_gb: Option<f64>,
}

impl DeviceProfile {
    pub fn is_constrained(&self, threshold_gb: f64) -> bool {
        self.memory_gb
            .is_some_and(|m| m.is_finite() && m > 0.0 && m < threshold_gb)
    }
}

/// Work order for the asset download; its result must come back with the same token.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTicket {
    pub token: GenerationToken,
    pub site: SiteId,
    pub url: String,
}

#[derive(Debug, Clone)]
struct Activation {
    site: SiteId,
    anchor: ModelAnchor,
    url: String,
    transform: AnchorTransform,
    token: GenerationToken,
}

#[derive(Debug, Copy, Clone)]
struct Drag {
    start_x: f64,
    start_offset_deg: f64,
}

/// Shows one anchored 3D model inside the host map's draw loop.
///
/// Borrows the host's engine and graphics context on every call; the only
/// thing it ever takes away from the host is pan/zoom while a drag is live.
#[derive(Debug, Default)]
pub struct ModelAnchorRenderer {
    state: Option<ModelViewState>,
    activation: Option<Activation>,
    generation: Generation,
    scene: Option<Arc<ModelScene>>,
    gpu: Option<GpuScene>,
    drag: Option<Drag>,
    drag_offset_deg: f64,
    attempts: u32,
    layer_attached: bool,
    gestures_suspended: bool,
    repaint_pending: bool,
    advisory_dismissed: bool,
    rotation: RotationConfig,
}

impl ModelAnchorRenderer {
    pub fn new(rotation: RotationConfig) -> Self {
        Self {
            rotation,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ModelViewState {
        self.state.clone().unwrap_or(ModelViewState::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_some()
    }

    pub fn site(&self) -> Option<&SiteId> {
        self.activation.as_ref().map(|a| &a.site)
    }

    pub fn transform(&self) -> Option<AnchorTransform> {
        self.activation.as_ref().map(|a| a.transform)
    }

    pub fn scene(&self) -> Option<&Arc<ModelScene>> {
        self.scene.as_ref()
    }

    pub fn drag_offset_deg(&self) -> f64 {
        self.drag_offset_deg
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Configured yaw plus the live drag offset, in `[0, 360)`.
    pub fn effective_yaw_deg(&self) -> Option<f64> {
        self.activation
            .as_ref()
            .map(|a| compose_yaw(a.anchor.yaw_deg(), self.drag_offset_deg))
    }

    /// Starts showing `anchor` for `site`, tearing down any previous activation first.
    pub fn activate<E, G>(
        &mut self,
        engine: &mut E,
        gpu: &mut G,
        site: SiteId,
        anchor: ModelAnchor,
        url: String,
    ) -> LoadTicket
    where
        E: MapEngine + ?Sized,
        G: GpuContext + ?Sized,
    {
        if self.is_active() {
            self.exit(engine, gpu);
        }
        let transform = AnchorTransform::new(&anchor);
        let token = self.generation.advance();
        tracing::info!(site = %site, url = %url, "model activation");
        self.activation = Some(Activation {
            site: site.clone(),
            anchor,
            url: url.clone(),
            transform,
            token,
        });
        self.attempts = 0;
        self.advisory_dismissed = false;
        self.state = Some(ModelViewState::Loading { percent: 0 });
        LoadTicket { token, site, url }
    }

    /// Applies a progress report; stale or backwards reports are dropped.
    pub fn on_progress(&mut self, token: GenerationToken, percent: u8) -> bool {
        if !self.generation.is_current(token) {
            return false;
        }
        match &mut self.state {
            Some(ModelViewState::Loading { percent: p }) if percent > *p => {
                *p = percent.min(100);
                true
            }
            _ => false,
        }
    }

    /// Applies a finished load. Returns `false` when the token is stale.
    pub fn complete<E>(
        &mut self,
        engine: &mut E,
        token: GenerationToken,
        result: Result<Arc<ModelScene>, String>,
    ) -> bool
    where
        E: MapEngine + ?Sized,
    {
        if !self.generation.is_current(token)
            || !matches!(self.state, Some(ModelViewState::Loading { .. }))
        {
            tracing::debug!(token = token.value(), "stale model load ignored");
            return false;
        }
        match result {
            Ok(scene) => {
                tracing::info!(
                    meshes = scene.meshes.len(),
                    triangles = scene.triangle_count(),
                    "model ready"
                );
                self.scene = Some(scene);
                if let Err(e) = self.attach_layer(engine) {
                    self.fail_detached(engine, format!("could not attach model layer: {e}"));
                    return true;
                }
                self.state = Some(ModelViewState::Ready);
                self.request_repaint(engine);
            }
            Err(message) => self.fail_detached(engine, message),
        }
        true
    }

    /// Re-enters loading with the same anchor and url after a failure.
    pub fn retry(&mut self) -> Option<LoadTicket> {
        if !matches!(self.state, Some(ModelViewState::Error { .. })) {
            return None;
        }
        let token = self.generation.advance();
        let activation = self.activation.as_mut()?;
        activation.token = token;
        self.scene = None;
        self.state = Some(ModelViewState::Loading { percent: 0 });
        tracing::info!(site = %activation.site, attempts = self.attempts, "model retry");
        Some(LoadTicket {
            token,
            site: activation.site.clone(),
            url: activation.url.clone(),
        })
    }

    /// Leaves 3D mode from any state, freeing every GPU resource this renderer
    /// created. Safe to call repeatedly.
    pub fn exit<E, G>(&mut self, engine: &mut E, gpu: &mut G)
    where
        E: MapEngine + ?Sized,
        G: GpuContext + ?Sized,
    {
        let was_active = self.activation.is_some();
        if let Some(mut scene) = self.gpu.take() {
            scene.dispose(gpu);
        }
        if was_active {
            gpu.release();
        }
        self.detach(engine);
        self.generation.invalidate();
        if let Some(a) = self.activation.take() {
            tracing::info!(site = %a.site, "model exit");
        }
        self.scene = None;
        self.drag_offset_deg = 0.0;
        self.attempts = 0;
        self.repaint_pending = false;
        self.state = None;
    }

    /// Per-frame draw hook. Returns whether anything was drawn.
    pub fn render<E, G>(&mut self, engine: &mut E, gpu: &mut G, camera: &Mat4) -> bool
    where
        E: MapEngine + ?Sized,
        G: GpuContext + ?Sized,
    {
        self.repaint_pending = false;
        if !matches!(self.state, Some(ModelViewState::Ready)) {
            return false;
        }
        let (Some(transform), Some(yaw)) = (self.transform(), self.effective_yaw_deg()) else {
            return false;
        };
        if gpu.is_lost() {
            self.fail(engine, gpu, "graphics context was lost".to_string());
            return false;
        }
        if self.gpu.is_none() {
            let Some(scene) = self.scene.as_deref() else {
                return false;
            };
            match GpuScene::upload(gpu, scene) {
                Ok(uploaded) => self.gpu = Some(uploaded),
                Err(e) => {
                    tracing::warn!(error = %e, "model upload failed");
                    self.fail(engine, gpu, format!("could not upload model: {e}"));
                    return false;
                }
            }
        }
        let mvp = camera.multiply(&transform.model_matrix(yaw));
        let drawn = match &self.gpu {
            Some(scene) => scene.draw(gpu, &mvp),
            None => Ok(()),
        };
        if let Err(e) = drawn {
            tracing::warn!(error = %e, "model draw failed");
            self.fail(engine, gpu, format!("could not draw model: {e}"));
            return false;
        }
        self.request_repaint(engine);
        true
    }

    /// Starts a rotation drag at screen `x` and suspends map gestures.
    pub fn pointer_down<E: MapEngine + ?Sized>(&mut self, engine: &mut E, x: f64) -> bool {
        if !matches!(self.state, Some(ModelViewState::Ready)) || !x.is_finite() {
            return false;
        }
        self.drag = Some(Drag {
            start_x: x,
            start_offset_deg: self.drag_offset_deg,
        });
        if !self.gestures_suspended {
            engine.set_gestures_enabled(false);
            self.gestures_suspended = true;
        }
        true
    }

    /// Updates the drag yaw. Moves between two frames collapse into one repaint.
    pub fn pointer_move<E: MapEngine + ?Sized>(&mut self, engine: &mut E, x: f64) -> bool {
        let Some(drag) = self.drag else {
            return false;
        };
        if !x.is_finite() {
            return false;
        }
        self.drag_offset_deg = drag.start_offset_deg + (x - drag.start_x) * self.rotation.degrees_per_px;
        self.request_repaint(engine);
        true
    }

    pub fn pointer_up<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.drag = None;
        self.restore_gestures(engine);
    }

    pub fn reset_rotation<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.drag_offset_deg = 0.0;
        if let Some(drag) = &mut self.drag {
            drag.start_offset_deg = 0.0;
        }
        if matches!(self.state, Some(ModelViewState::Ready)) {
            self.request_repaint(engine);
        }
    }

    /// Message suggesting the 2-D overlay on constrained devices. Never blocks loading.
    pub fn advisory(&self, device: &DeviceProfile, threshold_gb: f64) -> Option<String> {
        if !self.is_active() || self.advisory_dismissed || !device.is_constrained(threshold_gb) {
            return None;
        }
        Some(format!(
            "This device reports {:.1} GB of memory. 3D models may load slowly; the 2D overlay is lighter.",
            device.memory_gb.unwrap_or_default()
        ))
    }

    pub fn dismiss_advisory(&mut self) {
        self.advisory_dismissed = true;
    }

    fn attach_layer<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> Result<(), layers::EngineError> {
        if engine.has_layer(MODEL_LAYER_ID) {
            engine.remove_custom_layer(MODEL_LAYER_ID);
        }
        engine.add_custom_layer(MODEL_LAYER_ID)?;
        self.layer_attached = true;
        Ok(())
    }

    fn detach<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.drag = None;
        self.restore_gestures(engine);
        if self.layer_attached {
            engine.remove_custom_layer(MODEL_LAYER_ID);
            self.layer_attached = false;
        }
    }

    fn restore_gestures<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        if self.gestures_suspended {
            engine.set_gestures_enabled(true);
            self.gestures_suspended = false;
        }
    }

    fn request_repaint<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        if !self.repaint_pending {
            engine.trigger_repaint();
            self.repaint_pending = true;
        }
    }

    fn fail<E, G>(&mut self, engine: &mut E, gpu: &mut G, message: String)
    where
        E: MapEngine + ?Sized,
        G: GpuContext + ?Sized,
    {
        if let Some(mut scene) = self.gpu.take() {
            scene.dispose(gpu);
        }
        gpu.release();
        self.fail_detached(engine, message);
    }

    fn fail_detached<E: MapEngine + ?Sized>(&mut self, engine: &mut E, message: String) {
        self.detach(engine);
        self.scene = None;
        self.attempts += 1;
        let message = if message.trim().is_empty() {
            "the 3D model could not be loaded".to_string()
        } else {
            message
        };
        tracing::warn!(%message, attempts = self.attempts, "model error");
        self.state = Some(ModelViewState::Error {
            message,
            attempts: self.attempts,
        });
    }
}
