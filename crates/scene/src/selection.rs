use foundation::SiteId;

/// Lowest opacity the overlay slider may reach; fully transparent is "hidden".
pub const OVERLAY_OPACITY_MIN: f64 = 0.05;
pub const OVERLAY_OPACITY_MAX: f64 = 1.0;

/// Opaque handle of an active model render pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RenderHandle(pub u64);

/// What the old selection held when it was replaced.
///
/// The caller must release these resources before creating any for the new
/// site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous: Option<SiteId>,
    pub previous_model: Option<RenderHandle>,
    pub had_overlay: bool,
}

/// Ephemeral view state owned by the core.
///
/// Ordering contract:
/// - At most one site, one overlay and one model handle at a time.
/// - Changing the site resets overlay/model state; the returned
///   [`SelectionChange`] lists what must be torn down.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSelection {
    site: Option<SiteId>,
    overlay_available: bool,
    overlay_visible: bool,
    overlay_opacity: f64,
    model: Option<RenderHandle>,
    default_opacity: f64,
}

impl Default for ViewportSelection {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl ViewportSelection {
    pub fn new(default_opacity: f64) -> Self {
        let default_opacity = clamp_opacity(default_opacity);
        Self {
            site: None,
            overlay_available: false,
            overlay_visible: false,
            overlay_opacity: default_opacity,
            model: None,
            default_opacity,
        }
    }

    pub fn site(&self) -> Option<&SiteId> {
        self.site.as_ref()
    }

    pub fn overlay_available(&self) -> bool {
        self.overlay_available
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn overlay_opacity(&self) -> f64 {
        self.overlay_opacity
    }

    pub fn model(&self) -> Option<RenderHandle> {
        self.model
    }

    /// Selects `site` (or clears with `None`).
    ///
    /// Returns `None` when the selection did not change.
    pub fn select(&mut self, site: Option<SiteId>, has_overlay: bool) -> Option<SelectionChange> {
        if self.site == site {
            return None;
        }
        let change = SelectionChange {
            previous: self.site.take(),
            previous_model: self.model.take(),
            had_overlay: self.overlay_available,
        };
        self.overlay_available = site.is_some() && has_overlay;
        self.overlay_visible = false;
        self.overlay_opacity = self.default_opacity;
        self.site = site;
        Some(change)
    }

    /// Updates availability after the selected site's record changed.
    pub fn set_overlay_available(&mut self, available: bool) {
        self.overlay_available = self.site.is_some() && available;
        if !self.overlay_available {
            self.overlay_visible = false;
        }
    }

    /// Toggles overlay visibility. A site without an overlay stays hidden.
    pub fn set_overlay_visible(&mut self, visible: bool) -> bool {
        self.overlay_visible = visible && self.overlay_available;
        self.overlay_visible
    }

    /// Stores a clamped opacity and returns the value actually applied.
    pub fn set_overlay_opacity(&mut self, opacity: f64) -> f64 {
        self.overlay_opacity = clamp_opacity(opacity);
        self.overlay_opacity
    }

    pub fn attach_model(&mut self, handle: RenderHandle) -> Option<RenderHandle> {
        self.model.replace(handle)
    }

    pub fn detach_model(&mut self) -> Option<RenderHandle> {
        self.model.take()
    }
}

/// Clamps into `[OVERLAY_OPACITY_MIN, OVERLAY_OPACITY_MAX]`; NaN maps to max.
pub fn clamp_opacity(v: f64) -> f64 {
    if v.is_nan() {
        return OVERLAY_OPACITY_MAX;
    }
    v.clamp(OVERLAY_OPACITY_MIN, OVERLAY_OPACITY_MAX)
}
