/// Last-write-wins debouncer driven by caller-supplied timestamps.
///
/// Each `push` replaces the pending value and restarts the quiet period.
/// `poll` releases the value once `delay_ms` has elapsed since the last push.
/// No wall clock is read here, so behavior is deterministic under test.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay_ms: f64,
    pending: Option<(T, f64)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms: delay_ms.max(0.0),
            pending: None,
        }
    }

    pub fn delay_ms(&self) -> f64 {
        self.delay_ms
    }

    pub fn push(&mut self, value: T, now_ms: f64) {
        self.pending = Some((value, now_ms));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Earliest timestamp at which `poll` would fire.
    pub fn due_at(&self) -> Option<f64> {
        self.pending.as_ref().map(|(_, at)| at + self.delay_ms)
    }

    pub fn poll(&mut self, now_ms: f64) -> Option<T> {
        let due = self.due_at()?;
        if now_ms < due {
            return None;
        }
        self.pending.take().map(|(v, _)| v)
    }

    /// Releases the pending value regardless of time.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(v, _)| v)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
