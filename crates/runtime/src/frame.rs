/// Frame metadata handed down from the host engine's draw loop.
///
/// The host owns the clock; the core never schedules frames itself. `time_ms`
/// is whatever monotonic timestamp the host passes (e.g. the rAF timestamp).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Host timestamp at the start of the frame (milliseconds).
    pub time_ms: f64,
}

impl Frame {
    pub fn new(index: u64, time_ms: f64) -> Self {
        Self { index, time_ms }
    }

    pub fn next(self, time_ms: f64) -> Self {
        Self::new(self.index + 1, time_ms)
    }
}

/// Counts host frames so events can be stamped with the frame they happened in.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    current: Option<Frame>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances to a new frame at `time_ms`.
    pub fn tick(&mut self, time_ms: f64) -> Frame {
        let frame = match self.current {
            Some(f) => f.next(time_ms),
            None => Frame::new(0, time_ms),
        };
        self.current = Some(frame);
        frame
    }

    /// The current frame; frame 0 at t=0 before the first tick.
    pub fn current(&self) -> Frame {
        self.current.unwrap_or(Frame::new(0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::{Frame, FrameClock};

    #[test]
    fn next_advances_index() {
        let f1 = Frame::new(0, 16.0).next(33.0);
        assert_eq!(f1.index, 1);
        assert_eq!(f1.time_ms, 33.0);
    }

    #[test]
    fn clock_starts_at_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.current(), Frame::new(0, 0.0));
        assert_eq!(clock.tick(5.0), Frame::new(0, 5.0));
        assert_eq!(clock.tick(21.0), Frame::new(1, 21.0));
        assert_eq!(clock.current().index, 1);
    }
}
