/// Coarse lifecycle of one model load.
///
/// Preparing → TransformReady → LoaderReady → Transferring → Parsing → Done
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadPhase {
    Preparing,
    TransformReady,
    LoaderReady,
    Transferring,
    Parsing,
    Done,
}

impl LoadPhase {
    /// Percentage reported on entering the phase.
    pub fn milestone(self) -> u8 {
        match self {
            LoadPhase::Preparing => 0,
            LoadPhase::TransformReady => 10,
            LoadPhase::LoaderReady | LoadPhase::Transferring => 20,
            LoadPhase::Parsing => 90,
            LoadPhase::Done => 100,
        }
    }
}

const TRANSFER_START: f64 = 20.0;
const TRANSFER_SPAN: f64 = 70.0;

/// Monotonic percentage for the progress indicator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    phase: LoadPhase,
    percent: u8,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            phase: LoadPhase::Preparing,
            percent: 0,
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Returns the new percentage if it changed.
    pub fn enter(&mut self, phase: LoadPhase) -> Option<u8> {
        if phase < self.phase {
            return None;
        }
        self.phase = phase;
        self.raise(phase.milestone())
    }

    /// Byte-transfer progress. Without a total the last milestone holds.
    pub fn transfer(&mut self, loaded: u64, total: Option<u64>) -> Option<u8> {
        if self.phase > LoadPhase::Transferring {
            return None;
        }
        self.phase = LoadPhase::Transferring;
        let total = total.filter(|t| *t > 0)?;
        let ratio = (loaded as f64 / total as f64).clamp(0.0, 1.0);
        self.raise((TRANSFER_START + TRANSFER_SPAN * ratio).floor() as u8)
    }

    fn raise(&mut self, percent: u8) -> Option<u8> {
        if percent > self.percent {
            self.percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}
