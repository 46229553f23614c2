/// Token identifying one activation of a cancellable operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

impl GenerationToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic counter used to discard results of superseded async work.
///
/// Starting new work or cancelling bumps the counter; a result is applied only
/// if it carries the token that is still current.
#[derive(Debug, Default, Clone)]
pub struct Generation {
    current: u64,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation and returns its token.
    pub fn advance(&mut self) -> GenerationToken {
        self.current = self.current.wrapping_add(1);
        GenerationToken(self.current)
    }

    /// Invalidates every outstanding token without issuing a new one.
    pub fn invalidate(&mut self) {
        self.current = self.current.wrapping_add(1);
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        token.0 == self.current
    }
}
