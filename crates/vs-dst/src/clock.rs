//! Simulated clock.
//!
//! Time only moves when the test advances it.

/// Monotonic simulated clock in nanoseconds.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    /// Clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    pub fn advance_ns(&mut self, delta: u64) {
        self.now_ns = self.now_ns.saturating_add(delta);
    }

    pub fn advance_us(&mut self, delta: u64) {
        self.advance_ns(delta.saturating_mul(1_000));
    }

    pub fn advance_ms(&mut self, delta: u64) {
        self.advance_ns(delta.saturating_mul(1_000_000));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let mut clock = SimClock::new();
        assert_eq!(clock.now_ns(), 0);

        clock.advance_ns(5);
        clock.advance_us(2);
        clock.advance_ms(1);
        assert_eq!(clock.now_ns(), 1_002_005);
    }

    #[test]
    fn test_saturates() {
        let mut clock = SimClock::new();
        clock.advance_ns(u64::MAX);
        clock.advance_ms(10);
        assert_eq!(clock.now_ns(), u64::MAX);
    }
}
