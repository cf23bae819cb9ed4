use quanta::Clock;
use quanta::Instant;

/// Monotonic millisecond clock.
///
/// Wraps a `quanta::Clock` with a fixed anchor so every timestamp in the
/// engine is a small positive millisecond offset. Wall-clock adjustments
/// never move it.
#[derive(Debug, Clone)]
pub(crate) struct MonotonicClock {
    clock: Clock,
    anchor: Instant,
}

impl MonotonicClock {
    pub(crate) fn new() -> Self {
        Self::from_quanta(Clock::new())
    }

    pub(crate) fn from_quanta(clock: Clock) -> Self {
        let anchor = clock.now();
        Self { clock, anchor }
    }

    /// Milliseconds elapsed since this clock was created.
    pub(crate) fn now_ms(&self) -> i64 {
        self.clock.now().duration_since(self.anchor).as_millis() as i64
    }
}
