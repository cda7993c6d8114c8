// crates/kinetoscope-device/src/clock.rs
//
// The emulator applies a simulated ~100 ms processing delay before
// dispatching a command, to mimic real hardware timing (spec.md §4.F); the
// real firmware has no such delay. Modeled as an injected capability
// rather than a free-standing `sleep` call, so tests can run the full
// command dispatch path without actually waiting (spec.md §9 REDESIGN
// FLAGS: "the HTTP fetcher, the SRAM writer, and the clock source are the
// only polymorphic seams").

use std::time::Duration;

/// A source of "wait this long" the command processor can be driven by.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// The real clock: an actual thread sleep. Used by the firmware build and
/// by `kinetoscope-emu` when run as a standalone binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that records requested sleeps without ever blocking, so tests
/// exercise the emulator's processing-delay code path without taking
/// wall-clock time to run.
#[derive(Default)]
pub struct FakeClock {
    slept: std::sync::Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_requested(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

impl Clock for FakeClock {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_records_without_blocking() {
        let clock = FakeClock::new();
        clock.sleep(Duration::from_millis(100));
        clock.sleep(Duration::from_millis(50));
        assert_eq!(clock.total_requested(), Duration::from_millis(150));
    }
}
