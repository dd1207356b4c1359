//! Injected time source, so timeouts and `stabilize_interval` are deterministically
//! testable instead of reading the wall clock directly.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
pub use wasm_timer::Instant;

/// A source of `Instant`s. `Node` never calls `Instant::now()` directly.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real clock, backed by `wasm_timer::Instant` (monotonic on both native and wasm
/// targets), matching the `Instant` type the teacher crate already used for query timing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock test code advances explicitly. Starts at `Instant::now()` at construction and
/// only moves forward when `advance` is called.
#[derive(Debug)]
pub struct FakeClock {
    now: Cell<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            now: Cell::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Lets a single `FakeClock` be shared (via `Rc::clone`) across several `Node`s in a
/// multi-node test, so advancing it once moves every node's clock in lockstep.
impl Clock for Rc<FakeClock> {
    fn now(&self) -> Instant {
        FakeClock::now(self)
    }
}
