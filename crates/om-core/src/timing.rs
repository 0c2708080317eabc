//! Lightweight wall clock timing.
//!
//! Timers are always cheap to create; reporting is only enabled when
//! `enable_timing` was called or the `OM_TIMING` environment variable is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable timing reports globally.
pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Check if timing reports are enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var("OM_TIMING").is_ok()
}

/// A simple timer that measures elapsed time.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Elapsed seconds since start.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer, print to stderr if enabled, and return elapsed seconds.
    pub fn stop(self) -> f64 {
        let elapsed = self.elapsed_s();
        if is_enabled() {
            eprintln!("[TIMING] {}: {:.3}s", self.label, elapsed);
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_is_monotonic() {
        let timer = Timer::start("test");
        assert_eq!(timer.label(), "test");
        let a = timer.elapsed_s();
        let b = timer.elapsed_s();
        assert!(b >= a);
        assert!(timer.stop() >= 0.0);
    }
}
