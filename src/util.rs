//! This is an internal module that contains utility functionality used by other modules.

use crate::error::{Error, Result};

/// Busy-wait until `ready` returns true, checking it at most `max_iters` times.
///
/// This is the only way the clock code waits on hardware: no timer is assumed to be running
/// yet, since its kernel clock may depend on the configuration being applied. Budgets are
/// iteration counts, so they take less real time the faster the core runs; they're sized for
/// the fastest core clock.
///
/// Returns `Error::RegisterUnchanged` if the budget runs out.
pub fn poll_until(mut ready: impl FnMut() -> bool, max_iters: u32) -> Result<()> {
    for _ in 0..max_iters {
        if ready() {
            return Ok(());
        }
        core::hint::spin_loop();
    }

    Err(Error::RegisterUnchanged)
}
