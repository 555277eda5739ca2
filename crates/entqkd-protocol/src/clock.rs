//! Simulated time on tokio's clock.
//!
//! Substrate delays are nanoseconds but tokio's timer resolves whole
//! milliseconds, so one simulated nanosecond runs as one millisecond of
//! runtime time. Delays handed to the timer go through [`to_runtime`] and
//! measured intervals through [`to_simulated`]. Run sessions on a paused
//! runtime and the scaling costs no wall-clock time.

use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Upper bound for deadlines that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runtime duration that stands in for a simulated one.
pub fn to_runtime(simulated: Duration) -> Duration {
    Duration::from_millis(saturating_u64(simulated.as_nanos()))
}

/// Simulated duration measured by a runtime one. Sub-tick remainders are
/// dropped.
pub fn to_simulated(runtime: Duration) -> Duration {
    Duration::from_nanos(saturating_u64(runtime.as_millis()))
}

/// Simulated time from `earlier` to `later`; zero if `later` is earlier.
pub fn between(earlier: Instant, later: Instant) -> Duration {
    to_simulated(later.saturating_duration_since(earlier))
}

/// Simulated time elapsed since `earlier`.
pub fn since(earlier: Instant) -> Duration {
    between(earlier, Instant::now())
}

/// The instant `simulated` after `from`.
pub fn after(from: Instant, simulated: Duration) -> Instant {
    from.checked_add(to_runtime(simulated))
        .unwrap_or_else(|| from + FAR_FUTURE)
}

/// Sleep for a simulated duration.
pub fn sleep(simulated: Duration) -> Sleep {
    tokio::time::sleep(to_runtime(simulated))
}

fn saturating_u64(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
