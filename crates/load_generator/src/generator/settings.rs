use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{
    CapacityTooLargeSnafu, Error, LpsTooHighSnafu, ZeroDurationSnafu, ZeroLpsSnafu,
    ZeroTimeoutSnafu,
};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Highest dispatch rate: one call per nanosecond.
pub const MAX_LPS: u32 = 1_000_000_000;

/// Run parameters of a [`LoadGenerator`](super::LoadGenerator).
///
/// | Parameter | Description |
/// |-----------|-------------|
/// | `timeout` | Expected latency of one call. Sizes the ticket pool; calls are never cut off. |
/// | `lps` | Target calls per second, at most [`MAX_LPS`]. One call every `1 / lps`. |
/// | `duration` | Total run length from `start()`. [`Duration::MAX`] runs until `stop()`. |
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use load_generator::GeneratorSettings;
///
/// let settings = GeneratorSettings::builder()
///     .timeout(Duration::from_millis(100))
///     .lps(10)
///     .duration(Duration::from_secs(1))
///     .build();
/// assert_eq!(settings.concurrency(), Ok(1));
/// ```
///
/// Settings also deserialize from configuration files, with durations in milliseconds:
///
/// ```json
/// { "timeout_ms": 100, "lps": 10, "duration_ms": 1000 }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorSettings {
    #[serde(rename = "timeout_ms", with = "crate::millis")]
    pub timeout: Duration,

    pub lps: u32,

    #[serde(rename = "duration_ms", with = "crate::millis")]
    pub duration: Duration,
}

impl GeneratorSettings {
    /// Interval between two dispatches: `1 / lps`, never shorter than a nanosecond.
    pub fn interval(&self) -> Result<Duration, Error> {
        snafu::ensure!(self.lps > 0, ZeroLpsSnafu);
        snafu::ensure!(
            self.lps <= MAX_LPS,
            LpsTooHighSnafu {
                lps: self.lps,
                max: MAX_LPS,
            }
        );
        Ok(Duration::from_nanos(1_000_000_000 / u64::from(self.lps)))
    }

    /// Size of the ticket pool: how many calls are dispatched during one `timeout`.
    ///
    /// Computed as `ceil(timeout * lps)`, so any positive timeout yields at least one ticket
    /// and a timeout that is not a whole number of intervals rounds up.
    pub fn concurrency(&self) -> Result<usize, Error> {
        snafu::ensure!(self.lps > 0, ZeroLpsSnafu);
        snafu::ensure!(!self.timeout.is_zero(), ZeroTimeoutSnafu);

        let scaled = self.timeout.as_nanos() * u128::from(self.lps);
        let concurrency = scaled.div_ceil(NANOS_PER_SEC);

        match usize::try_from(concurrency) {
            Ok(concurrency) if concurrency <= Semaphore::MAX_PERMITS => Ok(concurrency),
            _ => CapacityTooLargeSnafu {
                requested: concurrency,
                max: Semaphore::MAX_PERMITS,
            }
            .fail(),
        }
    }

    /// Checks every parameter and returns the derived concurrency.
    pub fn validate(&self) -> Result<usize, Error> {
        self.interval()?;
        let concurrency = self.concurrency()?;
        snafu::ensure!(!self.duration.is_zero(), ZeroDurationSnafu);
        Ok(concurrency)
    }
}
