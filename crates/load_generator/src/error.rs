use snafu::Snafu;

/// Boxed error returned by [`Caller::call`](crate::Caller::call) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Construction errors.
///
/// These are the only errors surfaced to the user of this crate; everything that goes wrong
/// after [`LoadGenerator::start`](crate::LoadGenerator::start) is recovered and reported
/// through a [`CallResult`](crate::CallResult) or the generator's counters.
#[derive(Clone, Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("loads per second must be greater than zero"))]
    ZeroLps,

    #[snafu(display("{lps} loads per second exceeds the maximum of {max}"))]
    LpsTooHigh { lps: u32, max: u32 },

    #[snafu(display("call timeout must be greater than zero"))]
    ZeroTimeout,

    #[snafu(display("run duration must be greater than zero"))]
    ZeroDuration,

    #[snafu(display("ticket pool capacity must be greater than zero"))]
    ZeroCapacity,

    #[snafu(display("ticket pool capacity {requested} exceeds the maximum of {max}"))]
    CapacityTooLarge { requested: u128, max: usize },
}

/// Why a single call did not produce an accepted response.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CallError {
    /// The caller's `call` returned an error.
    #[snafu(display("call failed: {source}"))]
    Call { source: BoxError },

    /// `check_resp` rejected the response payload.
    #[snafu(display("response rejected by check"))]
    Rejected,

    /// `build_req` or `call` panicked.
    #[snafu(display("call crashed: {reason}"))]
    Crashed { reason: String },
}

impl CallError {
    pub const fn is_crash(&self) -> bool {
        matches!(self, CallError::Crashed { .. })
    }
}
