//! The workload seam: what a single call looks like and how its outcome is recorded.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::IntoError;
use tower::{Service, ServiceExt};

use crate::error::{BoxError, CallError, CallSnafu, CrashedSnafu, RejectedSnafu};

/// One request built by a [`Caller`]. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    id: u64,
    payload: Bytes,
}

impl Request {
    pub fn new(id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// The outcome of one call, tagged as either a payload or the reason there is none.
#[derive(Debug)]
pub struct Response {
    id: u64,
    outcome: Result<Bytes, CallError>,
}

impl Response {
    pub fn new(id: u64, outcome: Result<Bytes, CallError>) -> Self {
        Self { id, outcome }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn outcome(&self) -> &Result<Bytes, CallError> {
        &self.outcome
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CallError> {
        self.outcome.as_ref().err()
    }
}

/// Drives the workload under test.
///
/// Implementations own everything protocol specific: how a request is encoded, how it is
/// sent and how a response is validated. The generator only times the call and records
/// the outcome.
///
/// A call that panics, in `build_req` or in `call`, is caught and recorded as
/// [`RetCode::Crashed`]; it never takes down the dispatcher.
///
/// # Example
/// ```rust
/// use bytes::Bytes;
/// use load_generator::{BoxError, Caller, Request, Response};
///
/// struct Ping;
///
/// #[async_trait::async_trait]
/// impl Caller for Ping {
///     fn build_req(&self) -> Request {
///         Request::new(0, Bytes::from_static(b"ping"))
///     }
///
///     async fn call(&self, _payload: Bytes) -> Result<Bytes, BoxError> {
///         Ok(Bytes::from_static(b"pong"))
///     }
///
///     fn check_resp(&self, _request: &Request, response: &Response) -> bool {
///         response.payload().is_some_and(|body| body.as_ref() == b"pong")
///     }
/// }
/// ```
#[async_trait]
pub trait Caller: Send + Sync + 'static {
    /// Builds the next request.
    fn build_req(&self) -> Request;

    /// Sends `payload` and waits for the response.
    ///
    /// Expected to finish within the generator's configured timeout. This is an operating
    /// assumption used for sizing; the generator does not cut the call off.
    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError>;

    /// Validates a successful response against the request that produced it.
    fn check_resp(&self, request: &Request, response: &Response) -> bool;
}

/// Result codes attached to every [`CallResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[repr(i32)]
pub enum RetCode {
    Success = 0,
    /// The call succeeded but took longer than the configured timeout.
    CallTimeout = 1001,
    CallError = 2001,
    ResponseError = 2002,
    Crashed = 3001,
}

impl RetCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Warnings still count as successful calls.
    pub const fn is_success(self) -> bool {
        matches!(self, RetCode::Success | RetCode::CallTimeout)
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetCode::Success => "success",
            RetCode::CallTimeout => "call timeout",
            RetCode::CallError => "call error",
            RetCode::ResponseError => "response error",
            RetCode::Crashed => "crashed",
        };
        write!(f, "{name} ({})", self.as_i32())
    }
}

/// Everything recorded about one dispatched call.
///
/// Exactly one is created per dispatched call, crashed calls included.
#[derive(Debug)]
pub struct CallResult {
    pub id: u64,
    /// `None` when `build_req` itself crashed.
    pub request: Option<Request>,
    pub response: Response,
    pub elapsed: Duration,
    pub code: RetCode,
    pub message: Option<String>,
}

impl CallResult {
    /// Grades a finished call.
    pub(crate) fn completed<C: Caller + ?Sized>(
        caller: &C,
        request: Request,
        outcome: Result<Bytes, BoxError>,
        elapsed: Duration,
        timeout: Duration,
    ) -> Self {
        let id = request.id();

        let (response, code, message) = match outcome {
            Err(source) => {
                let error = CallSnafu.into_error(source);
                let message = error.to_string();
                (Response::new(id, Err(error)), RetCode::CallError, Some(message))
            }
            Ok(payload) => {
                let response = Response::new(id, Ok(payload));
                if !caller.check_resp(&request, &response) {
                    (
                        Response::new(id, Err(RejectedSnafu.build())),
                        RetCode::ResponseError,
                        Some(format!("response to request {id} failed validation")),
                    )
                } else if elapsed > timeout {
                    let message = format!(
                        "call took {}ms, longer than the {}ms timeout",
                        elapsed.as_millis(),
                        timeout.as_millis()
                    );
                    (response, RetCode::CallTimeout, Some(message))
                } else {
                    (response, RetCode::Success, None)
                }
            }
        };

        Self {
            id,
            request: Some(request),
            response,
            elapsed,
            code,
            message,
        }
    }

    /// Records a call that panicked. Elapsed time is reported as zero.
    pub(crate) fn crashed(request: Option<Request>, reason: String) -> Self {
        let id = request.as_ref().map_or(0, Request::id);
        let message = format!("call func crashed: {reason}");
        Self {
            id,
            request,
            response: Response::new(id, Err(CrashedSnafu { reason }.build())),
            elapsed: Duration::ZERO,
            code: RetCode::Crashed,
            message: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

type CheckFn = Box<dyn Fn(&Request, &Response) -> bool + Send + Sync + 'static>;

/// Adapts a `tower::Service` into a [`Caller`].
///
/// Requests come from `factory`; every call clones the service and drives it with
/// [`ServiceExt::oneshot`], so tower middleware (timeouts, retries, concurrency limits)
/// can sit between the generator and the transport. Responses are accepted unless a check
/// is installed with [`with_check`](Self::with_check).
pub struct ServiceCaller<S, F> {
    service: S,
    factory: F,
    check: Option<CheckFn>,
}

impl<S, F> ServiceCaller<S, F> {
    pub fn new(service: S, factory: F) -> Self {
        Self {
            service,
            factory,
            check: None,
        }
    }

    pub fn with_check(
        mut self,
        check: impl Fn(&Request, &Response) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.check = Some(Box::new(check));
        self
    }
}

#[async_trait]
impl<S, F> Caller for ServiceCaller<S, F>
where
    S: Service<Bytes, Response = Bytes> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    F: Fn() -> Request + Send + Sync + 'static,
{
    fn build_req(&self) -> Request {
        (self.factory)()
    }

    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        self.service.clone().oneshot(payload).await.map_err(Into::into)
    }

    fn check_resp(&self, request: &Request, response: &Response) -> bool {
        self.check.as_ref().is_none_or(|check| check(request, response))
    }
}

impl<S, F> fmt::Debug for ServiceCaller<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCaller")
            .field("check", &self.check.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceBuilder;
    use tower_test::{assert_request_eq, mock};

    use super::*;
    use crate::test_utils::{Echo, Failing};

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn success_is_graded_success() {
        let caller = Echo::default();
        let request = caller.build_req();
        let payload = request.payload().clone();

        let elapsed = Duration::from_millis(5);
        let result = CallResult::completed(&caller, request, Ok(payload), elapsed, TIMEOUT);
        assert_eq!(result.code, RetCode::Success);
        assert!(result.message.is_none());
        assert!(result.response.payload().is_some());
        assert!(result.is_success());
    }

    #[test]
    fn slow_success_is_a_warning() {
        let caller = Echo::default();
        let request = caller.build_req();
        let payload = request.payload().clone();

        let elapsed = Duration::from_millis(150);
        let result = CallResult::completed(&caller, request, Ok(payload), elapsed, TIMEOUT);
        assert_eq!(result.code, RetCode::CallTimeout);
        assert!(result.is_success());
        assert!(result.message.unwrap().contains("150ms"));
    }

    #[test]
    fn rejected_response_is_a_response_error() {
        let caller = Echo::default();
        let request = caller.build_req();

        let result = CallResult::completed(
            &caller,
            request,
            Ok(Bytes::from_static(b"something else")),
            Duration::from_millis(5),
            TIMEOUT,
        );
        assert_eq!(result.code, RetCode::ResponseError);
        assert!(matches!(result.response.error(), Some(CallError::Rejected)));
        assert!(!result.is_success());
    }

    #[test]
    fn call_error_keeps_its_source() {
        let caller = Failing;
        let request = caller.build_req();

        let result = CallResult::completed(
            &caller,
            request,
            Err("connection refused".into()),
            Duration::from_millis(5),
            TIMEOUT,
        );
        assert_eq!(result.code, RetCode::CallError);
        assert_eq!(result.message.as_deref(), Some("call failed: connection refused"));
    }

    #[test]
    fn crash_has_zero_elapsed() {
        let result = CallResult::crashed(None, "boom".to_owned());
        assert_eq!(result.code, RetCode::Crashed);
        assert_eq!(result.elapsed, Duration::ZERO);
        assert_eq!(result.id, 0);
        assert!(result.response.error().is_some_and(CallError::is_crash));
        assert_eq!(result.message.as_deref(), Some("call func crashed: boom"));
    }

    #[test]
    fn ret_code_values() {
        assert_eq!(RetCode::Success.as_i32(), 0);
        assert_eq!(RetCode::CallTimeout.as_i32(), 1001);
        assert_eq!(RetCode::CallError.as_i32(), 2001);
        assert_eq!(RetCode::ResponseError.as_i32(), 2002);
        assert_eq!(RetCode::Crashed.as_i32(), 3001);
        assert_eq!(RetCode::ResponseError.to_string(), "response error (2002)");
    }

    #[tokio::test]
    async fn service_caller_drives_the_service() {
        let (service, mut handle) = mock::pair::<Bytes, Bytes>();
        let caller = ServiceCaller::new(service, || Request::new(7, Bytes::from_static(b"hello")));

        let request = caller.build_req();
        assert_eq!(request.id(), 7);

        let call = tokio::spawn(async move { caller.call(Bytes::from_static(b"hello")).await });
        assert_request_eq!(handle, Bytes::from_static(b"hello"))
            .send_response(Bytes::from_static(b"world"));

        let body = call.await.unwrap().unwrap();
        assert_eq!(body, Bytes::from_static(b"world"));
    }

    #[tokio::test]
    async fn service_caller_passes_errors_through() {
        let (service, mut handle) = mock::pair::<Bytes, Bytes>();
        let caller = ServiceCaller::new(service, || Request::new(1, Bytes::new()));

        let call = tokio::spawn(async move { caller.call(Bytes::new()).await });
        assert_request_eq!(handle, Bytes::new()).send_error("unavailable");

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn service_caller_composes_with_tower_layers() {
        let (service, mut handle) = mock::pair::<Bytes, Bytes>();
        let service = ServiceBuilder::new().timeout(Duration::from_millis(50)).service(service);
        let caller = ServiceCaller::new(service, || Request::new(1, Bytes::new()));

        let call = tokio::spawn(async move { caller.call(Bytes::new()).await });
        let _pending = handle.next_request().await.expect("request reaches the mock");

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(call.await.unwrap().is_err());
    }

    #[test]
    fn service_caller_custom_check() {
        let (service, _handle) = mock::pair::<Bytes, Bytes>();
        let caller = ServiceCaller::new(service, || Request::new(1, Bytes::from_static(b"a")))
            .with_check(|request, response| response.payload() == Some(request.payload()));

        let request = caller.build_req();
        let good = Response::new(1, Ok(Bytes::from_static(b"a")));
        let bad = Response::new(1, Ok(Bytes::from_static(b"b")));
        assert!(caller.check_resp(&request, &good));
        assert!(!caller.check_resp(&request, &bad));
    }
}
