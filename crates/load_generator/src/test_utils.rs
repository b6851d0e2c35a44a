use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    caller::{CallResult, Caller, Request, Response},
    error::BoxError,
};

pub(crate) fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub(crate) fn result_with_elapsed(id: u64, elapsed: Duration) -> CallResult {
    let request = Request::new(id, Bytes::from_static(b"ping"));
    let response = Ok(Bytes::from_static(b"ping"));
    CallResult::completed(&Echo::default(), request, response, elapsed, Duration::MAX)
}

pub(crate) fn crashed_result(id: u64) -> CallResult {
    CallResult::crashed(Some(Request::new(id, Bytes::new())), "test crash".to_owned())
}

/// Echoes the payload back immediately; ids count up from 1.
#[derive(Debug, Default)]
pub(crate) struct Echo {
    next_id: AtomicU64,
}

#[async_trait]
impl Caller for Echo {
    fn build_req(&self) -> Request {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Request::new(id, Bytes::from_static(b"ping"))
    }

    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        Ok(payload)
    }

    fn check_resp(&self, request: &Request, response: &Response) -> bool {
        response.payload() == Some(request.payload())
    }
}

/// Every call returns an error.
#[derive(Debug)]
pub(crate) struct Failing;

#[async_trait]
impl Caller for Failing {
    fn build_req(&self) -> Request {
        Request::new(1, Bytes::new())
    }

    async fn call(&self, _payload: Bytes) -> Result<Bytes, BoxError> {
        Err("refused".into())
    }

    fn check_resp(&self, _request: &Request, _response: &Response) -> bool {
        true
    }
}

/// Where a [`Panicking`] caller blows up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PanicAt {
    BuildReq,
    Call,
    CheckResp,
}

/// Panics on every call, counting how often it was entered.
#[derive(Debug)]
pub(crate) struct Panicking {
    at: PanicAt,
    pub(crate) entered: Arc<AtomicUsize>,
}

impl Panicking {
    pub(crate) fn new(at: PanicAt) -> Self {
        Self {
            at,
            entered: Arc::default(),
        }
    }
}

#[async_trait]
impl Caller for Panicking {
    fn build_req(&self) -> Request {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if self.at == PanicAt::BuildReq {
            panic!("build_req exploded");
        }
        Request::new(42, Bytes::from_static(b"boom"))
    }

    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        tokio::task::yield_now().await;
        if self.at == PanicAt::Call {
            panic!("call exploded");
        }
        Ok(payload)
    }

    fn check_resp(&self, _request: &Request, _response: &Response) -> bool {
        if self.at == PanicAt::CheckResp {
            panic!("check_resp exploded");
        }
        true
    }
}

/// Sleeps for `latency` per call and records the highest number of concurrent calls.
#[derive(Debug)]
pub(crate) struct Tracking {
    latency: Duration,
    pub(crate) in_flight: Arc<AtomicUsize>,
    pub(crate) max_in_flight: Arc<AtomicUsize>,
    pub(crate) completed: Arc<AtomicUsize>,
}

impl Tracking {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            latency,
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
            completed: Arc::default(),
        }
    }
}

#[async_trait]
impl Caller for Tracking {
    fn build_req(&self) -> Request {
        Request::new(0, Bytes::from_static(b"slow"))
    }

    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(payload)
    }

    fn check_resp(&self, _request: &Request, _response: &Response) -> bool {
        true
    }
}
