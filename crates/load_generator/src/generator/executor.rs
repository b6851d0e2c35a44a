use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use futures::FutureExt;
use tokio::time::Instant;

use crate::{
    caller::{CallResult, Caller},
    internal_event::TicketsInUse,
    pipeline::ResultSender,
    tickets::{Ticket, TicketPool},
};

/// Runs single request/response cycles against a [`Caller`].
pub(crate) struct CallExecutor<C> {
    caller: Arc<C>,
    timeout: Duration,
    tickets: TicketPool,
    tickets_in_use: TicketsInUse,
}

impl<C: Caller> CallExecutor<C> {
    pub(crate) fn new(caller: Arc<C>, timeout: Duration, tickets: TicketPool) -> Self {
        Self {
            caller,
            timeout,
            tickets,
            tickets_in_use: TicketsInUse::register(),
        }
    }

    /// Performs one call, submits its result and gives the ticket back.
    ///
    /// The ticket is owned by this future, so it returns to the pool exactly once whatever
    /// happens inside, including a panic that escapes the caller.
    pub(crate) async fn execute(self: Arc<Self>, ticket: Ticket, results: ResultSender) {
        let result = self.call_once().await;
        results.submit(result);
        drop(ticket);
        self.tickets_in_use.emit(self.tickets.in_use());
    }

    /// Builds, sends and grades one request. Panics in any [`Caller`] method become
    /// [`RetCode::Crashed`](crate::RetCode::Crashed) results.
    pub(crate) async fn call_once(&self) -> CallResult {
        let caller = &*self.caller;

        let request = match panic::catch_unwind(AssertUnwindSafe(|| caller.build_req())) {
            Ok(request) => request,
            Err(panic) => return CallResult::crashed(None, panic_reason(panic)),
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(caller.call(request.payload().clone()))
            .catch_unwind()
            .await;
        let elapsed = start.elapsed();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => return CallResult::crashed(Some(request), panic_reason(panic)),
        };

        // `check_resp` is caller code too.
        let graded = request.clone();
        panic::catch_unwind(AssertUnwindSafe(|| {
            CallResult::completed(caller, graded, outcome, elapsed, self.timeout)
        }))
        .unwrap_or_else(|panic| CallResult::crashed(Some(request), panic_reason(panic)))
    }
}

fn panic_reason(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
