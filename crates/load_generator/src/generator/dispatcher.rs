use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::{JoinError, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{Instrument, Span};

use super::{executor::CallExecutor, stop_requested};
use crate::{
    caller::Caller,
    internal_event::{CallDispatched, TicketsInUse},
    pipeline::ResultSender,
    tickets::TicketPool,
};

/// Paced admission loop: one ticketed call per tick until stopped.
pub(crate) struct Dispatcher<C> {
    pub(crate) executor: Arc<CallExecutor<C>>,
    pub(crate) tickets: TicketPool,
    pub(crate) interval: Duration,
    pub(crate) deadline: Instant,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) call_count: Arc<AtomicU64>,
    pub(crate) span: Span,
}

impl<C: Caller> Dispatcher<C> {
    /// Dispatches until the deadline passes, a stop is requested or the ticket pool closes,
    /// then waits for every call it spawned.
    ///
    /// Hands `results` back once no executor holds a clone of it any more, so the caller
    /// can close the pipeline knowing nothing will submit to it again.
    pub(crate) async fn run(mut self, results: ResultSender) -> ResultSender {
        let dispatched = CallDispatched::register();
        let tickets_in_use = TicketsInUse::register();
        let mut in_flight = JoinSet::new();

        // The first tick completes immediately, so the first call goes out at start.
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => break,
                _ = time::sleep_until(self.deadline) => break,
                _ = ticker.tick() => {}
            }

            while let Some(joined) = in_flight.try_join_next() {
                log_join_failure(joined);
            }

            let ticket = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => break,
                _ = time::sleep_until(self.deadline) => break,
                ticket = self.tickets.acquire() => match ticket {
                    Some(ticket) => ticket,
                    None => {
                        debug!(message = "Ticket pool closed; stopping dispatch.");
                        break;
                    }
                },
            };

            let call_count = self.call_count.fetch_add(1, Ordering::AcqRel) + 1;
            dispatched.emit(call_count);
            tickets_in_use.emit(self.tickets.in_use());

            let executor = Arc::clone(&self.executor);
            in_flight.spawn(
                executor
                    .execute(ticket, results.clone())
                    .instrument(self.span.clone()),
            );
        }

        debug!(
            message = "Dispatch stopped; draining in-flight calls.",
            in_flight = in_flight.len(),
            call_count = self.call_count.load(Ordering::Acquire),
        );
        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }
        tickets_in_use.emit(self.tickets.in_use());

        results
    }
}

// Executors catch caller panics themselves; a join error here is a bug in this crate.
fn log_join_failure(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        error!(message = "Call executor task failed.", %error);
    }
}
