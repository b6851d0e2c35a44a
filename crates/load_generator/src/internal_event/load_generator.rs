use metrics::{Counter, Gauge, Histogram, counter, gauge, histogram};

use crate::{caller::CallResult, registered_event};

registered_event! {
    CallDispatched => {
        dispatched: Counter = counter!("load_generator_calls_dispatched_total"),
    }

    fn emit(&self, call_count: u64) {
        self.dispatched.increment(1);
        trace!(message = "Call dispatched.", call_count);
    }
}

registered_event! {
    CallCompleted => {
        results: Counter = counter!("load_generator_results_total"),
        failures: Counter = counter!("load_generator_call_failures_total"),
        elapsed: Histogram = histogram!("load_generator_call_elapsed_seconds"),
    }

    fn emit(&self, result: &CallResult) {
        self.results.increment(1);
        self.elapsed.record(result.elapsed);
        if !result.is_success() {
            self.failures.increment(1);
            debug!(
                message = "Call failed.",
                id = result.id,
                code = result.code.as_i32(),
                reason = result.message.as_deref().unwrap_or_default(),
            );
        }
    }
}

registered_event! {
    ResultDropped => {
        dropped: Counter = counter!("load_generator_results_dropped_total"),
    }

    fn emit(&self, result: &CallResult, total_dropped: u64) {
        self.dropped.increment(1);
        if logs_drop(total_dropped) {
            warn!(
                message = "Result pipeline full; dropping result.",
                id = result.id,
                code = result.code.as_i32(),
                elapsed_ms = result.elapsed.as_millis() as u64,
                total_dropped,
            );
        }
    }
}

registered_event! {
    TicketsInUse => {
        in_use: Gauge = gauge!("load_generator_tickets_in_use"),
    }

    fn emit(&self, in_use: usize) {
        self.in_use.set(in_use as f64);
    }
}

// Sustained overflow logs at drops 1, 2, 4, 8, ...; the counter carries the rest.
fn logs_drop(total_dropped: u64) -> bool {
    total_dropped.is_power_of_two()
}
