//! Ticket pool: a closable counting semaphore bounding in-flight calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{CapacityTooLargeSnafu, Error, ZeroCapacitySnafu};

/// A fixed-capacity pool of tickets.
///
/// Every in-flight call holds exactly one ticket, so at most [`total`](Self::total) calls
/// run at the same time. Closing the pool wakes every pending acquirer with a failure, which
/// is how the dispatcher learns that it must stop spawning.
///
/// Two ways to take a ticket are offered:
/// - [`acquire`](Self::acquire) returns a [`Ticket`] that goes back to the pool when dropped.
/// - [`get`](Self::get) / [`put`](Self::put) move a bare token out of and back into the pool.
///   The caller must pair every successful `get` with exactly one `put`, and must not `put`
///   after the pool is closed.
#[derive(Clone, Debug)]
pub struct TicketPool {
    semaphore: Arc<Semaphore>,
    total: usize,
}

/// A capacity unit checked out of a [`TicketPool`]. Returned to the pool on drop.
#[must_use = "dropping a ticket returns it to the pool immediately"]
#[derive(Debug)]
pub struct Ticket {
    _permit: OwnedSemaphorePermit,
}

impl TicketPool {
    /// Creates a pool pre-filled with `total` tickets.
    pub fn new(total: usize) -> Result<Self, Error> {
        snafu::ensure!(total > 0, ZeroCapacitySnafu);
        snafu::ensure!(
            total <= Semaphore::MAX_PERMITS,
            CapacityTooLargeSnafu {
                requested: total as u128,
                max: Semaphore::MAX_PERMITS,
            }
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(total)),
            total,
        })
    }

    /// Waits for a ticket. Returns `None` once the pool is closed, including when it is
    /// closed while this call is waiting.
    pub async fn acquire(&self) -> Option<Ticket> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| Ticket { _permit: permit })
    }

    /// Waits for a bare token. `true` means a token was taken and must later be handed back
    /// with [`put`](Self::put); `false` means the pool is closed.
    pub async fn get(&self) -> bool {
        match self.semaphore.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Returns one token taken with [`get`](Self::get).
    pub fn put(&self) {
        self.semaphore.add_permits(1);
    }

    /// Marks the pool inactive and fails every pending and future acquire. Idempotent.
    pub fn close(&self) {
        if !self.semaphore.is_closed() {
            debug!(
                message = "Closing ticket pool.",
                total = self.total,
                remainder = self.remainder(),
            );
        }
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Capacity of the pool.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Tickets currently available.
    pub fn remainder(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tickets currently checked out.
    pub fn in_use(&self) -> usize {
        self.total.saturating_sub(self.remainder())
    }
}
