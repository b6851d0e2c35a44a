use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

use serde::Serialize;

/// Lifecycle of a [`LoadGenerator`](super::LoadGenerator).
///
/// Moves strictly forward: `Origin → Starting → Started → Stopping → Stopped`.
/// `Starting` and `Stopping` mark transitions in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum Status {
    Origin = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
}

impl Status {
    /// The only legal transitions; each advances by one step.
    pub const fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Origin, Status::Starting)
                | (Status::Starting, Status::Started)
                | (Status::Started, Status::Stopping)
                | (Status::Stopping, Status::Stopped)
        )
    }

    const fn from_u8(value: u8) -> Status {
        match value {
            0 => Status::Origin,
            1 => Status::Starting,
            2 => Status::Started,
            3 => Status::Stopping,
            _ => Status::Stopped,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Origin => "origin",
            Status::Starting => "starting",
            Status::Started => "started",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomic holder for a [`Status`]. Every change is a single compare-and-swap.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(Status::Origin as u8))
    }

    pub(crate) fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from → to`. Returns `false`, leaving the state untouched, when the transition
    /// is illegal or the current state is not `from`.
    pub(crate) fn transition(&self, from: Status, to: Status) -> bool {
        if !from.can_transition_to(to) {
            error!(message = "Rejected illegal status transition.", %from, %to);
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 5] = [
        Status::Origin,
        Status::Starting,
        Status::Started,
        Status::Stopping,
        Status::Stopped,
    ];

    #[test]
    fn only_single_forward_steps_are_legal() {
        for from in ALL {
            for to in ALL {
                let expected = to as u8 == from as u8 + 1;
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn walks_the_full_lifecycle() {
        let cell = StatusCell::new();
        assert_eq!(cell.load(), Status::Origin);

        assert!(cell.transition(Status::Origin, Status::Starting));
        assert!(cell.transition(Status::Starting, Status::Started));
        assert!(cell.transition(Status::Started, Status::Stopping));
        assert!(cell.transition(Status::Stopping, Status::Stopped));
        assert_eq!(cell.load(), Status::Stopped);
    }

    #[test]
    fn stale_or_illegal_transitions_leave_state_alone() {
        let cell = StatusCell::new();
        assert!(cell.transition(Status::Origin, Status::Starting));

        // Stale expectation.
        assert!(!cell.transition(Status::Origin, Status::Starting));
        // Skips a step.
        assert!(!cell.transition(Status::Starting, Status::Stopping));
        // Backwards.
        assert!(!cell.transition(Status::Starting, Status::Origin));

        assert_eq!(cell.load(), Status::Starting);
    }

    #[test]
    fn displays_lowercase() {
        assert_eq!(Status::Stopping.to_string(), "stopping");
    }
}
