//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

/// Opaque identifier of a scheduled event.
///
/// Handles are never reused within one run, so a stale handle cancels
/// nothing.
pub type TimerHandle = u64;

/// Monotonic clock provided by the hosting simulation.
pub trait Clock {
    /// Current simulation time, measured from the start of the run.
    fn now(&self) -> Duration;
}

/// Event scheduler provided by the hosting simulation.
///
/// All protocol work runs on the host's single logical event loop: the
/// engine never blocks, it only asks for a message to be delivered back
/// to it after `delay`. Scheduling and cancelling are the only
/// concurrency primitives the engine uses.
pub trait Scheduler<M>: Clock {
    /// Schedule `msg` to be delivered back to the instance after `delay`.
    fn schedule(&self, delay: Duration, msg: M) -> TimerHandle;

    /// Cancel a previously scheduled event. Cancelling an event that has
    /// already fired is a no-op.
    fn cancel(&self, handle: TimerHandle);
}
