// SPDX-License-Identifier: MIT OR Apache-2.0
//! dephealth-scheduler
//!
//! Runs the periodic checks. Each registered endpoint gets an
//! [`EndpointState`] and its own check loop on the Tokio runtime; a loop
//! never overlaps with itself, so checks of one endpoint are serialized.
//! Results pass through the classifier, the hysteresis state machine, and
//! then the metrics exporter, in that order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
mod pool;
pub mod scheduler;
pub mod state;

pub use cancel::{CancelReason, CancellationToken};
pub use scheduler::{STOP_GRACE_PERIOD, Scheduler};
pub use state::{EndpointState, HealthState, ScheduleHandle, Transition};
