// SPDX-License-Identifier: MIT OR Apache-2.0
//! dephealth-check
//!
//! The boundary between the scheduler and protocol-specific code: the
//! [`Probe`] trait, the [`CheckError`] failure type, the [`classify`]
//! function, and two built-in probes ([`TcpProbe`], [`HttpProbe`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod error;
pub mod http;
pub mod probe;
pub mod tcp;

pub use classify::{classify, classify_error};
pub use error::{BoxError, CheckError, GrpcCode};
pub use http::{DEFAULT_HEALTH_PATH, HTTP_USER_AGENT, HttpProbe, HttpProbeConfig};
pub use probe::Probe;
pub use tcp::TcpProbe;
