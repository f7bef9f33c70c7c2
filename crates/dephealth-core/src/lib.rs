// SPDX-License-Identifier: MIT OR Apache-2.0
//! dephealth-core
//!
//! Value types and validation rules shared by the dephealth crates: the
//! dependency model ([`Dependency`], [`Endpoint`], [`CheckConfig`]), outcome
//! categories ([`StatusCategory`], [`CheckResult`]), the read snapshot
//! ([`EndpointStatus`]), and the error taxonomy ([`DepHealthError`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dependency;
pub mod endpoint;
pub mod error;
pub mod status;
pub mod types;

pub use config::{CheckConfig, CheckConfigBuilder};
pub use dependency::{Dependency, DependencyBuilder};
pub use endpoint::{
    Endpoint, RESERVED_LABELS, endpoint_key, validate_label_name, validate_labels, validate_name,
    validate_port,
};
pub use error::{DepHealthError, ErrorKind, Result};
pub use status::{CheckResult, EndpointIdentity, EndpointStatus, StatusCategory};
pub use types::DependencyType;
