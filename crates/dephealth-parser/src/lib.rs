// SPDX-License-Identifier: MIT OR Apache-2.0
//! dephealth-parser
//!
//! Resolves connection URLs, JDBC strings, `Key=Value;` connection strings,
//! and explicit host/port pairs into endpoints. Failures are always
//! [`dephealth_core::DepHealthError::Configuration`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod params;
pub mod url;

pub use credentials::UrlParameters;
pub use params::{parse_connection_string, parse_params};
pub use url::{
    ParsedConnection, default_port, parse_jdbc, parse_url, scheme_type, scheme_uses_tls,
    split_host_port, strip_jdbc_prefix,
};
