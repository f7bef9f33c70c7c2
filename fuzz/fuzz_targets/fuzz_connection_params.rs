// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz connection-string and explicit host/port parsing.
//!
//! Uses structured input so host and port vary independently:
//! 1. `parse_params` never panics and only accepts valid ports.
//! 2. `parse_connection_string` never panics; a returned host is non-empty.
#![no_main]
use arbitrary::Arbitrary;
use dephealth_core::validate_port;
use dephealth_parser::{parse_connection_string, parse_params};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    host: String,
    port: String,
    connection_string: String,
}

fuzz_target!(|input: Input| {
    if let Ok(ep) = parse_params(&input.host, &input.port) {
        assert!(!ep.host().is_empty());
        assert!(validate_port(ep.port()).is_ok());
    }

    if let Ok((host, _port)) = parse_connection_string(&input.connection_string) {
        assert!(!host.is_empty());
    }
});
