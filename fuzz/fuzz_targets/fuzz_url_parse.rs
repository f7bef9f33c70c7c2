// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz connection URL and JDBC parsing.
//!
//! Feeds arbitrary strings through `parse_url` and `parse_jdbc`, verifying:
//! 1. Neither parser panics on arbitrary input.
//! 2. Every returned endpoint has a non-empty host and a port in 1..=65535.
//! 3. Hosts never keep IPv6 brackets.
//! 4. Credential extraction never panics for any dependency type.
#![no_main]
use dephealth_core::{DependencyType, validate_port};
use dephealth_parser::{UrlParameters, parse_jdbc, parse_url};
use libfuzzer_sys::fuzz_target;

const TYPES: &[DependencyType] = &[
    DependencyType::Postgres,
    DependencyType::Mysql,
    DependencyType::Redis,
    DependencyType::Amqp,
    DependencyType::Http,
];

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    for parsed in [parse_url(s), parse_jdbc(s)] {
        let Ok(conns) = parsed else {
            continue;
        };
        assert!(!conns.is_empty(), "success must yield at least one endpoint");
        for conn in conns {
            assert!(!conn.host.is_empty());
            assert!(!conn.host.starts_with('['), "brackets must be stripped");
            assert!(validate_port(&conn.port).is_ok(), "port {:?}", conn.port);
        }
    }

    for t in TYPES {
        let _ = UrlParameters::from_url(s, *t);
    }
});
