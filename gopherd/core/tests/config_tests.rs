// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The sample configuration shipped at the workspace root must load and
//! validate, and must agree with the built-in defaults.

use gopherd_core::server_config::{ServerConfig, ServerType};

const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../gopherd.yaml");

#[test]
fn test_sample_config_validates() {
    let config = ServerConfig::from_yaml_file(SAMPLE).unwrap();
    config.validate().unwrap();
    assert_eq!(config.pygopherd.servertype, ServerType::Threading);
    assert!(config.pygopherd.tls.is_none());
}

#[test]
fn test_sample_config_matches_defaults() {
    let sample = ServerConfig::from_yaml_file(SAMPLE).unwrap();
    let defaults = ServerConfig::default();
    assert_eq!(sample.handlers.order, defaults.handlers.order);
    assert_eq!(sample.protocols.order, defaults.protocols.order);
    assert_eq!(sample.protocols.http.iconmapping, defaults.protocols.http.iconmapping);
    assert_eq!(sample.handlers.dir.ignorepatt, defaults.handlers.dir.ignorepatt);
    assert_eq!(sample.entry.eaexts, defaults.entry.eaexts);
}

#[test]
fn test_unknown_protocol_rejected() {
    let config = ServerConfig::from_yaml_str("protocols:\n  order: [FingerProtocol]\n").unwrap();
    assert!(config.validate().is_err());
}
