#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for Scantyx Live.
//!
//! These tests parse `Cargo.toml` and verify that lint levels, features and
//! declared demo targets match project policy. If any test fails, the manifest
//! has drifted from the agreed-upon standards.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn manifest() -> toml::Table {
    let path = project_root().join("Cargo.toml");
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str::<toml::Table>(&contents).unwrap_or_else(|e| panic!("Cargo.toml is not valid TOML: {e}"))
}

fn table<'a>(value: &'a toml::Table, key: &str) -> &'a toml::Table {
    value
        .get(key)
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing [{key}]"))
}

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn all_panic_prone_lints_are_denied() {
        let manifest = manifest();
        let clippy = table(table(&manifest, "lints"), "clippy");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "[lints.clippy] must set `{lint} = \"deny\"` to keep library \
                 code panic-free."
            );
        }
    }
}

mod feature_policy {
    use super::*;

    #[test]
    fn websocket_transport_is_default() {
        let manifest = manifest();
        let features = table(&manifest, "features");
        let default = features
            .get("default")
            .and_then(toml::Value::as_array)
            .expect("features.default must be an array");
        assert!(
            default
                .iter()
                .any(|f| f.as_str() == Some("transport-websocket")),
            "the WebSocket transport must be enabled by default"
        );
    }

    #[test]
    fn tokio_test_util_available_for_paused_clock_tests() {
        let manifest = manifest();
        let tokio = table(table(&manifest, "dev-dependencies"), "tokio");
        let features = tokio
            .get("features")
            .and_then(toml::Value::as_array)
            .expect("dev tokio must list features");
        assert!(
            features.iter().any(|f| f.as_str() == Some("test-util")),
            "dev-dependency tokio needs `test-util` for start_paused tests"
        );
    }

    #[test]
    fn msrv_is_declared() {
        let manifest = manifest();
        let package = table(&manifest, "package");
        assert!(
            package
                .get("rust-version")
                .and_then(toml::Value::as_str)
                .is_some(),
            "Cargo.toml must declare a rust-version"
        );
    }
}

mod demo_policy {
    use super::*;

    #[test]
    fn declared_demo_sources_exist() {
        let manifest = manifest();
        let examples = manifest
            .get("example")
            .and_then(toml::Value::as_array)
            .expect("Cargo.toml must declare [[example]] targets");

        for example in examples {
            let path = example
                .get("path")
                .and_then(toml::Value::as_str)
                .expect("every [[example]] must set an explicit path");
            assert!(
                path.starts_with("demos/"),
                "demo '{path}' must live under demos/"
            );
            assert!(
                project_root().join(path).is_file(),
                "demo source '{path}' is missing"
            );
        }
    }
}
