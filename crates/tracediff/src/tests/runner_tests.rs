//! Oracle runner tests: several scripted interpreters on one fixture.

use std::path::Path;

use serial_test::serial;
use tempfile::TempDir;

use crate::compare::Comparison;
use crate::config::{EvmEntry, TraceDiffConfig};
use crate::evms::EvmKind;
use crate::report::{DiffReport, FixtureReport, to_markdown};
use crate::runner::run_fixture;

use super::helpers::{quoted_testdata, write_script};

const FIXTURE: &str = "/tmp/statetest1.json";

/// Scripts replaying every recorded dialect on its native channels.
fn replaying_config(dir: &Path) -> TraceDiffConfig {
    let scripts = [
        (
            EvmKind::Geth,
            format!("cat {} >&2", quoted_testdata("statetest1_geth.jsonl")),
        ),
        (
            EvmKind::Parity,
            format!(
                "head -n 6 {0} >&2\ntail -n 1 {0}",
                quoted_testdata("statetest1_parity.jsonl")
            ),
        ),
        (
            EvmKind::Aleth,
            format!("cat {}", quoted_testdata("statetest1_aleth.jsonl")),
        ),
        (
            EvmKind::Nethermind,
            format!("cat {} >&2", quoted_testdata("statetest1_nethermind.jsonl")),
        ),
    ];
    TraceDiffConfig {
        timeout_secs: Some(30),
        evms: scripts
            .into_iter()
            .map(|(kind, body)| EvmEntry::new(kind, write_script(dir, kind.as_str(), &body)))
            .collect(),
    }
}

#[tokio::test]
#[serial]
async fn test_all_interpreters_agree() {
    let dir = TempDir::new().unwrap();
    let config = replaying_config(dir.path());
    config.validate().unwrap();
    let evms = config.build_evms();

    let run = run_fixture(&evms, Path::new(FIXTURE)).await;

    assert_eq!(run.runs.len(), 4);
    assert!(run.runs.iter().all(|r| r.result.is_ok()));
    assert_eq!(run.comparison, Some(Comparison::Equal { lines: 6 }));
    assert!(!run.diverged());
}

#[tokio::test]
#[serial]
async fn test_divergence_and_launch_failure_are_reported() {
    let dir = TempDir::new().unwrap();
    let mut config = replaying_config(dir.path());
    // Nethermind computes ADD(1, 5) instead of ADD(1, 2).
    let two = format!("{:064x}", 2);
    let five = format!("{:064x}", 5);
    config.evms[3].path = write_script(
        dir.path(),
        "nethtest-buggy",
        &format!(
            "sed 's/{two}/{five}/' {} >&2",
            quoted_testdata("statetest1_nethermind.jsonl")
        ),
    );
    config.evms[1].path = "/nonexistent/tracediff/parity-evm".into();
    let evms = config.build_evms();

    let run = run_fixture(&evms, Path::new(FIXTURE)).await;

    assert!(run.diverged());
    assert!(run.runs[1].result.is_err());
    assert_eq!(
        run.runs[1].command(),
        "/nonexistent/tracediff/parity-evm --std-json state-test /tmp/statetest1.json"
    );
    let divergence = run
        .comparison
        .as_ref()
        .and_then(Comparison::divergence)
        .expect("divergence");
    assert_eq!(divergence.line, 2);
    assert_eq!(divergence.diverging, vec!["nethermind".to_string()]);
    // Only launched interpreters take part.
    assert_eq!(divergence.entries.len(), 3);

    let report = DiffReport {
        fixtures: vec![FixtureReport::from(&run)],
    };
    assert!(report.diverged());
    let parity = &report.fixtures[0].runs[1];
    assert_eq!(parity.exit, None);
    assert!(parity.launch_error.is_some());
    let md = to_markdown(&report);
    assert!(md.contains("Divergence at line 2: nethermind"));
}
