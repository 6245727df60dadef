use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{info, warn};

use crate::compare::{Comparison, compare_bytes};
use crate::evms::{Evm, EvmError, RunOutcome};

/// One interpreter's run against a fixture.
#[derive(Debug)]
pub struct EvmRun {
    /// Adapter name.
    pub name: String,
    pub result: Result<RunOutcome, EvmError>,
    /// Canonical stream produced by the run. Complete (terminal record
    /// included) whenever `result` is `Ok`.
    pub canonical: Vec<u8>,
}

impl EvmRun {
    /// The command line invoked, also available for failed launches.
    pub fn command(&self) -> &str {
        match &self.result {
            Ok(outcome) => &outcome.command,
            Err(err) => err.command(),
        }
    }
}

/// All runs for one fixture plus their comparison.
#[derive(Debug)]
pub struct FixtureRun {
    pub fixture: PathBuf,
    pub runs: Vec<EvmRun>,
    /// `None` when fewer than two interpreters produced a stream.
    pub comparison: Option<Comparison>,
}

impl FixtureRun {
    pub fn diverged(&self) -> bool {
        self.comparison
            .as_ref()
            .is_some_and(|comparison| !comparison.is_equal())
    }
}

/// Run every interpreter concurrently on `fixture` and compare the canonical
/// streams of those that launched.
///
/// A failing interpreter never aborts the others; it is reported in its
/// [`EvmRun`] and left out of the comparison.
pub async fn run_fixture(evms: &[Box<dyn Evm>], fixture: &Path) -> FixtureRun {
    info!(fixture = %fixture.display(), evms = evms.len(), "running fixture");

    let runs: Vec<EvmRun> = join_all(evms.iter().map(|evm| async move {
        let mut canonical = Vec::new();
        let result = evm.run_state_test(fixture, &mut canonical).await;
        if let Err(err) = &result {
            warn!(evm = evm.name(), %err, "interpreter run failed");
        }
        EvmRun {
            name: evm.name().to_string(),
            result,
            canonical,
        }
    }))
    .await;

    let comparison = compare_runs(&runs);
    match &comparison {
        Some(Comparison::Diverged(divergence)) => warn!(
            fixture = %fixture.display(),
            line = divergence.line,
            diverging = ?divergence.diverging,
            "canonical traces diverged"
        ),
        Some(Comparison::Equal { lines }) => {
            info!(fixture = %fixture.display(), lines, "canonical traces agree")
        }
        None => warn!(
            fixture = %fixture.display(),
            "fewer than two interpreters produced a trace, nothing to compare"
        ),
    }

    FixtureRun {
        fixture: fixture.to_path_buf(),
        runs,
        comparison,
    }
}

fn compare_runs(runs: &[EvmRun]) -> Option<Comparison> {
    let streams: Vec<(&str, &[u8])> = runs
        .iter()
        .filter(|run| run.result.is_ok())
        .map(|run| (run.name.as_str(), run.canonical.as_slice()))
        .collect();
    if streams.len() < 2 {
        return None;
    }
    match compare_bytes(&streams) {
        Ok(comparison) => Some(comparison),
        Err(err) => {
            warn!(%err, "comparison failed");
            None
        }
    }
}
