use serde::{Deserialize, Serialize};

use crate::compare::Comparison;
use crate::evms::ProcessExit;
use crate::runner::{EvmRun, FixtureRun};

/// Longest trace line quoted verbatim in markdown output.
const MAX_QUOTED_LINE: usize = 240;

/// Per-interpreter outcome for one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub command: String,
    /// `None` when the interpreter could not be launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ProcessExit>,
    pub steps: u64,
    /// Empty when the interpreter reported no root.
    pub state_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_error: Option<String>,
    /// Non-step lines the canonicalizer could not classify.
    pub unrecognized: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_error: Option<String>,
}

impl From<&EvmRun> for RunSummary {
    fn from(run: &EvmRun) -> Self {
        match &run.result {
            Ok(outcome) => RunSummary {
                name: run.name.clone(),
                command: outcome.command.clone(),
                exit: Some(outcome.exit),
                steps: outcome.summary.steps,
                state_root: outcome.summary.state_root.clone().unwrap_or_default(),
                reported_error: outcome.summary.reported_error.clone(),
                unrecognized: outcome.summary.unrecognized,
                launch_error: None,
            },
            Err(err) => RunSummary {
                name: run.name.clone(),
                command: err.command().to_string(),
                exit: None,
                steps: 0,
                state_root: String::new(),
                reported_error: None,
                unrecognized: 0,
                launch_error: Some(err.to_string()),
            },
        }
    }
}

/// Report for one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureReport {
    pub fixture: String,
    pub runs: Vec<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

impl FixtureReport {
    pub fn diverged(&self) -> bool {
        self.comparison
            .as_ref()
            .is_some_and(|comparison| !comparison.is_equal())
    }
}

impl From<&FixtureRun> for FixtureReport {
    fn from(run: &FixtureRun) -> Self {
        FixtureReport {
            fixture: run.fixture.display().to_string(),
            runs: run.runs.iter().map(RunSummary::from).collect(),
            comparison: run.comparison.clone(),
        }
    }
}

/// Reports for every fixture of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub fixtures: Vec<FixtureReport>,
}

impl DiffReport {
    pub fn diverged(&self) -> bool {
        self.fixtures.iter().any(FixtureReport::diverged)
    }
}

pub fn to_json(report: &DiffReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn from_json(json: &str) -> serde_json::Result<DiffReport> {
    serde_json::from_str(json)
}

fn quote_line(line: Option<&str>) -> String {
    match line {
        None => "*(end of stream)*".to_string(),
        Some(line) if line.len() > MAX_QUOTED_LINE => {
            let mut end = MAX_QUOTED_LINE;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            format!("`{}…`", &line[..end])
        }
        Some(line) => format!("`{line}`"),
    }
}

pub fn to_markdown(report: &DiffReport) -> String {
    let mut md = String::new();

    let status = if report.diverged() {
        "DIVERGED"
    } else {
        "CONSENSUS"
    };
    md.push_str(&format!("## Trace Comparison: **{status}**\n\n"));

    if report.fixtures.is_empty() {
        md.push_str("No fixtures were executed.\n");
        return md;
    }

    for fixture in &report.fixtures {
        md.push_str(&format!("### `{}`\n\n", fixture.fixture));
        md.push_str("| EVM | Exit | Steps | State root | Notes |\n");
        md.push_str("|-----|------|------:|------------|-------|\n");
        for run in &fixture.runs {
            let exit = run
                .exit
                .map_or_else(|| "not started".to_string(), |exit| exit.to_string());
            let root = if run.state_root.is_empty() {
                "-"
            } else {
                run.state_root.as_str()
            };
            let notes = match (&run.launch_error, &run.reported_error) {
                (Some(err), _) => err.clone(),
                (None, Some(err)) => err.clone(),
                (None, None) if run.unrecognized > 0 => {
                    format!("{} unrecognized line(s)", run.unrecognized)
                }
                (None, None) => String::new(),
            };
            md.push_str(&format!(
                "| {} | {} | {} | `{}` | {} |\n",
                run.name, exit, run.steps, root, notes
            ));
        }
        md.push('\n');

        match &fixture.comparison {
            None => md.push_str("Fewer than two traces were produced; nothing compared.\n\n"),
            Some(Comparison::Equal { lines }) => {
                md.push_str(&format!("All traces agree ({lines} lines).\n\n"));
            }
            Some(Comparison::Diverged(divergence)) => {
                md.push_str(&format!(
                    "Divergence at line {}: {}\n\n",
                    divergence.line,
                    divergence.diverging.join(", ")
                ));
                for entry in &divergence.entries {
                    md.push_str(&format!(
                        "- **{}**: {}\n",
                        entry.name,
                        quote_line(entry.content.as_deref())
                    ));
                }
                md.push('\n');
            }
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{Divergence, StreamLine};

    fn run_summary(name: &str, root: &str) -> RunSummary {
        RunSummary {
            name: name.to_string(),
            command: format!("{name} --json statetest t.json"),
            exit: Some(ProcessExit::Success),
            steps: 4,
            state_root: root.to_string(),
            reported_error: None,
            unrecognized: 0,
            launch_error: None,
        }
    }

    fn sample_report() -> DiffReport {
        DiffReport {
            fixtures: vec![FixtureReport {
                fixture: "statetest1.json".to_string(),
                runs: vec![
                    run_summary("geth", "0xaa"),
                    run_summary("parity", "0xbb"),
                    RunSummary {
                        launch_error: Some("failed to launch `aleth`: not found".to_string()),
                        exit: None,
                        ..run_summary("aleth", "")
                    },
                ],
                comparison: Some(Comparison::Diverged(Divergence {
                    line: 4,
                    entries: vec![
                        StreamLine {
                            name: "geth".to_string(),
                            content: Some(r#"{"StateRoot":"0xaa"}"#.to_string()),
                        },
                        StreamLine {
                            name: "parity".to_string(),
                            content: None,
                        },
                    ],
                    diverging: vec!["parity".to_string()],
                })),
            }],
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let report = sample_report();
        let json = to_json(&report).expect("serialize");
        let parsed = from_json(&json).expect("deserialize");
        assert_eq!(parsed, report);
        assert!(parsed.diverged());
    }

    #[test]
    fn test_markdown_divergence() {
        let md = to_markdown(&sample_report());
        assert!(md.contains("**DIVERGED**"));
        assert!(md.contains("Divergence at line 4: parity"));
        assert!(md.contains("| aleth | not started | 4 | `-` | failed to launch"));
        assert!(md.contains("*(end of stream)*"));
    }

    #[test]
    fn test_markdown_consensus() {
        let report = DiffReport {
            fixtures: vec![FixtureReport {
                fixture: "statetest1.json".to_string(),
                runs: vec![run_summary("geth", "0xaa"), run_summary("parity", "0xaa")],
                comparison: Some(Comparison::Equal { lines: 5 }),
            }],
        };
        let md = to_markdown(&report);
        assert!(md.contains("**CONSENSUS**"));
        assert!(md.contains("All traces agree (5 lines)."));
    }

    #[test]
    fn test_markdown_empty() {
        let md = to_markdown(&DiffReport::default());
        assert!(md.contains("No fixtures were executed."));
    }

    #[test]
    fn test_long_lines_are_truncated() {
        let long = "x".repeat(MAX_QUOTED_LINE + 10);
        let quoted = quote_line(Some(&long));
        assert!(quoted.ends_with("…`"));
        assert!(quoted.len() < long.len());
    }
}
