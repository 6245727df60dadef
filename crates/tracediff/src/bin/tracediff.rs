use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWrite;
use tracing::info;
use tracediff::{
    compare::{Comparison, compare_streams},
    config::TraceDiffConfig,
    evms::{EvmBinary, EvmKind},
    report::{DiffReport, FixtureReport, to_json, to_markdown},
    runner::{FixtureRun, run_fixture},
};

#[derive(Parser)]
#[command(name = "tracediff", about = "Differential trace oracle for EVM implementations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured interpreter on each fixture and compare the traces
    Run {
        /// TOML file listing the interpreters
        #[arg(long, env = "TRACEDIFF_CONFIG")]
        config: Option<PathBuf>,

        /// Path to the go-ethereum `evm` binary
        #[arg(long, env = "TRACEDIFF_GETH")]
        geth: Option<PathBuf>,

        /// Path to the parity/openethereum `parity-evm` binary
        #[arg(long, env = "TRACEDIFF_PARITY")]
        parity: Option<PathBuf>,

        /// Path to the aleth `testeth` binary
        #[arg(long, env = "TRACEDIFF_ALETH")]
        aleth: Option<PathBuf>,

        /// Path to the nethermind `nethtest` binary
        #[arg(long, env = "TRACEDIFF_NETHERMIND")]
        nethermind: Option<PathBuf>,

        /// Per-interpreter deadline in seconds
        #[arg(long, env = "TRACEDIFF_TIMEOUT")]
        timeout: Option<u64>,

        /// Directory receiving `<fixture>.<evm>.jsonl` canonical streams
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Output file path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output markdown instead of JSON
        #[arg(long)]
        markdown: bool,

        /// State test fixtures
        #[arg(required = true)]
        fixtures: Vec<PathBuf>,
    },

    /// Canonicalize a recorded raw trace
    Canon {
        /// Dialect of the recorded trace
        #[arg(long)]
        kind: EvmKind,

        /// Output file path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Raw trace file
        raw_trace: PathBuf,
    },

    /// Compare canonical trace files
    Compare {
        /// Canonical trace files, at least two
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
    },
}

fn write_output(output: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

fn write_canonical_streams(out_dir: &Path, run: &FixtureRun) -> anyhow::Result<()> {
    let stem = run
        .fixture
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fixture".to_string());
    for evm_run in &run.runs {
        if evm_run.result.is_err() {
            continue;
        }
        let path = out_dir.join(format!("{stem}.{}.jsonl", evm_run.name));
        fs::write(&path, &evm_run.canonical)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

async fn run(
    config: Option<PathBuf>,
    overrides: [(EvmKind, Option<PathBuf>); 4],
    timeout: Option<u64>,
    out_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    markdown: bool,
    fixtures: Vec<PathBuf>,
) -> anyhow::Result<bool> {
    let mut config = match &config {
        Some(path) => TraceDiffConfig::load(path)?,
        None => TraceDiffConfig::default(),
    };
    for (kind, path) in overrides
        .into_iter()
        .filter_map(|(kind, path)| path.map(|path| (kind, path)))
    {
        config.set_binary(kind, path);
    }
    if timeout.is_some() {
        config.timeout_secs = timeout;
    }
    config
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid configuration: {msg}"))?;
    if config.evms.len() < 2 {
        bail!(
            "at least two interpreters are needed, got {}; pass --config or binary paths",
            config.evms.len()
        );
    }

    if let Some(dir) = &out_dir {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let evms = config.build_evms();
    let mut report = DiffReport::default();
    for fixture in &fixtures {
        let fixture_run = run_fixture(&evms, fixture).await;
        if let Some(dir) = &out_dir {
            write_canonical_streams(dir, &fixture_run)?;
        }
        report.fixtures.push(FixtureReport::from(&fixture_run));
    }
    for evm in &evms {
        evm.close();
    }

    let rendered = if markdown {
        to_markdown(&report)
    } else {
        to_json(&report)?
    };
    write_output(output.as_deref(), &rendered)?;
    Ok(report.diverged())
}

async fn canon(kind: EvmKind, output: Option<PathBuf>, raw_trace: PathBuf) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&raw_trace)
        .await
        .with_context(|| format!("failed to open {}", raw_trace.display()))?;
    let mut raw = tokio::io::BufReader::new(file);
    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let evm = kind.build(EvmBinary::new(kind.as_str()));
    let summary = evm.canonicalize(&mut *sink, &mut raw).await?;
    evm.close();
    info!(
        kind = %kind,
        steps = summary.steps,
        unrecognized = summary.unrecognized,
        root = summary.state_root.as_deref().unwrap_or(""),
        "raw trace canonicalized"
    );
    Ok(())
}

fn compare(files: Vec<PathBuf>) -> anyhow::Result<bool> {
    let mut streams = Vec::with_capacity(files.len());
    for path in &files {
        let file =
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        streams.push((path.display().to_string(), BufReader::new(file)));
    }
    let comparison = compare_streams(streams)?;
    if let Comparison::Diverged(divergence) = &comparison {
        eprintln!(
            "Traces diverge at line {}: {}",
            divergence.line,
            divergence.diverging.join(", ")
        );
    }
    println!("{}", serde_json::to_string_pretty(&comparison)?);
    Ok(!comparison.is_equal())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let diverged = match cli.command {
        Command::Run {
            config,
            geth,
            parity,
            aleth,
            nethermind,
            timeout,
            out_dir,
            output,
            markdown,
            fixtures,
        } => {
            let overrides = [
                (EvmKind::Geth, geth),
                (EvmKind::Parity, parity),
                (EvmKind::Aleth, aleth),
                (EvmKind::Nethermind, nethermind),
            ];
            run(config, overrides, timeout, out_dir, output, markdown, fixtures).await?
        }
        Command::Canon {
            kind,
            output,
            raw_trace,
        } => {
            canon(kind, output, raw_trace).await?;
            false
        }
        Command::Compare { files } => compare(files)?,
    };

    // Exit with non-zero if any traces diverged
    if diverged {
        process::exit(1);
    }
    Ok(())
}
