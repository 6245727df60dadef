use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::canonical::{CanonSummary, RootFormat};

pub mod aleth;
pub mod error;
pub mod geth;
pub mod nethermind;
pub mod parity;
pub(crate) mod process;

pub use aleth::AlethEvm;
pub use error::EvmError;
pub use geth::GethEvm;
pub use nethermind::NethermindEvm;
pub use parity::ParityEvm;

/// Sink that receives canonical trace lines.
pub type CanonicalSink<'a> = dyn AsyncWrite + Unpin + Send + 'a;

/// Raw output channel of an interpreter, or a recorded copy of one.
pub type RawChannel<'a> = dyn AsyncBufRead + Unpin + Send + 'a;

/// Trait implemented by every supported interpreter.
///
/// Each implementation knows the command line that makes its binary print a
/// per-opcode JSON trace for a state test, which output channels carry that
/// trace, and how the binary reports the post-state root. Adding an
/// interpreter means adding an implementation; the comparator never changes.
#[async_trait]
pub trait Evm: Send + Sync {
    /// Stable identifier used in diagnostics and divergence reports.
    fn name(&self) -> &str;

    /// Interpreter family this adapter speaks.
    fn kind(&self) -> EvmKind;

    /// Run the state test at `fixture`, writing the canonical trace to
    /// `sink`.
    ///
    /// The sink always ends with exactly one terminal record, also when the
    /// interpreter fails or the deadline fires. Errors are returned only for
    /// launch, pipe and sink failures.
    async fn run_state_test(
        &self,
        fixture: &Path,
        sink: &mut CanonicalSink<'_>,
    ) -> Result<RunOutcome, EvmError>;

    /// Canonicalize one raw output channel into `sink`, terminal record
    /// included.
    async fn canonicalize(
        &self,
        sink: &mut CanonicalSink<'_>,
        raw: &mut RawChannel<'_>,
    ) -> std::io::Result<CanonSummary> {
        crate::canonical::canonicalize(self.kind().root_format(), raw, sink).await
    }

    /// Release any resources held by the adapter. Safe to call repeatedly.
    fn close(&self) {}
}

/// Location and runtime limits of an interpreter binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmBinary {
    pub path: PathBuf,
    /// Display name; defaults to the interpreter family name.
    pub name: Option<String>,
    /// Deadline after which the child process is killed.
    pub timeout: Option<Duration>,
}

impl EvmBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            timeout: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Interpreter families with a known trace dialect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EvmKind {
    /// go-ethereum `evm`: trace on stderr, bare `stateRoot` summary.
    Geth,
    /// parity/openethereum `parity-evm`: trace on stderr, root mismatch on
    /// stdout.
    Parity,
    /// aleth `testeth`: trace on stdout, bare `stateRoot` summary.
    Aleth,
    /// nethermind `nethtest`: trace on stderr, prefixed `stateRoot` summary.
    Nethermind,
}

impl EvmKind {
    pub const ALL: [EvmKind; 4] = [
        EvmKind::Geth,
        EvmKind::Parity,
        EvmKind::Aleth,
        EvmKind::Nethermind,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvmKind::Geth => "geth",
            EvmKind::Parity => "parity",
            EvmKind::Aleth => "aleth",
            EvmKind::Nethermind => "nethermind",
        }
    }

    pub fn root_format(&self) -> RootFormat {
        match self {
            EvmKind::Parity => RootFormat::MismatchMessage,
            EvmKind::Geth | EvmKind::Aleth | EvmKind::Nethermind => RootFormat::StateRootField,
        }
    }

    /// Build the adapter for this family.
    pub fn build(self, binary: EvmBinary) -> Box<dyn Evm> {
        match self {
            EvmKind::Geth => Box::new(GethEvm::new(binary)),
            EvmKind::Parity => Box::new(ParityEvm::new(binary)),
            EvmKind::Aleth => Box::new(AlethEvm::new(binary)),
            EvmKind::Nethermind => Box::new(NethermindEvm::new(binary)),
        }
    }
}

impl fmt::Display for EvmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "geth" => Ok(EvmKind::Geth),
            "parity" | "openethereum" => Ok(EvmKind::Parity),
            "aleth" | "testeth" => Ok(EvmKind::Aleth),
            "nethermind" => Ok(EvmKind::Nethermind),
            other => Err(format!("Unknown EVM kind: '{other}'")),
        }
    }
}

/// How the interpreter process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessExit {
    Success,
    /// Non-zero exit code.
    Code { code: i32 },
    /// Terminated by a signal.
    Signal { signal: i32 },
    /// Killed after the deadline elapsed.
    TimedOut,
    /// Exit status could not be interpreted on this platform.
    Unknown,
}

impl ProcessExit {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessExit::Success)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            return ProcessExit::Success;
        }
        if let Some(code) = status.code() {
            return ProcessExit::Code { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ProcessExit::Signal { signal };
            }
        }
        ProcessExit::Unknown
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessExit::Success => f.write_str("exit 0"),
            ProcessExit::Code { code } => write!(f, "exit {code}"),
            ProcessExit::Signal { signal } => write!(f, "signal {signal}"),
            ProcessExit::TimedOut => f.write_str("timed out"),
            ProcessExit::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of a completed interpreter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The exact command line that was invoked.
    pub command: String,
    pub exit: ProcessExit,
    pub summary: CanonSummary,
}

impl RunOutcome {
    /// Whether the interpreter exited cleanly.
    pub fn is_clean(&self) -> bool {
        self.exit.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("geth".parse::<EvmKind>().unwrap(), EvmKind::Geth);
        assert_eq!("TESTETH".parse::<EvmKind>().unwrap(), EvmKind::Aleth);
        assert_eq!("openethereum".parse::<EvmKind>().unwrap(), EvmKind::Parity);
        assert!("besu".parse::<EvmKind>().unwrap_err().contains("besu"));
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&EvmKind::Nethermind).unwrap();
        assert_eq!(json, "\"nethermind\"");
        let kind: EvmKind = serde_json::from_str("\"parity\"").unwrap();
        assert_eq!(kind, EvmKind::Parity);
    }

    #[test]
    fn test_build_uses_family_name_by_default() {
        for kind in EvmKind::ALL {
            let evm = kind.build(EvmBinary::new("/bin/true"));
            assert_eq!(evm.name(), kind.as_str());
            assert_eq!(evm.kind(), kind);
            evm.close();
            evm.close();
        }
        let evm = EvmKind::Geth.build(EvmBinary::new("/bin/true").with_name("geth-1.9"));
        assert_eq!(evm.name(), "geth-1.9");
    }

    #[test]
    fn test_process_exit_serialization() {
        let json = serde_json::to_string(&ProcessExit::Code { code: 3 }).unwrap();
        assert_eq!(json, r#"{"status":"code","code":3}"#);
        let json = serde_json::to_string(&ProcessExit::TimedOut).unwrap();
        assert_eq!(json, r#"{"status":"timed_out"}"#);
    }

    #[test]
    fn test_process_exit_display() {
        assert_eq!(ProcessExit::Success.to_string(), "exit 0");
        assert_eq!(ProcessExit::Signal { signal: 9 }.to_string(), "signal 9");
    }
}
