use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;

use super::process::{self, Channels, Invocation};
use super::{CanonicalSink, Evm, EvmBinary, EvmError, EvmKind, RunOutcome};

/// JSON trace options passed to `testeth`.
const JSONTRACE_OPTIONS: &str = r#"{"disableMemory":true}"#;

/// Adapter for aleth's `testeth` binary.
///
/// The trace is written to stdout, interleaved with the test runner's own
/// plain-text progress lines. Quantities are decimal strings and the
/// summary `stateRoot` lacks the `0x` prefix.
#[derive(Debug, Clone)]
pub struct AlethEvm {
    binary: EvmBinary,
}

impl AlethEvm {
    pub fn new(binary: EvmBinary) -> Self {
        Self { binary }
    }

    fn args(fixture: &Path) -> Vec<OsString> {
        vec![
            "-t".into(),
            "GeneralStateTests".into(),
            "--".into(),
            "--testfile".into(),
            fixture.as_os_str().to_owned(),
            "--jsontrace".into(),
            JSONTRACE_OPTIONS.into(),
        ]
    }
}

#[async_trait]
impl Evm for AlethEvm {
    fn name(&self) -> &str {
        self.binary.name.as_deref().unwrap_or(EvmKind::Aleth.as_str())
    }

    fn kind(&self) -> EvmKind {
        EvmKind::Aleth
    }

    async fn run_state_test(
        &self,
        fixture: &Path,
        sink: &mut CanonicalSink<'_>,
    ) -> Result<RunOutcome, EvmError> {
        let invocation = Invocation {
            binary: &self.binary,
            name: self.name(),
            args: Self::args(fixture),
            channels: Channels::Stdout,
            format: self.kind().root_format(),
        };
        process::run(invocation, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = AlethEvm::args(Path::new("statetest1.json"));
        assert_eq!(
            args,
            [
                "-t",
                "GeneralStateTests",
                "--",
                "--testfile",
                "statetest1.json",
                "--jsontrace",
                "{\"disableMemory\":true}",
            ]
            .map(OsString::from)
            .to_vec()
        );
    }
}
