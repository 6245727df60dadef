use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;

use super::process::{self, Channels, Invocation};
use super::{CanonicalSink, Evm, EvmBinary, EvmError, EvmKind, RunOutcome};

/// Adapter for parity's `parity-evm` binary.
///
/// Steps are printed on stderr. When the post-state root does not match the
/// fixture, the computed root only appears inside an error message on
/// stdout, e.g.
/// `{"error":"State root mismatch (got: 0x.., expected: 0x..)","gasUsed":"0x2dc6c0","time":146}`.
/// Both channels are drained concurrently; stdout content lands after the
/// stderr trace in the canonical stream.
#[derive(Debug, Clone)]
pub struct ParityEvm {
    binary: EvmBinary,
}

impl ParityEvm {
    pub fn new(binary: EvmBinary) -> Self {
        Self { binary }
    }

    fn args(fixture: &Path) -> Vec<OsString> {
        vec![
            "--std-json".into(),
            "state-test".into(),
            fixture.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Evm for ParityEvm {
    fn name(&self) -> &str {
        self.binary.name.as_deref().unwrap_or(EvmKind::Parity.as_str())
    }

    fn kind(&self) -> EvmKind {
        EvmKind::Parity
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
            channels: Channels::StderrThenStdout,
            format: self.kind().root_format(),
        };
        process::run(invocation, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::RootFormat;

    #[test]
    fn test_args() {
        let args = ParityEvm::args(Path::new("statetest1.json"));
        assert_eq!(
            args,
            ["--std-json", "state-test", "statetest1.json"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn test_uses_mismatch_root_format() {
        let evm = ParityEvm::new(EvmBinary::new("parity-evm"));
        assert_eq!(evm.kind().root_format(), RootFormat::MismatchMessage);
    }
}
