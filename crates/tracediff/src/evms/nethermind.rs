use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;

use super::process::{self, Channels, Invocation};
use super::{CanonicalSink, Evm, EvmBinary, EvmError, EvmKind, RunOutcome};

/// Adapter for nethermind's `nethtest` binary.
///
/// Traces go to stderr with 32-byte zero-padded stack words; the summary
/// `stateRoot` is already `0x` prefixed. Memory is not traced unless asked
/// for, so no flag is needed to disable it.
#[derive(Debug, Clone)]
pub struct NethermindEvm {
    binary: EvmBinary,
}

impl NethermindEvm {
    pub fn new(binary: EvmBinary) -> Self {
        Self { binary }
    }

    fn args(fixture: &Path) -> Vec<OsString> {
        vec![
            "--input".into(),
            fixture.as_os_str().to_owned(),
            "--trace".into(),
        ]
    }
}

#[async_trait]
impl Evm for NethermindEvm {
    fn name(&self) -> &str {
        self.binary
            .name
            .as_deref()
            .unwrap_or(EvmKind::Nethermind.as_str())
    }

    fn kind(&self) -> EvmKind {
        EvmKind::Nethermind
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
            channels: Channels::Stderr,
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
        let args = NethermindEvm::args(Path::new("statetest1.json"));
        assert_eq!(
            args,
            ["--input", "statetest1.json", "--trace"]
                .map(OsString::from)
                .to_vec()
        );
    }
}
