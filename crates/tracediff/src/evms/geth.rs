use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;

use super::process::{self, Channels, Invocation};
use super::{CanonicalSink, Evm, EvmBinary, EvmError, EvmKind, RunOutcome};

/// Adapter for go-ethereum's `evm` binary.
///
/// Traces go to stderr. The closing summary is a bare
/// `{"stateRoot": "<hex>"}` without `0x` prefix.
#[derive(Debug, Clone)]
pub struct GethEvm {
    binary: EvmBinary,
}

impl GethEvm {
    pub fn new(binary: EvmBinary) -> Self {
        Self { binary }
    }

    fn args(fixture: &Path) -> Vec<OsString> {
        vec![
            "--json".into(),
            "--nomemory".into(),
            "statetest".into(),
            fixture.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Evm for GethEvm {
    fn name(&self) -> &str {
        self.binary.name.as_deref().unwrap_or(EvmKind::Geth.as_str())
    }

    fn kind(&self) -> EvmKind {
        EvmKind::Geth
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
