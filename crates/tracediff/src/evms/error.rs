/// Error type for interpreter runs.
///
/// Only process plumbing fails a run. Trace content problems are tolerated
/// by the canonicalizer, and a failing interpreter exit is reported through
/// [`ProcessExit`](super::ProcessExit). Every variant carries the command
/// line that was (or would have been) invoked.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to attach {channel} pipe for `{command}`")]
    Pipe {
        command: String,
        channel: &'static str,
    },

    #[error("failed to write canonical output for `{command}`: {source}")]
    Sink {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl EvmError {
    pub fn launch(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            command: command.into(),
            source,
        }
    }

    pub fn pipe(command: impl Into<String>, channel: &'static str) -> Self {
        Self::Pipe {
            command: command.into(),
            channel,
        }
    }

    pub fn sink(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Sink {
            command: command.into(),
            source,
        }
    }

    pub fn wait(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Wait {
            command: command.into(),
            source,
        }
    }

    /// The command line this error belongs to.
    pub fn command(&self) -> &str {
        match self {
            EvmError::Launch { command, .. }
            | EvmError::Pipe { command, .. }
            | EvmError::Sink { command, .. }
            | EvmError::Wait { command, .. } => command,
        }
    }
}
