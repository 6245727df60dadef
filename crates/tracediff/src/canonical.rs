//! Streaming canonicalization of raw interpreter traces.
//!
//! A [`Canonicalizer`] is fed one raw line at a time and yields the canonical
//! [`StepEvent`] for that line, if any. Lines that are not genuine opcode
//! steps are routed to state-root extraction, following the dialect's
//! [`RootFormat`]. A fresh canonicalizer must be used for every run.

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::schema::{
    OP_STOP, RawStep, STATE_ROOT_LEN, StepEvent, TerminalRecord, parse_quantity,
};

/// Message prefix under which parity-style interpreters report the computed
/// state root.
pub const ROOT_MISMATCH_PREFIX: &str = "State root mismatch (got: ";

/// Keys that identify a JSON object as an interpreter summary rather than
/// unknown output.
const SUMMARY_KEYS: [&str; 7] = [
    "stateRoot",
    "StateRoot",
    "error",
    "output",
    "gasUsed",
    "pass",
    "time",
];

/// How a dialect reports the post-state root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFormat {
    /// A `stateRoot` field, with or without `0x` prefix.
    StateRootField,
    /// The computed root embedded in a `State root mismatch (got: ...)` error
    /// message. A plain `stateRoot` field is accepted as well, which is what
    /// these interpreters print when the root matches.
    MismatchMessage,
}

/// What a canonicalization pass saw, besides the records it wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonSummary {
    /// Steps written to the canonical stream.
    pub steps: u64,
    /// Genuine `STOP` steps that were dropped.
    pub stops_dropped: u64,
    /// Lines that were not JSON objects.
    pub malformed: u64,
    /// Non-step JSON objects recognized as interpreter summaries.
    pub summaries: u64,
    /// Non-step JSON objects of a shape the dialect does not know.
    pub unrecognized: u64,
    /// First non-empty `error` text reported in a summary line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_error: Option<String>,
    /// Normalized state root, if one was extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_root: Option<String>,
}

/// Single-pass, single-writer trace normalizer.
#[derive(Debug)]
pub struct Canonicalizer {
    format: RootFormat,
    summary: CanonSummary,
}

impl Canonicalizer {
    pub fn new(format: RootFormat) -> Self {
        Self {
            format,
            summary: CanonSummary::default(),
        }
    }

    pub fn format(&self) -> RootFormat {
        self.format
    }

    /// Feed one raw line. Returns the canonical step to emit, if any.
    pub fn process_line(&mut self, line: &[u8]) -> Option<StepEvent> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }

        // Depth is never zero for a real opcode, so a parse failure or a
        // zero/missing depth routes the line to root extraction.
        let step = serde_json::from_slice::<RawStep>(line)
            .ok()
            .and_then(RawStep::into_step);
        match step {
            Some(step) if step.op == OP_STOP => {
                self.summary.stops_dropped += 1;
                None
            }
            Some(step) => {
                self.summary.steps += 1;
                Some(step)
            }
            None => {
                self.absorb_non_step(line);
                None
            }
        }
    }

    /// The root captured so far.
    pub fn state_root(&self) -> Option<&str> {
        self.summary.state_root.as_deref()
    }

    /// Close the stream, yielding the terminal record and the pass summary.
    pub fn finish(self) -> (TerminalRecord, CanonSummary) {
        (
            TerminalRecord::new(self.summary.state_root.clone()),
            self.summary,
        )
    }

    fn absorb_non_step(&mut self, line: &[u8]) {
        let fields = match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(fields)) => fields,
            _ => {
                self.summary.malformed += 1;
                debug!(line = %String::from_utf8_lossy(line), "skipping malformed trace line");
                return;
            }
        };

        // A step-shaped object that failed the typed parse is not a summary,
        // even though steps carry an `error` key.
        if looks_like_step(&fields) {
            self.summary.unrecognized += 1;
            warn!(
                line = %String::from_utf8_lossy(line),
                "step line could not be parsed, skipping"
            );
            return;
        }

        if !SUMMARY_KEYS.iter().any(|key| fields.contains_key(*key)) {
            self.summary.unrecognized += 1;
            warn!(
                line = %String::from_utf8_lossy(line),
                "unrecognized non-step trace line"
            );
            return;
        }
        self.summary.summaries += 1;

        if self.summary.reported_error.is_none() {
            if let Some(error) = fields.get("error").and_then(Value::as_str) {
                if !error.is_empty() {
                    self.summary.reported_error = Some(error.to_string());
                }
            }
        }

        // First successful extraction wins.
        if self.summary.state_root.is_some() {
            return;
        }
        match extract_root(self.format, &fields) {
            Some(root) => self.summary.state_root = Some(root),
            None if has_root_field(&fields) => {
                self.summary.unrecognized += 1;
                warn!(
                    line = %String::from_utf8_lossy(line),
                    "summary line carries a state root that could not be parsed"
                );
            }
            None => {}
        }
    }
}

fn looks_like_step(fields: &Map<String, Value>) -> bool {
    let depth = match fields.get("depth") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => parse_quantity(s).ok(),
        _ => None,
    };
    depth.is_some_and(|depth| depth >= 1)
}

fn has_root_field(fields: &Map<String, Value>) -> bool {
    fields.contains_key("stateRoot") || fields.contains_key("StateRoot")
}

fn root_field(fields: &Map<String, Value>) -> Option<&str> {
    fields
        .get("stateRoot")
        .or_else(|| fields.get("StateRoot"))
        .and_then(Value::as_str)
}

/// Apply the dialect's root-extraction rule to a summary object.
pub fn extract_root(format: RootFormat, fields: &Map<String, Value>) -> Option<String> {
    match format {
        RootFormat::StateRootField => root_field(fields).and_then(normalize_root),
        RootFormat::MismatchMessage => fields
            .get("error")
            .and_then(Value::as_str)
            .and_then(root_from_mismatch)
            .or_else(|| root_field(fields).and_then(normalize_root)),
    }
}

/// Pull the computed root out of a `State root mismatch (got: 0x.., expected:
/// 0x..)` message.
pub fn root_from_mismatch(message: &str) -> Option<String> {
    let rest = message.strip_prefix(ROOT_MISMATCH_PREFIX)?;
    let root = rest.get(..STATE_ROOT_LEN)?;
    if !root.starts_with("0x") && !root.starts_with("0X") {
        return None;
    }
    normalize_root(root)
}

/// Lowercase a root and give it a `0x` prefix. Anything that is not 32 bytes
/// of hex is rejected.
pub fn normalize_root(root: &str) -> Option<String> {
    let root = root.trim();
    let digits = root
        .strip_prefix("0x")
        .or_else(|| root.strip_prefix("0X"))
        .unwrap_or(root);
    if digits.len() != STATE_ROOT_LEN - 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Write one record as a line of canonical JSON.
pub async fn write_record<W, T>(sink: &mut W, record: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let mut line = serde_json::to_vec(record).map_err(std::io::Error::other)?;
    line.push(b'\n');
    sink.write_all(&line).await
}

/// Feed already-read raw lines through the canonicalizer.
pub async fn canonicalize_lines<W>(
    canon: &mut Canonicalizer,
    lines: impl IntoIterator<Item = Vec<u8>>,
    sink: &mut W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    for line in lines {
        if let Some(step) = canon.process_line(&line) {
            write_record(sink, &step).await?;
        }
    }
    Ok(())
}

/// Drain one raw channel through the canonicalizer, writing steps to `sink`.
///
/// Read errors end the channel with a warning; only sink errors are
/// returned.
pub async fn canonicalize_stream<R, W>(
    canon: &mut Canonicalizer,
    raw: R,
    sink: &mut W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut lines = raw.split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => {
                if let Some(step) = canon.process_line(&line) {
                    write_record(sink, &step).await?;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "trace channel read failed, treating as end of stream");
                break;
            }
        }
    }
    Ok(())
}

/// Append the terminal record and flush.
pub async fn finish_stream<W>(canon: Canonicalizer, sink: &mut W) -> std::io::Result<CanonSummary>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let (terminal, summary) = canon.finish();
    write_record(sink, &terminal).await?;
    sink.flush().await?;
    Ok(summary)
}

/// Canonicalize a whole raw channel, terminal record included.
pub async fn canonicalize<R, W>(
    format: RootFormat,
    raw: R,
    sink: &mut W,
) -> std::io::Result<CanonSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut canon = Canonicalizer::new(format);
    canonicalize_stream(&mut canon, raw, sink).await?;
    finish_stream(canon, sink).await
}
