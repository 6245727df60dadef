//! N-way comparison of canonical streams.

use std::io::BufRead;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("at least two streams are needed for a comparison, got {0}")]
    NotEnoughStreams(usize),

    #[error("failed to read canonical stream `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// One stream's line at the divergence point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLine {
    pub name: String,
    /// `None` when the stream already ended. Invalid UTF-8 is replaced
    /// lossily.
    pub content: Option<String>,
}

/// First point at which the streams disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Zero-based line index.
    pub line: usize,
    /// Every stream's line at `line`, in input order.
    pub entries: Vec<StreamLine>,
    /// Streams outside the largest group of agreeing streams.
    pub diverging: Vec<String>,
}

/// Outcome of comparing canonical streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Comparison {
    /// All streams are line-identical, terminal record included.
    Equal { lines: usize },
    Diverged(Divergence),
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal { .. })
    }

    pub fn divergence(&self) -> Option<&Divergence> {
        match self {
            Comparison::Equal { .. } => None,
            Comparison::Diverged(divergence) => Some(divergence),
        }
    }
}

/// Compare named canonical streams line by line.
///
/// Lines are compared as raw bytes, so a trailing `\r` or invalid UTF-8 is a
/// difference like any other. Streams of different length are unequal; the
/// divergence then sits at the first index where some stream has ended and
/// another has not.
pub fn compare_streams<R: BufRead>(streams: Vec<(String, R)>) -> Result<Comparison, CompareError> {
    if streams.len() < 2 {
        return Err(CompareError::NotEnoughStreams(streams.len()));
    }
    let (names, readers): (Vec<String>, Vec<R>) = streams.into_iter().unzip();
    let mut readers: Vec<_> = readers.into_iter().map(|r| r.split(b'\n')).collect();

    let mut index = 0;
    loop {
        let mut current = Vec::with_capacity(readers.len());
        for (name, lines) in names.iter().zip(readers.iter_mut()) {
            let line = lines
                .next()
                .transpose()
                .map_err(|source| CompareError::Io {
                    name: name.clone(),
                    source,
                })?;
            current.push(line);
        }

        if current.iter().all(Option::is_none) {
            return Ok(Comparison::Equal { lines: index });
        }
        if current.iter().all(|line| *line == current[0]) {
            index += 1;
            continue;
        }

        let diverging = diverging_streams(&names, &current);
        let entries = names
            .into_iter()
            .zip(current)
            .map(|(name, content)| StreamLine {
                name,
                content: content.map(|line| String::from_utf8_lossy(&line).into_owned()),
            })
            .collect();
        return Ok(Comparison::Diverged(Divergence {
            line: index,
            entries,
            diverging,
        }));
    }
}

/// Compare in-memory canonical streams.
pub fn compare_bytes(streams: &[(&str, &[u8])]) -> Result<Comparison, CompareError> {
    compare_streams(
        streams
            .iter()
            .map(|(name, bytes)| (name.to_string(), *bytes))
            .collect(),
    )
}

/// Names of the streams outside the largest agreeing group. Ties go to the
/// group that contains the earliest stream.
fn diverging_streams(names: &[String], lines: &[Option<Vec<u8>>]) -> Vec<String> {
    let mut groups: Vec<(&Option<Vec<u8>>, Vec<usize>)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        match groups.iter().position(|(content, _)| *content == line) {
            Some(group) => groups[group].1.push(i),
            None => groups.push((line, vec![i])),
        }
    }

    let mut reference = 0;
    for (i, (_, members)) in groups.iter().enumerate() {
        if members.len() > groups[reference].1.len() {
            reference = i;
        }
    }

    groups
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != reference)
        .flat_map(|(_, (_, members))| members.iter().map(|&m| names[m].clone()))
        .collect()
}
