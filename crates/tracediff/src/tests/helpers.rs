//! Shared helpers for the recorded-trace and scripted-interpreter tests.
//!
//! `testdata/statetest1_*.jsonl` hold the raw output of each interpreter
//! family for the same execution:
//! `PUSH1 1, PUSH1 2, ADD, PUSH1 0, SSTORE, STOP`.

use std::path::{Path, PathBuf};

use crate::canonical::CanonSummary;
use crate::evms::{EvmBinary, EvmKind};

pub const EXPECTED_CANONICAL: &str = "statetest1.canonical.jsonl";

pub const RECORDED: [(EvmKind, &str); 4] = [
    (EvmKind::Geth, "statetest1_geth.jsonl"),
    (EvmKind::Parity, "statetest1_parity.jsonl"),
    (EvmKind::Aleth, "statetest1_aleth.jsonl"),
    (EvmKind::Nethermind, "statetest1_nethermind.jsonl"),
];

pub fn testdata(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
}

pub fn read_testdata(name: &str) -> Vec<u8> {
    std::fs::read(testdata(name)).expect("read testdata")
}

pub fn expected_canonical() -> Vec<u8> {
    read_testdata(EXPECTED_CANONICAL)
}

pub fn lines(canonical: &[u8]) -> Vec<String> {
    String::from_utf8(canonical.to_vec())
        .expect("canonical output is utf8")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Canonicalize a raw trace through the adapter of `kind`.
pub async fn canonicalize_raw(kind: EvmKind, raw: &[u8]) -> (Vec<u8>, CanonSummary) {
    let evm = kind.build(EvmBinary::new(kind.as_str()));
    let mut raw = raw;
    let mut out = Vec::new();
    let summary = evm
        .canonicalize(&mut out, &mut raw)
        .await
        .expect("in-memory canonicalization");
    (out, summary)
}

/// Write an executable `/bin/sh` script standing in for an interpreter.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// Shell-quoted path of a testdata file.
#[cfg(unix)]
pub fn quoted_testdata(name: &str) -> String {
    format!("'{}'", testdata(name).display())
}
