//! Opcode byte to mnemonic table.
//!
//! Canonical `opName` is derived from the opcode byte rather than copied from
//! the raw trace, since interpreters disagree on spellings (`SHA3` versus
//! `KECCAK256`, `DIFFICULTY` versus `PREVRANDAO`).

use std::borrow::Cow;

const PUSH: [&str; 32] = [
    "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9", "PUSH10",
    "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17", "PUSH18", "PUSH19",
    "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25", "PUSH26", "PUSH27", "PUSH28",
    "PUSH29", "PUSH30", "PUSH31", "PUSH32",
];

const DUP: [&str; 16] = [
    "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10", "DUP11",
    "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
];

const SWAP: [&str; 16] = [
    "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9", "SWAP10",
    "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
];

const LOG: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];

// Manual lookup table, same layout as the interpreter's decode table.
const OPCODE_NAMES: [Option<&str>; 256] = const {
    let mut table: [Option<&str>; 256] = [None; 256];
    table[0x00] = Some("STOP");
    table[0x01] = Some("ADD");
    table[0x02] = Some("MUL");
    table[0x03] = Some("SUB");
    table[0x04] = Some("DIV");
    table[0x05] = Some("SDIV");
    table[0x06] = Some("MOD");
    table[0x07] = Some("SMOD");
    table[0x08] = Some("ADDMOD");
    table[0x09] = Some("MULMOD");
    table[0x0A] = Some("EXP");
    table[0x0B] = Some("SIGNEXTEND");
    table[0x10] = Some("LT");
    table[0x11] = Some("GT");
    table[0x12] = Some("SLT");
    table[0x13] = Some("SGT");
    table[0x14] = Some("EQ");
    table[0x15] = Some("ISZERO");
    table[0x16] = Some("AND");
    table[0x17] = Some("OR");
    table[0x18] = Some("XOR");
    table[0x19] = Some("NOT");
    table[0x1A] = Some("BYTE");
    table[0x1B] = Some("SHL");
    table[0x1C] = Some("SHR");
    table[0x1D] = Some("SAR");
    table[0x1E] = Some("CLZ");
    table[0x20] = Some("KECCAK256");
    table[0x30] = Some("ADDRESS");
    table[0x31] = Some("BALANCE");
    table[0x32] = Some("ORIGIN");
    table[0x33] = Some("CALLER");
    table[0x34] = Some("CALLVALUE");
    table[0x35] = Some("CALLDATALOAD");
    table[0x36] = Some("CALLDATASIZE");
    table[0x37] = Some("CALLDATACOPY");
    table[0x38] = Some("CODESIZE");
    table[0x39] = Some("CODECOPY");
    table[0x3A] = Some("GASPRICE");
    table[0x3B] = Some("EXTCODESIZE");
    table[0x3C] = Some("EXTCODECOPY");
    table[0x3D] = Some("RETURNDATASIZE");
    table[0x3E] = Some("RETURNDATACOPY");
    table[0x3F] = Some("EXTCODEHASH");
    table[0x40] = Some("BLOCKHASH");
    table[0x41] = Some("COINBASE");
    table[0x42] = Some("TIMESTAMP");
    table[0x43] = Some("NUMBER");
    table[0x44] = Some("PREVRANDAO");
    table[0x45] = Some("GASLIMIT");
    table[0x46] = Some("CHAINID");
    table[0x47] = Some("SELFBALANCE");
    table[0x48] = Some("BASEFEE");
    table[0x49] = Some("BLOBHASH");
    table[0x4A] = Some("BLOBBASEFEE");
    table[0x50] = Some("POP");
    table[0x51] = Some("MLOAD");
    table[0x52] = Some("MSTORE");
    table[0x53] = Some("MSTORE8");
    table[0x54] = Some("SLOAD");
    table[0x55] = Some("SSTORE");
    table[0x56] = Some("JUMP");
    table[0x57] = Some("JUMPI");
    table[0x58] = Some("PC");
    table[0x59] = Some("MSIZE");
    table[0x5A] = Some("GAS");
    table[0x5B] = Some("JUMPDEST");
    table[0x5C] = Some("TLOAD");
    table[0x5D] = Some("TSTORE");
    table[0x5E] = Some("MCOPY");
    table[0x5F] = Some("PUSH0");

    let mut i = 0;
    while i < PUSH.len() {
        table[0x60 + i] = Some(PUSH[i]);
        i += 1;
    }
    let mut i = 0;
    while i < DUP.len() {
        table[0x80 + i] = Some(DUP[i]);
        i += 1;
    }
    let mut i = 0;
    while i < SWAP.len() {
        table[0x90 + i] = Some(SWAP[i]);
        i += 1;
    }
    let mut i = 0;
    while i < LOG.len() {
        table[0xA0 + i] = Some(LOG[i]);
        i += 1;
    }

    table[0xF0] = Some("CREATE");
    table[0xF1] = Some("CALL");
    table[0xF2] = Some("CALLCODE");
    table[0xF3] = Some("RETURN");
    table[0xF4] = Some("DELEGATECALL");
    table[0xF5] = Some("CREATE2");
    table[0xFA] = Some("STATICCALL");
    table[0xFD] = Some("REVERT");
    table[0xFE] = Some("INVALID");
    table[0xFF] = Some("SELFDESTRUCT");
    table
};

/// Mnemonic for an opcode byte. Unassigned bytes render as
/// `opcode 0x.. not defined`.
pub fn name(op: u8) -> Cow<'static, str> {
    match OPCODE_NAMES[usize::from(op)] {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(format!("opcode {op:#x} not defined")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert_eq!(name(0x60), "PUSH1");
        assert_eq!(name(0x7F), "PUSH32");
        assert_eq!(name(0x80), "DUP1");
        assert_eq!(name(0x8F), "DUP16");
        assert_eq!(name(0x90), "SWAP1");
        assert_eq!(name(0x9F), "SWAP16");
        assert_eq!(name(0xA4), "LOG4");
    }

    #[test]
    fn test_fixed_opcodes() {
        assert_eq!(name(0x00), "STOP");
        assert_eq!(name(0x20), "KECCAK256");
        assert_eq!(name(0x55), "SSTORE");
        assert_eq!(name(0xFF), "SELFDESTRUCT");
    }

    #[test]
    fn test_undefined_opcode() {
        assert_eq!(name(0x0C), "opcode 0xc not defined");
        assert_eq!(name(0xEF), "opcode 0xef not defined");
    }
}
