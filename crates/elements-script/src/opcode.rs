//! Elements opcode table.
//!
//! Opcodes are plain bytes here rather than `bitcoin::opcodes::Opcode`: the Elements
//! extensions reuse byte values that rust-bitcoin names `OP_RETURN_xxx`, and the ruleset
//! below needs to classify every byte per script version.

use crate::SigVersion;

pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = OP_0;
pub const OP_PUSHBYTES_75: u8 = 0x4b;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = OP_1;
pub const OP_2: u8 = 0x52;
pub const OP_3: u8 = 0x53;
pub const OP_4: u8 = 0x54;
pub const OP_5: u8 = 0x55;
pub const OP_6: u8 = 0x56;
pub const OP_7: u8 = 0x57;
pub const OP_8: u8 = 0x58;
pub const OP_9: u8 = 0x59;
pub const OP_10: u8 = 0x5a;
pub const OP_11: u8 = 0x5b;
pub const OP_12: u8 = 0x5c;
pub const OP_13: u8 = 0x5d;
pub const OP_14: u8 = 0x5e;
pub const OP_15: u8 = 0x5f;
pub const OP_16: u8 = 0x60;

// Flow control
pub const OP_NOP: u8 = 0x61;
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

// Stack
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;

// Splice
pub const OP_CAT: u8 = 0x7e;
pub const OP_SUBSTR: u8 = 0x7f;
pub const OP_LEFT: u8 = 0x80;
pub const OP_RIGHT: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;

// Bitwise logic
pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;

// Numeric
pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_2MUL: u8 = 0x8d;
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
pub const OP_LSHIFT: u8 = 0x98;
pub const OP_RSHIFT: u8 = 0x99;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

// Crypto
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

// Expansion
pub const OP_NOP1: u8 = 0xb0;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP10: u8 = 0xb9;

// Opcode added by BIP 342 (Tapscript)
pub const OP_CHECKSIGADD: u8 = 0xba;

// Elements extensions
pub const OP_DETERMINISTICRANDOM: u8 = 0xc0;
pub const OP_CHECKSIGFROMSTACK: u8 = 0xc1;
pub const OP_CHECKSIGFROMSTACKVERIFY: u8 = 0xc2;
pub const OP_SUBSTR_LAZY: u8 = 0xc3;

// Streaming SHA256
pub const OP_SHA256INITIALIZE: u8 = 0xc4;
pub const OP_SHA256UPDATE: u8 = 0xc5;
pub const OP_SHA256FINALIZE: u8 = 0xc6;

// Input introspection
pub const OP_INSPECTINPUTOUTPOINT: u8 = 0xc7;
pub const OP_INSPECTINPUTASSET: u8 = 0xc8;
pub const OP_INSPECTINPUTVALUE: u8 = 0xc9;
pub const OP_INSPECTINPUTSCRIPTPUBKEY: u8 = 0xca;
pub const OP_INSPECTINPUTSEQUENCE: u8 = 0xcb;
pub const OP_INSPECTINPUTISSUANCE: u8 = 0xcc;
pub const OP_PUSHCURRENTINPUTINDEX: u8 = 0xcd;

// Output introspection
pub const OP_INSPECTOUTPUTASSET: u8 = 0xce;
pub const OP_INSPECTOUTPUTVALUE: u8 = 0xcf;
pub const OP_INSPECTOUTPUTNONCE: u8 = 0xd0;
pub const OP_INSPECTOUTPUTSCRIPTPUBKEY: u8 = 0xd1;

// Transaction introspection
pub const OP_INSPECTVERSION: u8 = 0xd2;
pub const OP_INSPECTLOCKTIME: u8 = 0xd3;
pub const OP_INSPECTNUMINPUTS: u8 = 0xd4;
pub const OP_INSPECTNUMOUTPUTS: u8 = 0xd5;
pub const OP_TXWEIGHT: u8 = 0xd6;

// 64-bit arithmetic
pub const OP_ADD64: u8 = 0xd7;
pub const OP_SUB64: u8 = 0xd8;
pub const OP_MUL64: u8 = 0xd9;
pub const OP_DIV64: u8 = 0xda;
pub const OP_NEG64: u8 = 0xdb;
pub const OP_LESSTHAN64: u8 = 0xdc;
pub const OP_LESSTHANOREQUAL64: u8 = 0xdd;
pub const OP_GREATERTHAN64: u8 = 0xde;
pub const OP_GREATERTHANOREQUAL64: u8 = 0xdf;

// Conversion
pub const OP_SCRIPTNUMTOLE64: u8 = 0xe0;
pub const OP_LE64TOSCRIPTNUM: u8 = 0xe1;
pub const OP_LE32TOLE64: u8 = 0xe2;

// Crypto
pub const OP_ECMULSCALARVERIFY: u8 = 0xe3;
pub const OP_TWEAKVERIFY: u8 = 0xe4;

pub const OP_INVALIDOPCODE: u8 = 0xff;

/// How the ruleset treats an opcode byte under a given script version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeRule {
    /// Push of literal data, including OP_0 and the PUSHDATA forms.
    Push,
    /// Executed by the interpreter.
    Enabled,
    /// Fails the script even inside an unexecuted branch.
    Disabled,
    /// Makes a tapscript succeed unconditionally before execution starts.
    Success,
    /// Fails with a bad-opcode error when executed.
    Invalid,
}

/// Opcodes that fail a script wherever they appear.
pub fn is_disabled(opcode: u8) -> bool {
    matches!(opcode, OP_2MUL | OP_2DIV | OP_MUL | OP_DIV | OP_MOD)
}

/// Opcodes that only exist inside tapscript and are bad opcodes elsewhere.
pub fn is_tapscript_only(opcode: u8) -> bool {
    matches!(opcode, OP_CHECKSIGADD | OP_SHA256INITIALIZE..=OP_TWEAKVERIFY)
}

/// The OP_SUCCESSx set of Elements tapscript.
///
/// Differs from BIP 342 by the splice, bitwise and shift opcodes that Elements
/// re-enabled, and by the extension opcodes from 0xbb up to 0xe4.
pub fn is_op_success(opcode: u8) -> bool {
    matches!(
        opcode,
        0x50 | 0x62 | 0x89..=0x8a | 0x8d..=0x8e | 0x95..=0x97 | 0xbb..=0xbf | 0xe5..=0xfe
    )
}

/// Classification of `opcode` when executed under `sig_version`.
pub fn rule(opcode: u8, sig_version: SigVersion) -> OpcodeRule {
    let tapscript = sig_version == SigVersion::Tapscript;

    if opcode <= OP_PUSHDATA4 {
        OpcodeRule::Push
    } else if tapscript && is_op_success(opcode) {
        OpcodeRule::Success
    } else if is_disabled(opcode) {
        OpcodeRule::Disabled
    } else if is_tapscript_only(opcode) && !tapscript {
        OpcodeRule::Invalid
    } else if matches!(
        opcode,
        OP_1NEGATE..=OP_CHECKSIGADD | OP_DETERMINISTICRANDOM..=OP_TWEAKVERIFY
    ) {
        OpcodeRule::Enabled
    } else {
        OpcodeRule::Invalid
    }
}

/// Human readable name, used by logs and error messages.
pub fn name(opcode: u8) -> &'static str {
    const NAMES: [(u8, &str); 20] = [
        (OP_RESERVED, "OP_RESERVED"),
        (OP_VER, "OP_VER"),
        (OP_VERIF, "OP_VERIF"),
        (OP_VERNOTIF, "OP_VERNOTIF"),
        (OP_RESERVED1, "OP_RESERVED1"),
        (OP_RESERVED2, "OP_RESERVED2"),
        (OP_2MUL, "OP_2MUL"),
        (OP_2DIV, "OP_2DIV"),
        (OP_MUL, "OP_MUL"),
        (OP_DIV, "OP_DIV"),
        (OP_MOD, "OP_MOD"),
        (OP_VERIFY, "OP_VERIFY"),
        (OP_EQUALVERIFY, "OP_EQUALVERIFY"),
        (OP_NUMEQUALVERIFY, "OP_NUMEQUALVERIFY"),
        (OP_CHECKSIGVERIFY, "OP_CHECKSIGVERIFY"),
        (OP_CHECKMULTISIGVERIFY, "OP_CHECKMULTISIGVERIFY"),
        (OP_CHECKSIGFROMSTACKVERIFY, "OP_CHECKSIGFROMSTACKVERIFY"),
        (OP_ECMULSCALARVERIFY, "OP_ECMULSCALARVERIFY"),
        (OP_TWEAKVERIFY, "OP_TWEAKVERIFY"),
        (OP_INVALIDOPCODE, "OP_INVALIDOPCODE"),
    ];

    NAMES
        .iter()
        .find_map(|(op, name)| (*op == opcode).then_some(*name))
        .unwrap_or("OP_UNKNOWN")
}
