use super::script;
use crate::interpreter::eval_script;
use crate::opcode::*;
use crate::script::push_data;
use crate::signature_checker::NoSignatureCheck;
use crate::stack::Stack;
use crate::{Error, ScriptExecutionData, SigVersion, VerifyFlags};
use hex_literal::hex;

struct EvalResult {
    /// Result of [`eval_script`].
    result: Result<(), Error>,
    /// Stack after the evaluation if no error occurs.
    expected_stack: Option<Stack>,
}

impl EvalResult {
    fn ok(stack: Vec<Vec<u8>>) -> Self {
        Self {
            result: Ok(()),
            expected_stack: Some(stack.into()),
        }
    }

    fn err(err: impl Into<Error>) -> Self {
        Self {
            result: Err(err.into()),
            expected_stack: None,
        }
    }
}

fn run(script: &[u8], flags: VerifyFlags, eval_result: EvalResult) {
    let EvalResult {
        result: expected,
        expected_stack,
    } = eval_result;

    let mut stack = Stack::default();
    let eval_script_result = eval_script(
        &mut stack,
        script,
        &flags,
        &NoSignatureCheck,
        SigVersion::Base,
        &mut ScriptExecutionData::default(),
    );
    assert_eq!(eval_script_result, expected);
    if expected.is_ok() {
        let expected_stack =
            expected_stack.expect("Expected stack must be Some if eval result is ok");
        assert_eq!(stack, expected_stack);
    }
}

fn basic_test(script: &[u8], eval_result: EvalResult) {
    run(script, VerifyFlags::P2SH, eval_result)
}

#[test]
fn test_equal() {
    let script = script(&[&push_data(&[0x4]), &push_data(&[0x4]), &[OP_EQUAL]]);
    basic_test(&script, EvalResult::ok(vec![vec![1]]));
}

#[test]
fn test_equal_false() {
    let script = script(&[&push_data(&[0x4]), &push_data(&[0x3]), &[OP_EQUAL]]);
    basic_test(&script, EvalResult::ok(vec![vec![]]));
}

#[test]
fn test_equal_invalid_stack() {
    let script = script(&[&push_data(&[0x4]), &[OP_EQUAL]]);
    basic_test(&script, EvalResult::err(Error::InvalidStackOperation));
}

#[test]
fn test_equal_verify() {
    let script = script(&[&push_data(&[0x4]), &push_data(&[0x4]), &[OP_EQUALVERIFY]]);
    basic_test(&script, EvalResult::ok(vec![]));
}

#[test]
fn test_equal_verify_failed() {
    let script = script(&[&push_data(&[0x4]), &push_data(&[0x3]), &[OP_EQUALVERIFY]]);
    basic_test(&script, EvalResult::err(Error::EqualVerify));
}

#[test]
fn test_size() {
    let script = script(&[&push_data(&[0x12, 0x34]), &[OP_SIZE]]);
    basic_test(&script, EvalResult::ok(vec![vec![0x12, 0x34], vec![0x2]]));
}

#[test]
fn test_hashes() {
    let cases: [(u8, &[u8]); 5] = [
        (OP_RIPEMD160, &hex!("9c1185a5c5e9fc54612808977ee8f548b2258d31")),
        (OP_SHA1, &hex!("da39a3ee5e6b4b0d3255bfef95601890afd80709")),
        (
            OP_SHA256,
            &hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"),
        ),
        (OP_HASH160, &hex!("b472a266d0bd89c13706a4132ccfb16f7c3b9fcb")),
        (
            OP_HASH256,
            &hex!("5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"),
        ),
    ];

    for (opcode, expected) in cases {
        basic_test(&[OP_0, opcode], EvalResult::ok(vec![expected.to_vec()]));
    }
}

#[test]
fn test_hash_empty_stack() {
    basic_test(&[OP_SHA256], EvalResult::err(Error::InvalidStackOperation));
}

#[test]
fn test_if_else() {
    basic_test(
        &[OP_1, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF],
        EvalResult::ok(vec![vec![2]]),
    );
    basic_test(
        &[OP_0, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF],
        EvalResult::ok(vec![vec![3]]),
    );
    basic_test(
        &[OP_0, OP_NOTIF, OP_2, OP_ELSE, OP_3, OP_ENDIF],
        EvalResult::ok(vec![vec![2]]),
    );
    // Nested branches inside an unexecuted one are skipped as a whole.
    basic_test(
        &[OP_0, OP_IF, OP_1, OP_IF, OP_RETURN, OP_ENDIF, OP_ELSE, OP_4, OP_ENDIF],
        EvalResult::ok(vec![vec![4]]),
    );
}

#[test]
fn test_unbalanced_conditionals() {
    basic_test(&[OP_1, OP_ELSE], EvalResult::err(Error::UnbalancedConditional));
    basic_test(&[OP_ENDIF], EvalResult::err(Error::UnbalancedConditional));
    basic_test(&[OP_1, OP_IF], EvalResult::err(Error::UnbalancedConditional));
    basic_test(&[OP_IF, OP_ENDIF], EvalResult::err(Error::UnbalancedConditional));
}

#[test]
fn test_return_and_verify() {
    basic_test(&[OP_RETURN], EvalResult::err(Error::OpReturn));
    basic_test(&[OP_0, OP_VERIFY], EvalResult::err(Error::Verify));
    basic_test(&[OP_1, OP_VERIFY], EvalResult::ok(vec![]));
    // Unexecuted OP_RETURN is harmless.
    basic_test(&[OP_0, OP_IF, OP_RETURN, OP_ENDIF], EvalResult::ok(vec![]));
}

#[test]
fn test_disabled_opcode_in_unexecuted_branch() {
    basic_test(
        &[OP_0, OP_IF, OP_MUL, OP_ENDIF],
        EvalResult::err(Error::DisabledOpcode(OP_MUL)),
    );
    basic_test(&[OP_0, OP_IF, OP_VER, OP_ENDIF], EvalResult::ok(vec![]));
    basic_test(&[OP_VER], EvalResult::err(Error::BadOpcode));
}

#[test]
fn test_pick_and_roll() {
    let prefix = script(&[&push_data(&[0xa]), &push_data(&[0xb]), &push_data(&[0xc])]);

    basic_test(
        &script(&[&prefix, &[OP_2, OP_PICK]]),
        EvalResult::ok(vec![vec![0xa], vec![0xb], vec![0xc], vec![0xa]]),
    );
    basic_test(
        &script(&[&prefix, &[OP_2, OP_ROLL]]),
        EvalResult::ok(vec![vec![0xb], vec![0xc], vec![0xa]]),
    );
    basic_test(
        &script(&[&prefix, &[OP_3, OP_ROLL]]),
        EvalResult::err(Error::InvalidStackOperation),
    );
}

#[test]
fn test_alt_stack() {
    basic_test(
        &[OP_1, OP_2, OP_TOALTSTACK, OP_3, OP_FROMALTSTACK],
        EvalResult::ok(vec![vec![1], vec![3], vec![2]]),
    );
    basic_test(
        &[OP_1, OP_FROMALTSTACK],
        EvalResult::err(Error::InvalidAltStackOperation),
    );
}

#[test]
fn test_depth_and_stack_shuffles() {
    basic_test(&[OP_DEPTH], EvalResult::ok(vec![vec![]]));
    basic_test(
        &[OP_1, OP_2, OP_3, OP_ROT],
        EvalResult::ok(vec![vec![2], vec![3], vec![1]]),
    );
    basic_test(
        &[OP_1, OP_2, OP_TUCK],
        EvalResult::ok(vec![vec![2], vec![1], vec![2]]),
    );
    basic_test(
        &[OP_1, OP_2, OP_3, OP_4, OP_2SWAP],
        EvalResult::ok(vec![vec![3], vec![4], vec![1], vec![2]]),
    );
    basic_test(&[OP_0, OP_IFDUP], EvalResult::ok(vec![vec![]]));
}

#[test]
fn test_numeric() {
    basic_test(&[OP_5, OP_1ADD, OP_NEGATE], EvalResult::ok(vec![vec![0x86]]));
    basic_test(&[OP_1NEGATE, OP_ABS], EvalResult::ok(vec![vec![1]]));
    basic_test(&[OP_3, OP_9, OP_MIN, OP_4, OP_MAX], EvalResult::ok(vec![vec![4]]));
    basic_test(&[OP_5, OP_0, OP_10, OP_WITHIN], EvalResult::ok(vec![vec![1]]));
    basic_test(&[OP_10, OP_0, OP_10, OP_WITHIN], EvalResult::ok(vec![vec![]]));
    basic_test(&[OP_2, OP_3, OP_NUMEQUALVERIFY], EvalResult::err(Error::NumEqualVerify));
}

#[test]
fn test_numeric_operand_too_long() {
    let script = script(&[&push_data(&[1, 2, 3, 4, 5]), &[OP_1ADD]]);
    let result = run_and_get(&script);
    assert!(matches!(result, Err(Error::Num(_))), "{result:?}");
}

fn run_and_get(script: &[u8]) -> Result<(), Error> {
    let mut stack = Stack::default();
    eval_script(
        &mut stack,
        script,
        &VerifyFlags::P2SH,
        &NoSignatureCheck,
        SigVersion::Base,
        &mut ScriptExecutionData::default(),
    )
}

#[test]
fn test_splice() {
    basic_test(
        &script(&[&push_data(b"ab"), &push_data(b"cd"), &[OP_CAT]]),
        EvalResult::ok(vec![b"abcd".to_vec()]),
    );
    basic_test(
        &script(&[&push_data(b"hello"), &[OP_1, OP_3, OP_SUBSTR]]),
        EvalResult::ok(vec![b"ell".to_vec()]),
    );
    basic_test(
        &script(&[&push_data(b"hello"), &[OP_4, OP_3, OP_SUBSTR]]),
        EvalResult::err(Error::InvalidStackOperation),
    );
    basic_test(
        &script(&[&push_data(b"hello"), &[OP_2, OP_LEFT]]),
        EvalResult::ok(vec![b"he".to_vec()]),
    );
    basic_test(
        &script(&[&push_data(b"hello"), &[OP_2, OP_RIGHT]]),
        EvalResult::ok(vec![b"llo".to_vec()]),
    );
}

#[test]
fn test_cat_result_size_limit() {
    let script = script(&[&push_data(&[1; 300]), &push_data(&[2; 221]), &[OP_CAT]]);
    basic_test(&script, EvalResult::err(Error::InvalidStackOperation));
}

#[test]
fn test_bitwise() {
    basic_test(
        &script(&[&push_data(&[0x0f, 0xf0]), &[OP_INVERT]]),
        EvalResult::ok(vec![vec![0xf0, 0x0f]]),
    );
    basic_test(
        &script(&[&push_data(&[0x0c]), &push_data(&[0x0a]), &[OP_AND]]),
        EvalResult::ok(vec![vec![0x08]]),
    );
    basic_test(
        &script(&[&push_data(&[0x0c]), &push_data(&[0x0a]), &[OP_XOR]]),
        EvalResult::ok(vec![vec![0x06]]),
    );
}

#[test]
fn test_tapscript_only_opcodes_outside_tapscript() {
    basic_test(&[OP_0, OP_SHA256INITIALIZE], EvalResult::err(Error::BadOpcode));
    basic_test(&[OP_0, OP_NEG64], EvalResult::err(Error::BadOpcode));
}

#[test]
fn test_checklocktimeverify() {
    let flags = VerifyFlags::P2SH | VerifyFlags::CHECKLOCKTIMEVERIFY;
    run(&[OP_1, OP_CHECKLOCKTIMEVERIFY], flags, EvalResult::ok(vec![vec![1]]));
    run(
        &[OP_1NEGATE, OP_CHECKLOCKTIMEVERIFY],
        flags,
        EvalResult::err(Error::NegativeLocktime),
    );
    run(
        &[OP_CHECKLOCKTIMEVERIFY],
        flags,
        EvalResult::err(Error::InvalidStackOperation),
    );
    // A NOP without the flag.
    basic_test(&[OP_CHECKLOCKTIMEVERIFY], EvalResult::ok(vec![]));
}

#[test]
fn test_minimal_data_pushes() {
    let flags = VerifyFlags::P2SH | VerifyFlags::MINIMALDATA;
    run(&[0x01, 0x05], flags, EvalResult::err(Error::MinimalData));
    run(&[OP_5], flags, EvalResult::ok(vec![vec![5]]));
    run(&[0x01, 0x05], VerifyFlags::P2SH, EvalResult::ok(vec![vec![5]]));
}
