mod arith64;
mod crypto;
mod introspection;
mod multisig;
mod sha256_ctx;
mod sig;
mod splice;

use crate::condition_stack::ConditionStack;
use crate::constants::{
    MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE, MAX_STACK_SIZE,
    SEQUENCE_LOCKTIME_DISABLE_FLAG,
};
use crate::error::Error;
use crate::num::ScriptNum;
use crate::opcode::{self, OpcodeRule, *};
use crate::script::{Instructions, check_minimal_push};
use crate::signature_checker::SignatureChecker;
use crate::stack::{Stack, StackError, cast_to_bool};
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::hashes::{Hash, hash160, ripemd160, sha1, sha256, sha256d};

pub use self::sig::{
    SignatureEncodingError, check_pubkey_encoding, check_signature_encoding,
};

/// Executes `script` on `stack`.
///
/// Returns `Ok(())` once every opcode ran, the caller decides whether the resulting
/// stack is a success. Must not be called with [`SigVersion::Taproot`], key path
/// spends have no script.
pub fn eval_script<SC: SignatureChecker + ?Sized>(
    stack: &mut Stack,
    script: &[u8],
    flags: &VerifyFlags,
    checker: &SC,
    sig_version: SigVersion,
    exec_data: &mut ScriptExecutionData,
) -> Result<(), Error> {
    if sig_version == SigVersion::Taproot {
        return Err(Error::Unknown);
    }

    let legacy_limits = matches!(sig_version, SigVersion::Base | SigVersion::WitnessV0);

    if legacy_limits && script.len() > MAX_SCRIPT_SIZE {
        return Err(Error::ScriptSize);
    }

    let require_minimal = flags.verify_minimaldata();
    stack.set_require_minimal(require_minimal);

    let mut alt_stack = Stack::with_flags(flags);
    let mut exec_stack = ConditionStack::default();

    let mut begincode = 0;
    let mut op_count = 0;

    exec_data.codeseparator_pos = None;

    let mut instructions = Instructions::new(script);
    let mut opcode_pos = 0u32;

    while let Some(instruction) = instructions.next() {
        let op = instruction.map_err(|_| Error::BadOpcode)?;
        let pc = instructions.pc();
        let opcode = op.opcode;
        let executing = exec_stack.all_true();

        if op.data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(Error::PushSize);
        }

        // OP_RESERVED does not count towards the opcode limit.
        if legacy_limits && opcode > OP_16 {
            op_count += 1;
            if op_count > MAX_OPS_PER_SCRIPT {
                return Err(Error::OpCount);
            }
        }

        let rule = opcode::rule(opcode, sig_version);

        // Rejected even in unexecuted branches.
        if rule == OpcodeRule::Disabled {
            return Err(Error::DisabledOpcode(opcode));
        }

        if opcode == OP_CODESEPARATOR
            && sig_version == SigVersion::Base
            && flags.verify_const_scriptcode()
        {
            return Err(Error::OpCodeSeparator);
        }

        tracing::trace!(
            pos = op.pos,
            opcode = opcode::name(opcode),
            executing,
            "{stack}"
        );

        if rule == OpcodeRule::Push {
            if executing {
                if require_minimal && !check_minimal_push(op.data, opcode) {
                    return Err(Error::MinimalData);
                }
                stack.push(op.data.to_vec());
            }
        } else if executing || (OP_IF..=OP_ENDIF).contains(&opcode) {
            match rule {
                // OP_SUCCESSx scripts are accepted before they get here.
                OpcodeRule::Success | OpcodeRule::Invalid => return Err(Error::BadOpcode),
                _ => {}
            }

            match opcode {
                // Constants
                OP_1NEGATE | OP_1..=OP_16 => {
                    stack.push_num(i64::from(opcode) - i64::from(OP_1 - 1));
                }

                // Flow control
                OP_NOP => {}
                OP_IF | OP_NOTIF => {
                    let mut value = false;

                    if executing {
                        let top = stack.pop().map_err(|_| Error::UnbalancedConditional)?;
                        let minimal = top.is_empty() || top == [1];

                        match sig_version {
                            SigVersion::Tapscript if !minimal => {
                                return Err(Error::TapscriptMinimalIf);
                            }
                            SigVersion::WitnessV0 if flags.verify_minimalif() && !minimal => {
                                return Err(Error::MinimalIf);
                            }
                            _ => {}
                        }

                        value = cast_to_bool(&top);
                        if opcode == OP_NOTIF {
                            value = !value;
                        }
                    }

                    exec_stack.push_back(value);
                }
                OP_ELSE => {
                    if exec_stack.is_empty() {
                        return Err(Error::UnbalancedConditional);
                    }
                    exec_stack.toggle_top();
                }
                OP_ENDIF => {
                    if exec_stack.is_empty() {
                        return Err(Error::UnbalancedConditional);
                    }
                    exec_stack.pop_back();
                }
                OP_VERIFY => {
                    if !stack.pop_bool()? {
                        return Err(Error::Verify);
                    }
                }
                OP_RETURN => return Err(Error::OpReturn),

                // Stack
                OP_TOALTSTACK => {
                    alt_stack.push(stack.pop()?);
                }
                OP_FROMALTSTACK => {
                    let v = alt_stack
                        .pop()
                        .map_err(|_| Error::InvalidAltStackOperation)?;
                    stack.push(v);
                }
                OP_2DROP => stack.drop(2)?,
                OP_2DUP => stack.dup(2)?,
                OP_3DUP => stack.dup(3)?,
                OP_2OVER => stack.over(2)?,
                OP_2ROT => stack.rot(2)?,
                OP_2SWAP => stack.swap(2)?,
                OP_IFDUP => {
                    if stack.peek_bool()? {
                        stack.dup(1)?;
                    }
                }
                OP_DEPTH => {
                    stack.push_num(stack.len() as i64);
                }
                OP_DROP => stack.drop(1)?,
                OP_DUP => stack.dup(1)?,
                OP_NIP => stack.nip()?,
                OP_OVER => stack.over(1)?,
                OP_PICK | OP_ROLL => {
                    let n = stack.pop_num()?.value();
                    if n < 0 || n >= stack.len() as i64 {
                        return Err(StackError::InvalidOperation.into());
                    }
                    let v = if opcode == OP_PICK {
                        stack.top(n as usize)?.clone()
                    } else {
                        stack.remove(n as usize)?
                    };
                    stack.push(v);
                }
                OP_ROT => stack.rot(1)?,
                OP_SWAP => stack.swap(1)?,
                OP_TUCK => stack.tuck()?,

                // Splice
                OP_CAT => splice::cat(stack)?,
                OP_SUBSTR => splice::substr(stack, false)?,
                OP_SUBSTR_LAZY => splice::substr(stack, true)?,
                OP_LEFT => splice::left_right(stack, true)?,
                OP_RIGHT => splice::left_right(stack, false)?,
                OP_SIZE => {
                    let size = stack.top(0)?.len();
                    stack.push_num(size as i64);
                }

                // Bitwise logic
                OP_INVERT => splice::invert(stack)?,
                OP_AND => splice::bitwise(stack, |a, b| a & b)?,
                OP_OR => splice::bitwise(stack, |a, b| a | b)?,
                OP_XOR => splice::bitwise(stack, |a, b| a ^ b)?,
                OP_LSHIFT => splice::lshift(stack)?,
                OP_RSHIFT => splice::rshift(stack)?,
                OP_EQUAL | OP_EQUALVERIFY => {
                    stack.require(2)?;
                    let equal = stack.pop()? == stack.pop()?;
                    if opcode == OP_EQUAL {
                        stack.push_bool(equal);
                    } else if !equal {
                        return Err(Error::EqualVerify);
                    }
                }

                // Numeric
                OP_1ADD => {
                    let n = (stack.pop_num()? + 1.into())?;
                    stack.push_num(n);
                }
                OP_1SUB => {
                    let n = (stack.pop_num()? - 1.into())?;
                    stack.push_num(n);
                }
                OP_NEGATE => {
                    let n = (-stack.pop_num()?)?;
                    stack.push_num(n);
                }
                OP_ABS => {
                    let n = stack.pop_num()?.abs();
                    stack.push_num(n);
                }
                OP_NOT => {
                    let n = stack.pop_num()?.is_zero();
                    stack.push_num(n);
                }
                OP_0NOTEQUAL => {
                    let n = !stack.pop_num()?.is_zero();
                    stack.push_num(n);
                }
                OP_ADD
                | OP_SUB
                | OP_BOOLAND
                | OP_BOOLOR
                | OP_NUMEQUAL
                | OP_NUMEQUALVERIFY
                | OP_NUMNOTEQUAL
                | OP_LESSTHAN
                | OP_GREATERTHAN
                | OP_LESSTHANOREQUAL
                | OP_GREATERTHANOREQUAL
                | OP_MIN
                | OP_MAX => {
                    // (x1 x2 -- out)
                    stack.require(2)?;
                    let x2 = stack.pop_num()?;
                    let x1 = stack.pop_num()?;

                    let out: ScriptNum = match opcode {
                        OP_ADD => (x1 + x2)?,
                        OP_SUB => (x1 - x2)?,
                        OP_BOOLAND => (!x1.is_zero() && !x2.is_zero()).into(),
                        OP_BOOLOR => (!x1.is_zero() || !x2.is_zero()).into(),
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => (x1 == x2).into(),
                        OP_NUMNOTEQUAL => (x1 != x2).into(),
                        OP_LESSTHAN => (x1 < x2).into(),
                        OP_GREATERTHAN => (x1 > x2).into(),
                        OP_LESSTHANOREQUAL => (x1 <= x2).into(),
                        OP_GREATERTHANOREQUAL => (x1 >= x2).into(),
                        OP_MIN => x1.min(x2),
                        _ => x1.max(x2),
                    };

                    if opcode == OP_NUMEQUALVERIFY {
                        if out.is_zero() {
                            return Err(Error::NumEqualVerify);
                        }
                    } else {
                        stack.push_num(out);
                    }
                }
                OP_WITHIN => {
                    // (x min max -- out)
                    stack.require(3)?;
                    let max = stack.pop_num()?;
                    let min = stack.pop_num()?;
                    let x = stack.pop_num()?;
                    stack.push_bool((min..max).contains(&x));
                }

                // 64-bit arithmetic
                OP_ADD64 | OP_SUB64 | OP_MUL64 | OP_DIV64 | OP_LESSTHAN64
                | OP_LESSTHANOREQUAL64 | OP_GREATERTHAN64 | OP_GREATERTHANOREQUAL64 => {
                    arith64::binary(stack, opcode)?
                }
                OP_NEG64 => arith64::neg(stack)?,
                OP_SCRIPTNUMTOLE64 => arith64::script_num_to_le64(stack)?,
                OP_LE64TOSCRIPTNUM => arith64::le64_to_script_num(stack)?,
                OP_LE32TOLE64 => arith64::le32_to_le64(stack)?,

                // Crypto
                OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                    let data = stack.pop()?;
                    let hash = match opcode {
                        OP_RIPEMD160 => ripemd160::Hash::hash(&data).to_byte_array().to_vec(),
                        OP_SHA1 => sha1::Hash::hash(&data).to_byte_array().to_vec(),
                        OP_SHA256 => sha256::Hash::hash(&data).to_byte_array().to_vec(),
                        OP_HASH160 => hash160::Hash::hash(&data).to_byte_array().to_vec(),
                        _ => sha256d::Hash::hash(&data).to_byte_array().to_vec(),
                    };
                    stack.push(hash);
                }
                OP_SHA256INITIALIZE => sha256_ctx::initialize(stack)?,
                OP_SHA256UPDATE => sha256_ctx::update(stack)?,
                OP_SHA256FINALIZE => sha256_ctx::finalize(stack)?,
                OP_CODESEPARATOR => {
                    begincode = pc;
                    exec_data.codeseparator_pos = Some(opcode_pos);
                }
                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    // (sig pubkey -- bool)
                    stack.require(2)?;

                    let success = sig::eval_checksig(
                        stack.top(1)?,
                        stack.top(0)?,
                        &script[begincode..],
                        exec_data,
                        flags,
                        checker,
                        sig_version,
                    )?;
                    stack.drop(2)?;

                    if opcode == OP_CHECKSIG {
                        stack.push_bool(success);
                    } else if !success {
                        return Err(Error::CheckSigVerify);
                    }
                }
                OP_CHECKSIGADD => {
                    // (sig num pubkey -- num)
                    stack.require(3)?;
                    let num = stack.num_at(1)?;

                    let success = sig::eval_checksig(
                        stack.top(2)?,
                        stack.top(0)?,
                        &script[begincode..],
                        exec_data,
                        flags,
                        checker,
                        sig_version,
                    )?;
                    stack.drop(3)?;

                    let num = if success { (num + 1.into())? } else { num };
                    stack.push_num(num);
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let multisig_op = if opcode == OP_CHECKMULTISIG {
                        multisig::MultiSigOp::CheckMultiSig
                    } else {
                        multisig::MultiSigOp::CheckMultiSigVerify
                    };

                    multisig::handle_checkmultisig(
                        stack,
                        flags,
                        &script[begincode..],
                        sig_version,
                        checker,
                        multisig_op,
                        &mut op_count,
                    )?;
                }
                OP_CHECKSIGFROMSTACK | OP_CHECKSIGFROMSTACKVERIFY => {
                    // (sig data pubkey -- bool)
                    stack.require(3)?;

                    let success = sig::eval_checksig_from_stack(
                        stack.top(2)?,
                        stack.top(1)?,
                        stack.top(0)?,
                        exec_data,
                        flags,
                        sig_version,
                    )?;
                    stack.drop(3)?;

                    if opcode == OP_CHECKSIGFROMSTACK {
                        stack.push_bool(success);
                    } else if !success {
                        return Err(Error::CheckSigVerify);
                    }
                }
                OP_ECMULSCALARVERIFY => crypto::ec_mul_scalar_verify(stack, exec_data)?,
                OP_TWEAKVERIFY => crypto::tweak_verify(stack, exec_data)?,
                OP_DETERMINISTICRANDOM => crypto::deterministic_random(stack)?,

                // Introspection
                OP_INSPECTINPUTOUTPOINT..=OP_INSPECTINPUTISSUANCE => {
                    introspection::inspect_input(stack, opcode, checker)?
                }
                OP_PUSHCURRENTINPUTINDEX => {
                    introspection::push_current_input_index(stack, checker)?
                }
                OP_INSPECTOUTPUTASSET..=OP_INSPECTOUTPUTSCRIPTPUBKEY => {
                    introspection::inspect_output(stack, opcode, checker)?
                }
                OP_INSPECTVERSION..=OP_TXWEIGHT => {
                    introspection::inspect_tx(stack, opcode, checker)?
                }

                // Locktime
                OP_CHECKLOCKTIMEVERIFY => {
                    if flags.verify_checklocktimeverify() {
                        // Five bytes keep the full range of the 32-bit nLockTime field.
                        let lock_time =
                            stack.num_at_with_max_size(0, ScriptNum::LOCKTIME_MAX_SIZE)?;

                        // 0 MAX CHECKLOCKTIMEVERIFY works around arithmetic producing a negative.
                        if lock_time.is_negative() {
                            return Err(Error::NegativeLocktime);
                        }

                        if !checker.check_lock_time(lock_time) {
                            return Err(Error::UnsatisfiedLocktime);
                        }
                    }
                }
                OP_CHECKSEQUENCEVERIFY => {
                    if flags.verify_checksequenceverify() {
                        let sequence = stack.num_at_with_max_size(0, ScriptNum::LOCKTIME_MAX_SIZE)?;

                        if sequence.is_negative() {
                            return Err(Error::NegativeLocktime);
                        }

                        // With the disable flag set the operand carries no constraint.
                        if (sequence.value() & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG)) == 0
                            && !checker.check_sequence(sequence)
                        {
                            return Err(Error::UnsatisfiedLocktime);
                        }
                    }
                }
                OP_NOP1 | OP_NOP4..=OP_NOP10 => {
                    if flags.verify_discourage_upgradable_nops() {
                        return Err(Error::DiscourageUpgradableNops);
                    }
                }

                // OP_RESERVED, OP_VER, OP_VERIF, OP_VERNOTIF, OP_RESERVED1, OP_RESERVED2 and
                // anything left.
                _ => return Err(Error::BadOpcode),
            }
        }

        if stack.len() + alt_stack.len() > MAX_STACK_SIZE {
            return Err(Error::StackSize);
        }

        opcode_pos += 1;
    }

    if !exec_stack.is_empty() {
        return Err(Error::UnbalancedConditional);
    }

    Ok(())
}
