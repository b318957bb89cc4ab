//! Elliptic curve verification opcodes and OP_DETERMINISTICRANDOM.

use super::sig::{charge_validation_weight, is_compressed_pubkey};
use crate::ScriptExecutionData;
use crate::constants::COMPRESSED_PUBKEY_SIZE;
use crate::error::Error;
use crate::signature_checker::SECP;
use crate::stack::Stack;
use bitcoin::hashes::{Hash, HashEngine, sha256};
use bitcoin::secp256k1::{Parity, PublicKey, Scalar, XOnlyPublicKey};

fn scalar(data: &[u8]) -> Option<Scalar> {
    let bytes = <[u8; 32]>::try_from(data).ok()?;
    Scalar::from_be_bytes(bytes).ok()
}

/// OP_ECMULSCALARVERIFY: (res gen scalar -- ), fails unless `res == scalar * gen`.
pub(super) fn ec_mul_scalar_verify(
    stack: &mut Stack,
    exec_data: &mut ScriptExecutionData,
) -> Result<(), Error> {
    stack.require(3)?;

    let res = stack.top(2)?;
    let generator = stack.top(1)?;
    let tweak = stack.top(0)?;

    if !is_compressed_pubkey(generator) || !is_compressed_pubkey(res) {
        return Err(Error::PubkeyType);
    }

    charge_validation_weight(exec_data)?;

    let product = scalar(tweak).and_then(|tweak| {
        PublicKey::from_slice(generator)
            .ok()?
            .mul_tweak(&SECP, &tweak)
            .ok()
    });

    match product {
        Some(product) if product.serialize()[..] == res[..] => {}
        _ => return Err(Error::EcMultVerify),
    }

    stack.drop(3)?;
    Ok(())
}

/// OP_TWEAKVERIFY: (tweaked tweak internal -- ), checks the pay-to-contract
/// commitment `tweaked == internal + tweak * G`.
pub(super) fn tweak_verify(
    stack: &mut Stack,
    exec_data: &mut ScriptExecutionData,
) -> Result<(), Error> {
    stack.require(3)?;

    let tweaked = stack.top(2)?;
    let tweak = stack.top(1)?;
    let internal = stack.top(0)?;

    if !is_compressed_pubkey(tweaked) || internal.len() != 32 || tweak.len() != 32 {
        return Err(Error::PubkeyType);
    }

    charge_validation_weight(exec_data)?;

    let parity = if tweaked[0] & 1 == 1 {
        Parity::Odd
    } else {
        Parity::Even
    };

    let valid = match (
        XOnlyPublicKey::from_slice(internal),
        XOnlyPublicKey::from_slice(&tweaked[1..COMPRESSED_PUBKEY_SIZE]),
        scalar(tweak),
    ) {
        (Ok(internal), Ok(tweaked), Some(tweak)) => {
            internal.tweak_add_check(&SECP, &tweaked, parity, tweak)
        }
        _ => false,
    };

    if !valid {
        return Err(Error::EcMultVerify);
    }

    stack.drop(3)?;
    Ok(())
}

/// OP_DETERMINISTICRANDOM: (seed min max -- rand)
///
/// Draws a uniform number in `min..max` from the SHA256 stream of `seed || counter`,
/// rejecting samples above the largest multiple of the range.
pub(super) fn deterministic_random(stack: &mut Stack) -> Result<(), Error> {
    stack.require(3)?;

    let min = stack.num_at(1)?;
    let max = stack.num_at(0)?;

    if min > max {
        return Err(Error::Unknown);
    }

    if min == max {
        stack.drop(3)?;
        stack.push_num(min);
        return Ok(());
    }

    // The range saturates like any other script number conversion.
    let n_max = (max.value() - min.value()).min(i64::from(i32::MAX)) as u64;
    let n_range = (u64::MAX / n_max) * n_max;

    let mut seeded = sha256::HashEngine::default();
    seeded.input(stack.top(2)?);

    let mut hash = [0u8; 32];
    let mut counter = 0u64;
    let mut index = 3;
    let rand = loop {
        if index >= 3 {
            let mut engine = seeded.clone();
            engine.input(&counter.to_le_bytes());
            hash = sha256::Hash::from_engine(engine).to_byte_array();
            index = 0;
            counter += 1;
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&hash[index * 8..index * 8 + 8]);
        index += 1;

        let rand = u64::from_le_bytes(word);
        if rand <= n_range {
            break rand;
        }
    };

    stack.drop(3)?;
    stack.push_num((rand % n_max) as i64 + min.value());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::ScriptNum;
    use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};

    fn stack(items: Vec<Vec<u8>>) -> Stack {
        items.into()
    }

    fn exec_data() -> ScriptExecutionData {
        ScriptExecutionData {
            validation_weight_left: Some(1000),
            ..Default::default()
        }
    }

    fn secret(byte: u8) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        SecretKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn ec_mul_scalar() {
        let secp = Secp256k1::new();
        let generator = PublicKey::from_secret_key(&secp, &secret(3));
        let product = PublicKey::from_secret_key(&secp, &secret(21));
        let mut seven = [0u8; 32];
        seven[31] = 7;

        let mut exec = exec_data();
        let mut s = stack(vec![
            product.serialize().to_vec(),
            generator.serialize().to_vec(),
            seven.to_vec(),
        ]);
        ec_mul_scalar_verify(&mut s, &mut exec).unwrap();
        assert!(s.is_empty());
        assert_eq!(exec.validation_weight_left, Some(950));

        let mut s = stack(vec![
            generator.serialize().to_vec(),
            generator.serialize().to_vec(),
            seven.to_vec(),
        ]);
        assert_eq!(ec_mul_scalar_verify(&mut s, &mut exec), Err(Error::EcMultVerify));

        let mut s = stack(vec![
            product.serialize_uncompressed().to_vec(),
            generator.serialize().to_vec(),
            seven.to_vec(),
        ]);
        assert_eq!(ec_mul_scalar_verify(&mut s, &mut exec), Err(Error::PubkeyType));
    }

    #[test]
    fn tweak_commitment() {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret(5));
        let (internal, _) = keypair.x_only_public_key();
        let mut tweak_bytes = [0u8; 32];
        tweak_bytes[0] = 0x11;
        tweak_bytes[31] = 0x42;
        let tweak = Scalar::from_be_bytes(tweak_bytes).unwrap();
        let (tweaked, parity) = internal.add_tweak(&secp, &tweak).unwrap();

        let prefix = match parity {
            Parity::Even => 0x02,
            Parity::Odd => 0x03,
        };
        let mut tweaked_key = vec![prefix];
        tweaked_key.extend_from_slice(&tweaked.serialize());

        let mut exec = exec_data();
        let mut s = stack(vec![
            tweaked_key.clone(),
            tweak_bytes.to_vec(),
            internal.serialize().to_vec(),
        ]);
        tweak_verify(&mut s, &mut exec).unwrap();
        assert!(s.is_empty());

        // Wrong parity.
        tweaked_key[0] ^= 1;
        let mut s = stack(vec![tweaked_key, tweak_bytes.to_vec(), internal.serialize().to_vec()]);
        assert_eq!(tweak_verify(&mut s, &mut exec), Err(Error::EcMultVerify));

        let mut s = stack(vec![vec![0x02; 33], vec![0; 31], vec![0; 32]]);
        assert_eq!(tweak_verify(&mut s, &mut exec), Err(Error::PubkeyType));
    }

    #[test]
    fn validation_weight_is_charged_before_verification() {
        let mut exec = ScriptExecutionData {
            validation_weight_left: Some(10),
            ..Default::default()
        };
        let mut s = stack(vec![vec![0x02; 33], vec![0x02; 33], vec![0; 32]]);
        assert_eq!(
            ec_mul_scalar_verify(&mut s, &mut exec),
            Err(Error::TapscriptValidationWeight)
        );
    }

    #[test]
    fn deterministic_random_is_reproducible_and_bounded() {
        let draw = |seed: &[u8], min: i64, max: i64| {
            let mut s = stack(vec![
                seed.to_vec(),
                ScriptNum::from(min).encode(),
                ScriptNum::from(max).encode(),
            ]);
            deterministic_random(&mut s).unwrap();
            assert_eq!(s.len(), 1);
            s.num_at(0).unwrap().value()
        };

        for seed in [&b"seed"[..], &b""[..], &b"another seed"[..]] {
            let value = draw(seed, -10, 10);
            assert!((-10..10).contains(&value));
            assert_eq!(value, draw(seed, -10, 10));
        }

        assert_eq!(draw(b"x", 7, 7), 7);

        let values: Vec<_> = (0u8..32).map(|i| draw(&[i], 0, 1000)).collect();
        assert!(values.iter().any(|&v| v != values[0]));

        let mut s = stack(vec![vec![], vec![5], vec![4]]);
        assert_eq!(deterministic_random(&mut s), Err(Error::Unknown));
    }
}
