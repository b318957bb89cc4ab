//! Elements Taproot commitments.
//!
//! Elements uses its own hash tags so that a Taproot output can never be confused with a
//! Bitcoin one.

use crate::constants::{
    TAPROOT_CONTROL_BASE_SIZE, TAPROOT_CONTROL_MAX_SIZE, TAPROOT_CONTROL_NODE_SIZE,
    TAPROOT_LEAF_MASK,
};
use crate::transaction::write_compact_size;
use bitcoin::hashes::{Hash, HashEngine, sha256};
use crate::signature_checker::SECP;
use bitcoin::secp256k1::{Parity, Scalar, XOnlyPublicKey};

pub const TAG_TAPLEAF: &str = "TapLeaf/elements";
pub const TAG_TAPBRANCH: &str = "TapBranch/elements";
pub const TAG_TAPTWEAK: &str = "TapTweak/elements";
pub const TAG_TAPSIGHASH: &str = "TapSighash/elements";
/// BIP340 challenge tag, shared with Bitcoin.
pub const TAG_BIP340_CHALLENGE: &str = "BIP0340/challenge";

/// BIP340 tagged hasher: SHA256 pre-fed with `SHA256(tag) || SHA256(tag)`.
pub fn tagged_engine(tag: &str) -> sha256::HashEngine {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    engine
}

pub fn tap_leaf_hash(leaf_version: u8, script: &[u8]) -> sha256::Hash {
    let mut engine = tagged_engine(TAG_TAPLEAF);
    engine.input(&[leaf_version]);
    let mut len = Vec::with_capacity(9);
    write_compact_size(&mut len, script.len() as u64).expect("Writing to Vec<u8> never fails; qed");
    engine.input(&len);
    engine.input(script);
    sha256::Hash::from_engine(engine)
}

/// Combines two nodes of the script tree, smaller one first.
pub fn tap_branch_hash(a: &[u8; 32], b: &[u8; 32]) -> sha256::Hash {
    let mut engine = tagged_engine(TAG_TAPBRANCH);
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    engine.input(first);
    engine.input(second);
    sha256::Hash::from_engine(engine)
}

pub fn tap_tweak_hash(internal_key: &[u8; 32], merkle_root: Option<&[u8; 32]>) -> sha256::Hash {
    let mut engine = tagged_engine(TAG_TAPTWEAK);
    engine.input(internal_key);
    if let Some(root) = merkle_root {
        engine.input(root);
    }
    sha256::Hash::from_engine(engine)
}

/// Whether `len` is a valid control block size: the base plus a whole number of path nodes.
pub fn is_valid_control_size(len: usize) -> bool {
    (TAPROOT_CONTROL_BASE_SIZE..=TAPROOT_CONTROL_MAX_SIZE).contains(&len)
        && (len - TAPROOT_CONTROL_BASE_SIZE) % TAPROOT_CONTROL_NODE_SIZE == 0
}

/// Parsed view of a Taproot control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlBlock<'a> {
    /// Leaf version with the parity bit cleared.
    pub leaf_version: u8,
    pub output_key_parity: Parity,
    pub internal_key: [u8; 32],
    /// Merkle path, a sequence of 32-byte nodes from the leaf upwards.
    pub merkle_branch: &'a [u8],
}

impl<'a> ControlBlock<'a> {
    /// Returns `None` if the size is not valid.
    pub fn parse(control: &'a [u8]) -> Option<Self> {
        if !is_valid_control_size(control.len()) {
            return None;
        }
        let mut internal_key = [0u8; 32];
        internal_key.copy_from_slice(&control[1..TAPROOT_CONTROL_BASE_SIZE]);
        Some(Self {
            leaf_version: control[0] & TAPROOT_LEAF_MASK,
            output_key_parity: if control[0] & 1 == 1 {
                Parity::Odd
            } else {
                Parity::Even
            },
            internal_key,
            merkle_branch: &control[TAPROOT_CONTROL_BASE_SIZE..],
        })
    }

    /// Walks the Merkle path from `tapleaf_hash` up to the root.
    pub fn merkle_root(&self, tapleaf_hash: &sha256::Hash) -> sha256::Hash {
        self.merkle_branch
            .chunks_exact(TAPROOT_CONTROL_NODE_SIZE)
            .fold(*tapleaf_hash, |node, sibling| {
                let mut sibling_bytes = [0u8; 32];
                sibling_bytes.copy_from_slice(sibling);
                tap_branch_hash(node.as_byte_array(), &sibling_bytes)
            })
    }
}

/// Checks that `program` is the internal key of `control` tweaked with the Merkle root
/// derived from `tapleaf_hash` and the control block path.
pub fn verify_taproot_commitment(
    control: &[u8],
    program: &[u8],
    tapleaf_hash: &sha256::Hash,
) -> bool {
    let Some(control_block) = ControlBlock::parse(control) else {
        return false;
    };

    let (Ok(internal_key), Ok(output_key)) = (
        XOnlyPublicKey::from_slice(&control_block.internal_key),
        XOnlyPublicKey::from_slice(program),
    ) else {
        return false;
    };

    let merkle_root = control_block.merkle_root(tapleaf_hash);
    let tweak = tap_tweak_hash(&control_block.internal_key, Some(merkle_root.as_byte_array()));
    let Ok(tweak) = Scalar::from_be_bytes(tweak.to_byte_array()) else {
        return false;
    };

    internal_key.tweak_add_check(
        &SECP,
        &output_key,
        control_block.output_key_parity,
        tweak,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TAPROOT_LEAF_TAPSCRIPT;

    #[test]
    fn control_block_sizes() {
        assert!(!is_valid_control_size(32));
        assert!(is_valid_control_size(33));
        assert!(!is_valid_control_size(34));
        assert!(is_valid_control_size(33 + 32 * 128));
        assert!(!is_valid_control_size(33 + 32 * 129));
    }

    #[test]
    fn branch_hash_is_order_independent() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(tap_branch_hash(&a, &b), tap_branch_hash(&b, &a));
    }

    #[test]
    fn commitment_through_merkle_path() {
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let internal = bitcoin::secp256k1::Keypair::from_secret_key(
            &secp,
            &crate::tests::secret_key(0x21),
        )
        .x_only_public_key()
        .0;

        let leaves = [vec![0x51], vec![0x52, 0x87], vec![0x6a]]
            .map(|script| tap_leaf_hash(TAPROOT_LEAF_TAPSCRIPT, &script));
        let [a, b, c] = leaves.map(|leaf| leaf.to_byte_array());
        let ab = tap_branch_hash(&a, &b).to_byte_array();
        let root = tap_branch_hash(&ab, &c).to_byte_array();

        let tweak = tap_tweak_hash(&internal.serialize(), Some(&root));
        let (output_key, parity) = internal
            .add_tweak(&secp, &Scalar::from_be_bytes(tweak.to_byte_array()).unwrap())
            .unwrap();
        let program = output_key.serialize();

        let paths = [[b, c].concat(), [a, c].concat(), ab.to_vec()];
        for (leaf, path) in leaves.iter().zip(paths) {
            let mut control = vec![TAPROOT_LEAF_TAPSCRIPT | parity.to_u8()];
            control.extend_from_slice(&internal.serialize());
            control.extend_from_slice(&path);

            assert!(verify_taproot_commitment(&control, &program, leaf));

            for index in TAPROOT_CONTROL_BASE_SIZE..control.len() {
                let mut flipped = control.clone();
                flipped[index] ^= 0x01;
                assert!(
                    !verify_taproot_commitment(&flipped, &program, leaf),
                    "path byte {index}"
                );
            }
        }

        // A path that belongs to a different leaf.
        let mut control = vec![TAPROOT_LEAF_TAPSCRIPT | parity.to_u8()];
        control.extend_from_slice(&internal.serialize());
        control.extend_from_slice(&ab);
        assert!(!verify_taproot_commitment(&control, &program, &leaves[0]));
    }

    #[test]
    fn elements_tags_differ_from_bitcoin() {
        let bitcoin_leaf = {
            let mut engine = tagged_engine("TapLeaf");
            engine.input(&[TAPROOT_LEAF_TAPSCRIPT, 0]);
            sha256::Hash::from_engine(engine)
        };
        assert_ne!(tap_leaf_hash(TAPROOT_LEAF_TAPSCRIPT, &[]), bitcoin_leaf);
    }
}
