//! Elements transaction model and its consensus serialization.
//!
//! Only what script verification needs is modelled: confidential asset, value and nonce
//! fields, asset issuances, peg-in markers and the per-input/per-output witnesses that the
//! Elements sighash schemes commit to.

use crate::constants::{OUTPOINT_INDEX_MASK, OUTPOINT_ISSUANCE_FLAG, OUTPOINT_PEGIN_FLAG};
use bitcoin::consensus::Encodable;
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::io::{self, Write};
use bitcoin::{OutPoint, ScriptBuf, Txid, Witness};

const WITNESS_SCALE_FACTOR: usize = 4;

// https://github.com/bitcoin/bitcoin/blob/0903ce8dbc25d3823b03d52f6e6bff74d19e801e/src/serialize.h#L305
pub fn write_compact_size<W: Write + ?Sized>(writer: &mut W, size: u64) -> io::Result<usize> {
    if size < 253 {
        writer.write_all(&[size as u8])?;
        Ok(1)
    } else if size <= 0xFFFF {
        writer.write_all(&[253])?;
        writer.write_all(&(size as u16).to_le_bytes())?;
        Ok(3)
    } else if size <= 0xFFFF_FFFF {
        writer.write_all(&[254])?;
        writer.write_all(&(size as u32).to_le_bytes())?;
        Ok(5)
    } else {
        writer.write_all(&[255])?;
        writer.write_all(&size.to_le_bytes())?;
        Ok(9)
    }
}

/// Serializes `value` into a fresh buffer.
pub fn serialize<T: Encodable + ?Sized>(value: &T) -> Vec<u8> {
    let mut data = Vec::new();
    value
        .consensus_encode(&mut data)
        .expect("Writing to Vec<u8> never fails; qed");
    data
}

fn encode_bytes<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> io::Result<usize> {
    let len = write_compact_size(writer, bytes.len() as u64)?;
    writer.write_all(bytes)?;
    Ok(len + bytes.len())
}

macro_rules! impl_confidential {
    ($name:ident, $explicit:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            /// Absent field, serialized as a single zero byte.
            #[default]
            Null,
            Explicit($explicit),
            /// Pedersen or generator commitment, prefix byte included.
            Confidential([u8; 33]),
        }

        impl $name {
            pub fn is_null(&self) -> bool {
                matches!(self, Self::Null)
            }

            pub fn is_explicit(&self) -> bool {
                matches!(self, Self::Explicit(_))
            }

            /// The serialized commitment: empty when null, otherwise prefix byte and payload.
            pub fn commitment(&self) -> Vec<u8> {
                if self.is_null() {
                    Vec::new()
                } else {
                    serialize(self)
                }
            }
        }
    };
}

impl_confidential!(Asset, [u8; 32], "Asset tag of an output, explicit or blinded.");
impl_confidential!(Value, u64, "Amount of an output, explicit or blinded.");
impl_confidential!(Nonce, [u8; 32], "ECDH nonce of an output, used to unblind it.");

impl Encodable for Asset {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        match self {
            Self::Null => writer.write_all(&[0]).map(|_| 1),
            Self::Explicit(id) => {
                writer.write_all(&[1])?;
                writer.write_all(id)?;
                Ok(33)
            }
            Self::Confidential(commitment) => writer.write_all(commitment).map(|_| 33),
        }
    }
}

impl Encodable for Value {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        match self {
            Self::Null => writer.write_all(&[0]).map(|_| 1),
            // Explicit amounts are the only big-endian integers of the format.
            Self::Explicit(amount) => {
                writer.write_all(&[1])?;
                writer.write_all(&amount.to_be_bytes())?;
                Ok(9)
            }
            Self::Confidential(commitment) => writer.write_all(commitment).map(|_| 33),
        }
    }
}

impl Encodable for Nonce {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        match self {
            Self::Null => writer.write_all(&[0]).map(|_| 1),
            Self::Explicit(nonce) => {
                writer.write_all(&[1])?;
                writer.write_all(nonce)?;
                Ok(33)
            }
            Self::Confidential(commitment) => writer.write_all(commitment).map(|_| 33),
        }
    }
}

/// Issuance or reissuance of an asset, attached to an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetIssuance {
    /// Zero for a new issuance, the blinding factor of the reissuance token otherwise.
    pub asset_blinding_nonce: [u8; 32],
    /// Contract hash for a new issuance, the asset entropy for a reissuance.
    pub asset_entropy: [u8; 32],
    pub amount: Value,
    pub inflation_keys: Value,
}

impl AssetIssuance {
    pub fn is_null(&self) -> bool {
        self.amount.is_null() && self.inflation_keys.is_null()
    }
}

impl Encodable for AssetIssuance {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(&self.asset_blinding_nonce)?;
        writer.write_all(&self.asset_entropy)?;
        let mut len = 64;
        len += self.amount.consensus_encode(writer)?;
        len += self.inflation_keys.consensus_encode(writer)?;
        Ok(len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: ScriptBuf,
    pub sequence: u32,
    pub asset_issuance: AssetIssuance,
    pub is_pegin: bool,
}

impl TxIn {
    /// The outpoint flag byte committed to by the Taproot sighash and introspection.
    pub fn outpoint_flag(&self) -> u8 {
        let mut flag = 0;
        if !self.asset_issuance.is_null() {
            flag |= (OUTPOINT_ISSUANCE_FLAG >> 24) as u8;
        }
        if self.is_pegin {
            flag |= (OUTPOINT_PEGIN_FLAG >> 24) as u8;
        }
        flag
    }

    fn is_coinbase(&self) -> bool {
        self.previous_output.vout == u32::MAX
    }
}

impl Encodable for TxIn {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut vout = self.previous_output.vout;
        let has_issuance = !self.asset_issuance.is_null();
        if !self.is_coinbase() {
            vout &= OUTPOINT_INDEX_MASK;
            if has_issuance {
                vout |= OUTPOINT_ISSUANCE_FLAG;
            }
            if self.is_pegin {
                vout |= OUTPOINT_PEGIN_FLAG;
            }
        }

        let mut len = self.previous_output.txid.consensus_encode(writer)?;
        len += vout.consensus_encode(writer)?;
        len += self.script_sig.consensus_encode(writer)?;
        len += self.sequence.consensus_encode(writer)?;
        if has_issuance && !self.is_coinbase() {
            len += self.asset_issuance.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxOut {
    pub asset: Asset,
    pub value: Value,
    pub nonce: Nonce,
    pub script_pubkey: ScriptBuf,
}

impl Encodable for TxOut {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut len = self.asset.consensus_encode(writer)?;
        len += self.value.consensus_encode(writer)?;
        len += self.nonce.consensus_encode(writer)?;
        len += self.script_pubkey.consensus_encode(writer)?;
        Ok(len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxInWitness {
    pub issuance_amount_rangeproof: Vec<u8>,
    pub inflation_keys_rangeproof: Vec<u8>,
    pub script_witness: Witness,
    pub pegin_witness: Witness,
}

impl TxInWitness {
    pub fn is_null(&self) -> bool {
        self.issuance_amount_rangeproof.is_empty()
            && self.inflation_keys_rangeproof.is_empty()
            && self.script_witness.is_empty()
            && self.pegin_witness.is_empty()
    }
}

impl Encodable for TxInWitness {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut len = encode_bytes(writer, &self.issuance_amount_rangeproof)?;
        len += encode_bytes(writer, &self.inflation_keys_rangeproof)?;
        len += self.script_witness.consensus_encode(writer)?;
        len += self.pegin_witness.consensus_encode(writer)?;
        Ok(len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxOutWitness {
    pub surjection_proof: Vec<u8>,
    pub rangeproof: Vec<u8>,
}

impl TxOutWitness {
    pub fn is_null(&self) -> bool {
        self.surjection_proof.is_empty() && self.rangeproof.is_empty()
    }
}

impl Encodable for TxOutWitness {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut len = encode_bytes(writer, &self.surjection_proof)?;
        len += encode_bytes(writer, &self.rangeproof)?;
        Ok(len)
    }
}

/// Witness section of a transaction.
///
/// Either list may be shorter than the matching input or output list, missing entries
/// are treated as null witnesses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxWitness {
    pub inputs: Vec<TxInWitness>,
    pub outputs: Vec<TxOutWitness>,
}

impl TxWitness {
    pub fn is_null(&self) -> bool {
        self.inputs.iter().all(TxInWitness::is_null)
            && self.outputs.iter().all(TxOutWitness::is_null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub version: i32,
    pub input: Vec<TxIn>,
    pub output: Vec<TxOut>,
    pub lock_time: u32,
    pub witness: TxWitness,
}

impl Transaction {
    /// Script witness of input `index`, empty if the witness list is short.
    pub fn script_witness(&self, index: usize) -> Option<&Witness> {
        self.witness.inputs.get(index).map(|w| &w.script_witness)
    }

    pub fn input_witness(&self, index: usize) -> Option<&TxInWitness> {
        self.witness.inputs.get(index)
    }

    pub fn output_witness(&self, index: usize) -> Option<&TxOutWitness> {
        self.witness.outputs.get(index)
    }

    pub fn txid(&self) -> Txid {
        let mut data = Vec::new();
        self.encode_with_witness(&mut data, false)
            .expect("Writing to Vec<u8> never fails; qed");
        Txid::from_raw_hash(sha256d::Hash::hash(&data))
    }

    pub fn base_size(&self) -> usize {
        let mut data = Vec::new();
        self.encode_with_witness(&mut data, false)
            .expect("Writing to Vec<u8> never fails; qed");
        data.len()
    }

    pub fn total_size(&self) -> usize {
        serialize(self).len()
    }

    /// `base_size * 3 + total_size`.
    pub fn weight(&self) -> usize {
        self.base_size() * (WITNESS_SCALE_FACTOR - 1) + self.total_size()
    }

    fn encode_with_witness<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        include_witness: bool,
    ) -> io::Result<usize> {
        let has_witness = include_witness && !self.witness.is_null();

        let mut len = self.version.consensus_encode(writer)?;
        // Unlike Bitcoin, the flag byte is always present.
        len += u8::from(has_witness).consensus_encode(writer)?;

        len += write_compact_size(writer, self.input.len() as u64)?;
        for input in &self.input {
            len += input.consensus_encode(writer)?;
        }
        len += write_compact_size(writer, self.output.len() as u64)?;
        for output in &self.output {
            len += output.consensus_encode(writer)?;
        }
        len += self.lock_time.consensus_encode(writer)?;

        if has_witness {
            let null_input = TxInWitness::default();
            for index in 0..self.input.len() {
                len += self
                    .input_witness(index)
                    .unwrap_or(&null_input)
                    .consensus_encode(writer)?;
            }
            let null_output = TxOutWitness::default();
            for index in 0..self.output.len() {
                len += self
                    .output_witness(index)
                    .unwrap_or(&null_output)
                    .consensus_encode(writer)?;
            }
        }

        Ok(len)
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        self.encode_with_witness(writer, true)
    }
}
