//! Pocket multisig transactions.
//!
//! The vault on the Pocket chain is owned by an M-of-N ed25519 multisig.
//! Every validator derives the same threshold key from the configured,
//! address-sorted list of public keys; the key's address must equal the
//! configured vault address, which is checked once at startup.
//!
//! A return transaction is built by the first signer and then passed
//! between validators as hex: each cosigner decodes it, adds its own
//! signature into its fixed key slot, and re-encodes. Signature slots are
//! parallel to the configured key order, so decoding always yields the
//! collected signatures in validator-address-sorted order. Sign bytes are
//! the canonical BCS encoding of the transaction body, identical for all
//! cosigners.

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::util::strip_hex_prefix;

// ============================================================================
// KEYS AND ADDRESSES
// ============================================================================

/// Address of a single ed25519 key: the first 20 bytes of the SHA-256 of
/// the public key, lowercase hex.
pub fn signer_address(key: &VerifyingKey) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(&hash[..20])
}

/// Loads an ed25519 signing key from hex. Accepts either a 32-byte seed
/// or the 64-byte seed-plus-public-key form.
pub fn signing_key_from_hex(private_key: &str) -> Result<SigningKey> {
    let bytes = hex::decode(strip_hex_prefix(private_key))
        .context("invalid pocket private key hex")?;
    let seed: [u8; 32] = match bytes.len() {
        32 => bytes.as_slice().try_into().unwrap(),
        64 => bytes[..32].try_into().unwrap(),
        n => return Err(anyhow!("invalid pocket private key length: {}", n)),
    };
    Ok(SigningKey::from_bytes(&seed))
}

/// The vault's M-of-N threshold public key.
#[derive(Debug, Clone)]
pub struct MultisigKey {
    public_keys: Vec<VerifyingKey>,
    threshold: usize,
}

impl MultisigKey {
    /// Builds the threshold key from hex-encoded public keys in their
    /// configured order. The order must be sorted by signer address;
    /// every validator has to derive the identical key.
    pub fn new(hex_keys: &[String], threshold: usize) -> Result<Self> {
        if hex_keys.is_empty() {
            return Err(anyhow!("multisig requires at least one public key"));
        }
        if threshold == 0 || threshold > hex_keys.len() {
            return Err(anyhow!(
                "multisig threshold {} out of range for {} keys",
                threshold,
                hex_keys.len()
            ));
        }
        let mut public_keys = Vec::with_capacity(hex_keys.len());
        for key_hex in hex_keys {
            let bytes = hex::decode(strip_hex_prefix(key_hex))
                .with_context(|| format!("invalid multisig public key hex: {}", key_hex))?;
            let bytes: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("invalid multisig public key length: {}", key_hex))?;
            let key = VerifyingKey::from_bytes(&bytes)
                .map_err(|e| anyhow!("invalid multisig public key {}: {}", key_hex, e))?;
            public_keys.push(key);
        }
        let addresses: Vec<String> = public_keys.iter().map(signer_address).collect();
        if !addresses.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(anyhow!(
                "multisig public keys must be listed in signer-address order"
            ));
        }
        Ok(MultisigKey {
            public_keys,
            threshold,
        })
    }

    /// Address of the threshold key: the first 20 bytes of the SHA-256 of
    /// the big-endian threshold followed by the concatenated public keys.
    pub fn address(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.threshold as u32).to_be_bytes());
        for key in &self.public_keys {
            hasher.update(key.as_bytes());
        }
        let hash = hasher.finalize();
        hex::encode(&hash[..20])
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.public_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }

    /// Slot of the given cosigner key, if it is a member.
    pub fn index_of(&self, key: &VerifyingKey) -> Option<usize> {
        self.public_keys.iter().position(|k| k == key)
    }

    fn key_at(&self, index: usize) -> &VerifyingKey {
        &self.public_keys[index]
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Plain token transfer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
}

/// Body of a Pocket transaction; its BCS encoding is what every
/// cosigner signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignDoc {
    pub chain_id: String,
    pub fee: String,
    pub memo: String,
    pub msg: MsgSend,
}

/// A partially or fully signed multisig transaction. Signature slots are
/// parallel to the threshold key's member order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigTx {
    sign_doc: SignDoc,
    signatures: Vec<Option<Vec<u8>>>,
}

impl MultisigTx {
    /// Starts an unsigned transaction with one empty signature slot per
    /// multisig member.
    pub fn new(sign_doc: SignDoc, key: &MultisigKey) -> Self {
        MultisigTx {
            sign_doc,
            signatures: vec![None; key.len()],
        }
    }

    pub fn sign_doc(&self) -> &SignDoc {
        &self.sign_doc
    }

    /// Canonical bytes every cosigner signs.
    pub fn sign_bytes(&self) -> Result<Vec<u8>> {
        bcs::to_bytes(&self.sign_doc).context("failed to encode sign doc")
    }

    /// Adds this validator's signature into its key slot. Fails if the
    /// signer is not a multisig member or the slot is already filled.
    pub fn add_signature(&mut self, key: &MultisigKey, signing_key: &SigningKey) -> Result<usize> {
        if self.signatures.len() != key.len() {
            return Err(anyhow!(
                "transaction has {} signature slots for a {}-member multisig",
                self.signatures.len(),
                key.len()
            ));
        }
        let index = key
            .index_of(&signing_key.verifying_key())
            .ok_or_else(|| anyhow!("signing key is not a multisig member"))?;
        if self.signatures[index].is_some() {
            return Err(anyhow!("slot {} already carries a signature", index));
        }
        let signature = signing_key.sign(&self.sign_bytes()?);
        self.signatures[index] = Some(signature.to_bytes().to_vec());
        Ok(index)
    }

    /// Number of signatures collected so far.
    pub fn signature_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the given cosigner has already signed.
    pub fn has_signed(&self, key: &MultisigKey, cosigner: &VerifyingKey) -> bool {
        key.index_of(cosigner)
            .map(|index| self.signatures[index].is_some())
            .unwrap_or(false)
    }

    /// Verifies every collected signature against the sign bytes.
    pub fn verify(&self, key: &MultisigKey) -> Result<()> {
        if self.signatures.len() != key.len() {
            return Err(anyhow!("signature slot count does not match multisig"));
        }
        let sign_bytes = self.sign_bytes()?;
        for (index, slot) in self.signatures.iter().enumerate() {
            if let Some(bytes) = slot {
                let bytes: [u8; 64] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow!("invalid signature length in slot {}", index))?;
                let signature = Signature::from_bytes(&bytes);
                key.key_at(index)
                    .verify_strict(&sign_bytes, &signature)
                    .map_err(|e| anyhow!("signature in slot {} does not verify: {}", index, e))?;
            }
        }
        Ok(())
    }

    /// Hex encoding used to pass the transaction through the record store
    /// and to the chain RPC.
    pub fn encode(&self) -> Result<String> {
        Ok(hex::encode(
            bcs::to_bytes(self).context("failed to encode transaction")?,
        ))
    }

    pub fn decode(tx_hex: &str) -> Result<Self> {
        let bytes = hex::decode(strip_hex_prefix(tx_hex)).context("invalid transaction hex")?;
        bcs::from_bytes(&bytes).context("failed to decode transaction")
    }
}

/// Builds the return transaction body: a transfer from the vault to the
/// payout address, carrying the originating transaction hash as memo so
/// the payout can be traced back to its source event.
pub fn build_return_sign_doc(
    key: &MultisigKey,
    to_address: &str,
    amount: &str,
    memo: &str,
    chain_id: &str,
    fee: u64,
) -> SignDoc {
    SignDoc {
        chain_id: chain_id.to_string(),
        fee: fee.to_string(),
        memo: memo.to_string(),
        msg: MsgSend {
            from_address: key.address(),
            to_address: to_address.to_lowercase(),
            amount: amount.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic test keys, reordered so signer addresses ascend.
    fn test_keys() -> (Vec<SigningKey>, MultisigKey) {
        let mut keys: Vec<SigningKey> = (1u8..=3)
            .map(|i| SigningKey::from_bytes(&[i; 32]))
            .collect();
        keys.sort_by_key(|k| signer_address(&k.verifying_key()));
        let hex_keys: Vec<String> = keys
            .iter()
            .map(|k| hex::encode(k.verifying_key().as_bytes()))
            .collect();
        let multisig = MultisigKey::new(&hex_keys, 2).unwrap();
        (keys, multisig)
    }

    fn test_sign_doc(key: &MultisigKey) -> SignDoc {
        build_return_sign_doc(key, "ABCDEF0123", "90", "0xccc", "testnet", 10)
    }

    #[test]
    fn address_is_deterministic_and_order_sensitive() {
        let (_, multisig) = test_keys();
        assert_eq!(multisig.address(), multisig.address());
        assert_eq!(multisig.address().len(), 40);
    }

    #[test]
    fn unsorted_keys_are_rejected() {
        let (keys, _) = test_keys();
        let mut hex_keys: Vec<String> = keys
            .iter()
            .map(|k| hex::encode(k.verifying_key().as_bytes()))
            .collect();
        hex_keys.swap(0, 1);
        assert!(MultisigKey::new(&hex_keys, 2).is_err());
    }

    #[test]
    fn countersigning_round_trips_through_hex() {
        let (keys, multisig) = test_keys();
        let mut tx = MultisigTx::new(test_sign_doc(&multisig), &multisig);
        tx.add_signature(&multisig, &keys[0]).unwrap();
        let encoded = tx.encode().unwrap();

        let mut decoded = MultisigTx::decode(&encoded).unwrap();
        assert_eq!(decoded.signature_count(), 1);
        decoded.add_signature(&multisig, &keys[2]).unwrap();
        let encoded = decoded.encode().unwrap();

        let final_tx = MultisigTx::decode(&encoded).unwrap();
        assert_eq!(final_tx.signature_count(), 2);
        final_tx.verify(&multisig).unwrap();
        assert_eq!(final_tx.sign_doc(), tx.sign_doc());
    }

    #[test]
    fn double_signing_same_slot_fails() {
        let (keys, multisig) = test_keys();
        let mut tx = MultisigTx::new(test_sign_doc(&multisig), &multisig);
        tx.add_signature(&multisig, &keys[1]).unwrap();
        assert!(tx.add_signature(&multisig, &keys[1]).is_err());
        assert!(tx.has_signed(&multisig, &keys[1].verifying_key()));
        assert!(!tx.has_signed(&multisig, &keys[0].verifying_key()));
    }

    #[test]
    fn non_member_cannot_sign() {
        let (_, multisig) = test_keys();
        let outsider = SigningKey::from_bytes(&[9u8; 32]);
        let mut tx = MultisigTx::new(test_sign_doc(&multisig), &multisig);
        assert!(tx.add_signature(&multisig, &outsider).is_err());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let (keys, multisig) = test_keys();
        let mut tx = MultisigTx::new(test_sign_doc(&multisig), &multisig);
        tx.add_signature(&multisig, &keys[0]).unwrap();
        tx.sign_doc.msg.amount = "900000".to_string();
        assert!(tx.verify(&multisig).is_err());
    }
}
