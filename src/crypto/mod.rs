//! Cryptographic Operations Module
//!
//! This module holds the Ethereum signing primitives: EIP-712 typed-data
//! hashing for mint authorizations and secp256k1 ECDSA signing with a
//! recovery id, so the resulting 65-byte signatures can be verified by the
//! mint controller contract.
//!
//! Private keys are loaded once at startup and never serialized or logged.

use anyhow::{anyhow, Context, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::eth_client::keccak256;
use crate::models::MintData;
use crate::util::strip_hex_prefix;

/// Type string of the EIP-712 domain.
const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Type string of the mint authorization struct.
const MINT_DATA_TYPE: &str = "MintData(address recipient,uint256 amount,uint256 nonce)";

/// Name and version of the mint controller's signing domain.
const DOMAIN_NAME: &str = "MintController";
const DOMAIN_VERSION: &str = "1";

// ============================================================================
// EIP-712 HASHING
// ============================================================================

/// EIP-712 signing domain of the mint controller contract.
#[derive(Debug, Clone)]
pub struct Eip712Domain {
    chain_id: String,
    verifying_contract: String,
}

impl Eip712Domain {
    pub fn new(chain_id: &str, verifying_contract: &str) -> Self {
        Eip712Domain {
            chain_id: chain_id.to_string(),
            verifying_contract: verifying_contract.to_lowercase(),
        }
    }

    /// Computes the domain separator hash.
    pub fn separator(&self) -> Result<[u8; 32]> {
        let mut encoded = Vec::with_capacity(160);
        encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_TYPE.as_bytes()));
        encoded.extend_from_slice(&keccak256(DOMAIN_NAME.as_bytes()));
        encoded.extend_from_slice(&keccak256(DOMAIN_VERSION.as_bytes()));
        encoded.extend_from_slice(&encode_uint(&self.chain_id)?);
        encoded.extend_from_slice(&encode_address(&self.verifying_contract)?);
        Ok(keccak256(&encoded))
    }
}

/// Computes the EIP-712 digest of a mint authorization under the given
/// domain. Deterministic across validators for identical inputs.
pub fn mint_data_digest(domain: &Eip712Domain, data: &MintData) -> Result<[u8; 32]> {
    let mut encoded = Vec::with_capacity(128);
    encoded.extend_from_slice(&keccak256(MINT_DATA_TYPE.as_bytes()));
    encoded.extend_from_slice(&encode_address(&data.recipient)?);
    encoded.extend_from_slice(&encode_uint(&data.amount)?);
    encoded.extend_from_slice(&encode_uint(&data.nonce)?);
    let struct_hash = keccak256(&encoded);

    let separator = domain.separator()?;
    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(&[0x19, 0x01]);
    message.extend_from_slice(&separator);
    message.extend_from_slice(&struct_hash);
    Ok(keccak256(&message))
}

/// ABI-encodes a decimal integer string as a 32-byte big-endian word.
fn encode_uint(value: &str) -> Result<[u8; 32]> {
    let value: u128 = value
        .parse()
        .with_context(|| format!("invalid uint value: {}", value))?;
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    Ok(word)
}

/// ABI-encodes a 20-byte hex address as a left-padded 32-byte word.
fn encode_address(address: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(strip_hex_prefix(address))
        .with_context(|| format!("invalid address: {}", address))?;
    if bytes.len() != 20 {
        return Err(anyhow!("invalid address length: {}", bytes.len()));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

// ============================================================================
// ECDSA SIGNER
// ============================================================================

/// This validator's Ethereum signing identity.
pub struct EthSigner {
    signing_key: SigningKey,
    address: String,
}

impl EthSigner {
    /// Loads the signer from a hex-encoded secp256k1 private key.
    pub fn from_hex_key(private_key: &str) -> Result<Self> {
        let bytes = hex::decode(strip_hex_prefix(private_key))
            .context("invalid ethereum private key hex")?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| anyhow!("invalid ethereum private key: {}", e))?;
        let address = eth_address(signing_key.verifying_key());
        Ok(EthSigner {
            signing_key,
            address,
        })
    }

    /// This validator's Ethereum address, lowercase 0x hex.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Signs a 32-byte digest, returning the 65-byte `r || s || v`
    /// signature as 0x hex with `v` in Ethereum's 27/28 convention.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String> {
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| anyhow!("failed to sign digest: {}", e))?;
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

/// Derives the Ethereum address of a secp256k1 public key: the last 20
/// bytes of the keccak hash of the uncompressed point.
pub fn eth_address(verifying_key: &VerifyingKey) -> String {
    let point = verifying_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Recovers the signer address of a 65-byte `r || s || v` signature over
/// the given digest.
pub fn recover_address(digest: &[u8; 32], signature_hex: &str) -> Result<String> {
    let bytes = hex::decode(strip_hex_prefix(signature_hex)).context("invalid signature hex")?;
    if bytes.len() != 65 {
        return Err(anyhow!("invalid signature length: {}", bytes.len()));
    }
    let signature =
        Signature::from_slice(&bytes[..64]).map_err(|e| anyhow!("invalid signature: {}", e))?;
    let v = bytes[64]
        .checked_sub(27)
        .ok_or_else(|| anyhow!("invalid recovery byte: {}", bytes[64]))?;
    let recovery_id =
        RecoveryId::try_from(v).map_err(|e| anyhow!("invalid recovery id: {}", e))?;
    let recovered = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|e| anyhow!("failed to recover signer: {}", e))?;
    Ok(eth_address(&recovered))
}

/// Pairs signers with their signatures and sorts by lowercase signer
/// address, the canonical order the mint controller expects on
/// submission. Applied at read time so partially signed records stay
/// appendable.
pub fn sorted_signature_set(signers: &[String], signatures: &[String]) -> Vec<(String, String)> {
    let mut set: Vec<(String, String)> = signers
        .iter()
        .map(|s| s.to_lowercase())
        .zip(signatures.iter().cloned())
        .collect();
    set.sort_by(|a, b| a.0.cmp(&b.0));
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> EthSigner {
        EthSigner::from_hex_key(
            "0x0101010101010101010101010101010101010101010101010101010101010101",
        )
        .unwrap()
    }

    #[test]
    fn digest_is_deterministic() {
        let domain = Eip712Domain::new("1", "0x00000000000000000000000000000000000000aa");
        let data = MintData {
            recipient: "0x0000000000000000000000000000001234567890".to_string(),
            amount: "100".to_string(),
            nonce: "0".to_string(),
        };
        let a = mint_data_digest(&domain, &data).unwrap();
        let b = mint_data_digest(&domain, &data).unwrap();
        assert_eq!(a, b);

        // any field change moves the digest
        let other = MintData {
            nonce: "1".to_string(),
            ..data
        };
        assert_ne!(a, mint_data_digest(&domain, &other).unwrap());
    }

    #[test]
    fn signature_recovers_to_signer_address() {
        let signer = test_signer();
        let digest = keccak256(b"payload");
        let signature = signer.sign_digest(&digest).unwrap();
        let recovered = recover_address(&digest, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn sorted_signature_set_orders_by_address() {
        let signers = vec![
            "0xBB00000000000000000000000000000000000002".to_string(),
            "0xaa00000000000000000000000000000000000001".to_string(),
        ];
        let signatures = vec!["0x02".to_string(), "0x01".to_string()];
        let sorted = sorted_signature_set(&signers, &signatures);
        assert_eq!(sorted[0].0, "0xaa00000000000000000000000000000000000001");
        assert_eq!(sorted[0].1, "0x01");
        assert_eq!(sorted[1].1, "0x02");
    }
}
