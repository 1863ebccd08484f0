//! Signing services.
//!
//! [`mint::MintSigner`] authorizes wrapped issuance on Ethereum with an
//! EIP-712 signature per validator; [`burn::BurnSigner`] builds and
//! countersigns the Pocket multisig transactions that pay out burns and
//! refund invalid mints. Both append at most one signature per validator
//! per record, enforced by conditional updates rather than locks.

pub mod burn;
pub mod mint;

pub use burn::BurnSigner;
pub use mint::MintSigner;
