//! Destination-chain executors.
//!
//! [`mint::MintExecutor`] watches Ethereum for `Minted` events and settles
//! the matching mint records; [`burn::BurnExecutor`] broadcasts fully
//! signed Pocket return transactions and watches for their inclusion.

pub mod burn;
pub mod mint;

pub use burn::BurnExecutor;
pub use mint::MintExecutor;
