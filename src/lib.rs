//! wPOKT Validator Library
//!
//! This crate implements a validator daemon for a two-chain token bridge:
//! POKT deposited into a multisig vault on the Pocket chain is minted as
//! wPOKT on Ethereum, and wPOKT burned on Ethereum is paid back out on
//! the Pocket chain. A population of independent validators coordinates
//! exclusively through a shared MongoDB record store; every action is
//! re-derived from on-chain data by each validator.
//!
//! The pipeline is six periodic services, three per direction: a monitor
//! that records source-chain events, a signer that adds this validator's
//! signature once an event is deep enough, and an executor that settles
//! or submits on the destination chain.

pub mod config;
pub mod crypto;
pub mod db;
pub mod eth_client;
pub mod executor;
pub mod health;
pub mod models;
pub mod monitor;
pub mod multisig;
pub mod pocket_client;
pub mod service;
pub mod signer;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, DbError};
pub use models::{Burn, InvalidMint, Mint, MintMemo, Status};
