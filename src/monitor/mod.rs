//! Source-chain monitors.
//!
//! One monitor per direction: [`mint::MintMonitor`] watches Pocket for
//! deposits into the vault, [`burn::BurnMonitor`] watches the wrapped
//! token contract on Ethereum for burn-and-bridge events. Monitors are the
//! only services that create records; unique indexes make re-scanning a
//! window after a partial failure safe.

pub mod burn;
pub mod mint;

pub use burn::BurnMonitor;
pub use mint::MintMonitor;
