//! EIP-712 mint signer.
//!
//! Walks mint records this validator has not signed yet. Pending records
//! first have their Pocket confirmation count refreshed and are promoted
//! once deep enough. For confirmed records the signer persists the
//! authorization payload (recipient, amount, per-recipient nonce) with a
//! first-writer-wins update, signs the persisted payload's EIP-712 digest
//! and appends the signature. The record flips to `signed` with the
//! threshold-th signature.
//!
//! The payload is written only while `data` is still absent, so cosigners
//! that derived diverging nonces cannot overwrite a payload that already
//! carries signatures; the append filter re-asserts both the payload's
//! nonce and that this validator is not yet in `signers`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use mongodb::bson::{doc, to_bson, Bson, DateTime, Document};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::crypto::{mint_data_digest, Eip712Domain, EthSigner};
use crate::db::Database;
use crate::eth_client::EthClient;
use crate::health::next_sync_time;
use crate::models::{Mint, MintData, ServiceHealth, Status, COLLECTION_MINTS};
use crate::pocket_client::PocketClient;
use crate::service::PeriodicService;
use crate::util::parse_amount;

pub const MINT_SIGNER_NAME: &str = "mint signer";

pub struct MintSigner {
    db: Database,
    eth_client: EthClient,
    pocket_client: PocketClient,
    signer: EthSigner,
    domain: Eip712Domain,
    interval: Duration,
    threshold: usize,
    required_confirmations: u64,
    mint_controller_address: String,
    wpokt_address: String,
    vault_address: String,
    last_sync_time: DateTime,
}

impl MintSigner {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let signer = EthSigner::from_hex_key(&config.ethereum.private_key)?;
        let in_validator_set = config
            .ethereum
            .validator_addresses
            .iter()
            .any(|address| address.eq_ignore_ascii_case(signer.address()));
        if !in_validator_set {
            return Err(anyhow!(
                "ethereum private key address {} is not in the validator set",
                signer.address()
            ));
        }
        info!(address = signer.address(), "mint signer identity");
        Ok(MintSigner {
            db,
            eth_client: EthClient::new(&config.ethereum)?,
            pocket_client: PocketClient::new(&config.pocket)?,
            domain: Eip712Domain::new(
                &config.ethereum.chain_id,
                &config.ethereum.mint_controller_address,
            ),
            signer,
            interval: Duration::from_secs(config.mint_signer.interval_secs),
            threshold: config.pocket.multisig_threshold,
            required_confirmations: config.pocket.confirmations,
            mint_controller_address: config.ethereum.mint_controller_address.to_lowercase(),
            wpokt_address: config.ethereum.wrapped_pocket_address.to_lowercase(),
            vault_address: config.pocket.vault_address.to_lowercase(),
            last_sync_time: DateTime::now(),
        })
    }

    /// Refreshes the confirmation count of a pending mint. Returns true
    /// once the record is confirmed and ready to sign.
    async fn confirm_mint(&self, mint: &Mint, current_height: u64) -> Result<bool> {
        let height: u64 = mint
            .height
            .parse()
            .with_context(|| format!("invalid height on mint {}", mint.transaction_hash))?;
        let confirmations = current_height.saturating_sub(height);
        if confirmations >= self.required_confirmations {
            let filter = doc! { "_id": mint.id, "status": Status::Pending.as_str() };
            let update = doc! { "$set": {
                "status": Status::Confirmed.as_str(),
                "confirmations": confirmations.to_string(),
                "updated_at": DateTime::now(),
            }};
            let modified = self.db.update_one(COLLECTION_MINTS, filter, update).await?;
            debug!(hash = %mint.transaction_hash, confirmations, "mint confirmed");
            Ok(modified == 1)
        } else {
            let filter = doc! { "_id": mint.id, "status": Status::Pending.as_str() };
            let update = doc! { "$set": {
                "confirmations": confirmations.to_string(),
                "updated_at": DateTime::now(),
            }};
            self.db.update_one(COLLECTION_MINTS, filter, update).await?;
            Ok(false)
        }
    }

    /// Derives the authorization nonce for a mint: the contract's
    /// per-recipient counter, bumped past any nonce already reserved by
    /// another record for the same recipient.
    async fn next_nonce(&self, mint: &Mint) -> Result<u128> {
        let chain_nonce = parse_amount(
            &self
                .eth_client
                .get_user_nonce(&self.mint_controller_address, &mint.recipient_address)
                .await?,
        )?;
        let filter = doc! {
            "recipient_address": &mint.recipient_address,
            "wpokt_address": &self.wpokt_address,
            "vault_address": &self.vault_address,
            "nonce": { "$ne": null },
        };
        let others: Vec<Mint> = self.db.find_many(COLLECTION_MINTS, filter).await?;
        let mut nonce = chain_nonce;
        for other in &others {
            if other.id == mint.id {
                continue;
            }
            if let Some(reserved) = other.nonce.as_deref().and_then(|n| n.parse::<u128>().ok()) {
                nonce = nonce.max(reserved + 1);
            }
        }
        Ok(nonce)
    }

    /// Returns the authorization payload every cosigner signs. The first
    /// signer to reach the record persists its derivation with a filter on
    /// `data` still being absent; losers of that race re-read and sign the
    /// payload that won, so signatures and payload can never diverge.
    async fn ensure_mint_data(&self, mint: &Mint) -> Result<MintData> {
        if let Some(data) = &mint.data {
            return Ok(data.clone());
        }
        let derived = MintData {
            recipient: mint.recipient_address.clone(),
            amount: mint.amount.clone(),
            nonce: self.next_nonce(mint).await?.to_string(),
        };
        let filter = doc! {
            "_id": mint.id,
            "status": Status::Confirmed.as_str(),
            "data": Bson::Null,
        };
        let update = doc! { "$set": {
            "data": to_bson(&derived)?,
            "nonce": &derived.nonce,
            "updated_at": DateTime::now(),
        }};
        let modified = self.db.update_one(COLLECTION_MINTS, filter, update).await?;
        if modified == 1 {
            return Ok(derived);
        }
        debug!(hash = %mint.transaction_hash, "payload derived by another cosigner");
        let persisted: Option<Mint> = self
            .db
            .find_one(COLLECTION_MINTS, doc! { "_id": mint.id })
            .await?;
        persisted
            .and_then(|record| record.data)
            .ok_or_else(|| anyhow!("mint {} has no persisted payload", mint.transaction_hash))
    }

    async fn sign_mint(&self, mint: &Mint) -> Result<()> {
        let data = self.ensure_mint_data(mint).await?;
        let digest = mint_data_digest(&self.domain, &data)?;
        let signature = self.signer.sign_digest(&digest)?;

        let filter = doc! {
            "_id": mint.id,
            "status": Status::Confirmed.as_str(),
            "signers": { "$ne": self.signer.address() },
            "nonce": &data.nonce,
        };
        let update = doc! {
            "$push": {
                "signers": self.signer.address(),
                "signatures": &signature,
            },
            "$set": { "updated_at": DateTime::now() },
        };
        let modified = self.db.update_one(COLLECTION_MINTS, filter, update).await?;
        if modified == 0 {
            debug!(hash = %mint.transaction_hash, "mint already signed or moved on");
            return Ok(());
        }
        info!(hash = %mint.transaction_hash, nonce = %data.nonce, "signed mint");

        // the threshold-th signature flips the record to signed
        let mut signed_filter: Document =
            doc! { "_id": mint.id, "status": Status::Confirmed.as_str() };
        signed_filter.insert(
            format!("signers.{}", self.threshold - 1),
            doc! { "$exists": true },
        );
        let signed_update = doc! { "$set": {
            "status": Status::Signed.as_str(),
            "updated_at": DateTime::now(),
        }};
        let flipped = self
            .db
            .update_one(COLLECTION_MINTS, signed_filter, signed_update)
            .await?;
        if flipped == 1 {
            info!(hash = %mint.transaction_hash, "mint fully signed");
        }
        Ok(())
    }

    async fn sync_mints(&self) {
        let current_height = match self.pocket_client.get_height().await {
            Ok(height) => height,
            Err(err) => {
                error!("error fetching pokt height: {}", err);
                return;
            }
        };

        let filter = doc! {
            "wpokt_address": &self.wpokt_address,
            "vault_address": &self.vault_address,
            "status": { "$in": [Status::Pending.as_str(), Status::Confirmed.as_str()] },
            "signers": { "$ne": self.signer.address() },
        };
        let mints: Vec<Mint> = match self.db.find_many(COLLECTION_MINTS, filter).await {
            Ok(mints) => mints,
            Err(err) => {
                error!("error fetching mints: {}", err);
                return;
            }
        };
        debug!(count = mints.len(), "found mints to sign");

        for mint in &mints {
            if mint.status == Status::Pending {
                match self.confirm_mint(mint, current_height).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        error!(hash = %mint.transaction_hash, "error confirming mint: {}", err);
                        continue;
                    }
                }
            }
            if let Err(err) = self.sign_mint(mint).await {
                warn!(hash = %mint.transaction_hash, "error signing mint: {}", err);
            }
        }
    }
}

impl PeriodicService for MintSigner {
    fn name(&self) -> &'static str {
        MINT_SIGNER_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: MINT_SIGNER_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: String::new(),
            eth_block_number: String::new(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("starting mint signing");
        self.last_sync_time = DateTime::now();
        self.sync_mints().await;
        debug!("finished mint signing");
    }
}
