//! Pocket multisig signer.
//!
//! Builds and countersigns the vault transactions that pay burns out to
//! their Pocket recipients and refund invalid mints to their senders.
//! The first validator to reach a record builds the transaction and signs
//! it; later validators decode the stored hex and add their own
//! signature. The stored hex is swapped with a compare-and-swap filter on
//! its previous value, so two validators countersigning concurrently
//! cannot silently drop each other's signature: the loser retries on its
//! next tick.

use std::cmp::Ordering;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::SigningKey;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::health::next_sync_time;
use crate::models::{
    Burn, InvalidMint, ServiceHealth, Status, COLLECTION_BURNS, COLLECTION_INVALID_MINTS,
};
use crate::multisig::{
    build_return_sign_doc, signer_address, signing_key_from_hex, MultisigKey, MultisigTx,
};
use crate::pocket_client::PocketClient;
use crate::service::PeriodicService;
use crate::util::{compare_amounts, parse_amount};

pub const BURN_SIGNER_NAME: &str = "burn signer";

pub struct BurnSigner {
    db: Database,
    client: PocketClient,
    signing_key: SigningKey,
    multisig: MultisigKey,
    signer_address: String,
    interval: Duration,
    required_confirmations: u64,
    pokt_chain_id: String,
    tx_fee: u64,
    vault_address: String,
    wpokt_address: String,
    last_sync_time: DateTime,
}

impl BurnSigner {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let signing_key = signing_key_from_hex(&config.pocket.private_key)?;
        let multisig = MultisigKey::new(
            &config.pocket.multisig_public_keys,
            config.pocket.multisig_threshold,
        )?;
        if multisig.index_of(&signing_key.verifying_key()).is_none() {
            return Err(anyhow!("pocket private key is not a vault multisig member"));
        }
        let signer_address = signer_address(&signing_key.verifying_key());
        info!(address = %signer_address, "burn signer identity");
        Ok(BurnSigner {
            db,
            client: PocketClient::new(&config.pocket)?,
            signing_key,
            multisig,
            signer_address,
            interval: Duration::from_secs(config.burn_signer.interval_secs),
            required_confirmations: config.pocket.confirmations,
            pokt_chain_id: config.pocket.chain_id.clone(),
            tx_fee: config.pocket.tx_fee,
            vault_address: config.pocket.vault_address.to_lowercase(),
            wpokt_address: config.ethereum.wrapped_pocket_address.to_lowercase(),
            last_sync_time: DateTime::now(),
        })
    }

    /// Builds a fresh return transaction or countersigns the stored one,
    /// then appends this validator to `signers` and flips the record to
    /// `signed` once the threshold is met.
    async fn sign_return_tx(
        &self,
        collection: &str,
        id: Option<ObjectId>,
        source_hash: &str,
        return_tx: Option<&str>,
        recipient: &str,
        amount: &str,
    ) -> Result<()> {
        if compare_amounts(amount, &self.tx_fee.to_string())? != Ordering::Greater {
            warn!(hash = source_hash, "amount does not cover the network fee");
            let filter = doc! { "_id": id, "status": Status::Confirmed.as_str() };
            let update = doc! { "$set": {
                "status": Status::Failed.as_str(),
                "updated_at": DateTime::now(),
            }};
            self.db.update_one(collection, filter, update).await?;
            return Ok(());
        }
        let return_amount = (parse_amount(amount)? - u128::from(self.tx_fee)).to_string();

        let (signed_hex, previous) = match return_tx {
            None => {
                let sign_doc = build_return_sign_doc(
                    &self.multisig,
                    recipient,
                    &return_amount,
                    source_hash,
                    &self.pokt_chain_id,
                    self.tx_fee,
                );
                let mut tx = MultisigTx::new(sign_doc, &self.multisig);
                tx.add_signature(&self.multisig, &self.signing_key)?;
                (tx.encode()?, Bson::Null)
            }
            Some(tx_hex) => {
                let mut tx = MultisigTx::decode(tx_hex)
                    .with_context(|| format!("stored return tx for {} is invalid", source_hash))?;
                if tx.has_signed(&self.multisig, &self.signing_key.verifying_key()) {
                    debug!(hash = source_hash, "return tx already carries our signature");
                    return Ok(());
                }
                tx.add_signature(&self.multisig, &self.signing_key)?;
                (tx.encode()?, Bson::String(tx_hex.to_string()))
            }
        };

        let filter = doc! {
            "_id": id,
            "status": Status::Confirmed.as_str(),
            "signers": { "$ne": &self.signer_address },
            "return_tx": previous,
        };
        let update = doc! {
            "$push": { "signers": &self.signer_address },
            "$set": { "return_tx": &signed_hex, "updated_at": DateTime::now() },
        };
        let modified = self.db.update_one(collection, filter, update).await?;
        if modified == 0 {
            debug!(hash = source_hash, "return tx changed underneath us, retrying next tick");
            return Ok(());
        }
        info!(hash = source_hash, collection, "signed return tx");

        let mut signed_filter: Document = doc! { "_id": id, "status": Status::Confirmed.as_str() };
        signed_filter.insert(
            format!("signers.{}", self.multisig.threshold() - 1),
            doc! { "$exists": true },
        );
        let signed_update = doc! { "$set": {
            "status": Status::Signed.as_str(),
            "updated_at": DateTime::now(),
        }};
        let flipped = self
            .db
            .update_one(collection, signed_filter, signed_update)
            .await?;
        if flipped == 1 {
            info!(hash = source_hash, collection, "return tx fully signed");
        }
        Ok(())
    }

    /// Refreshes the confirmation count of a pending invalid mint.
    /// Returns true once the record is confirmed and ready to sign.
    async fn confirm_invalid_mint(
        &self,
        invalid_mint: &InvalidMint,
        current_height: u64,
    ) -> Result<bool> {
        let height: u64 = invalid_mint.height.parse().with_context(|| {
            format!("invalid height on invalid mint {}", invalid_mint.transaction_hash)
        })?;
        let confirmations = current_height.saturating_sub(height);
        let filter = doc! { "_id": invalid_mint.id, "status": Status::Pending.as_str() };
        if confirmations >= self.required_confirmations {
            let update = doc! { "$set": {
                "status": Status::Confirmed.as_str(),
                "confirmations": confirmations.to_string(),
                "updated_at": DateTime::now(),
            }};
            let modified = self
                .db
                .update_one(COLLECTION_INVALID_MINTS, filter, update)
                .await?;
            debug!(hash = %invalid_mint.transaction_hash, confirmations, "invalid mint confirmed");
            Ok(modified == 1)
        } else {
            let update = doc! { "$set": {
                "confirmations": confirmations.to_string(),
                "updated_at": DateTime::now(),
            }};
            self.db
                .update_one(COLLECTION_INVALID_MINTS, filter, update)
                .await?;
            Ok(false)
        }
    }

    async fn sync_invalid_mints(&self, current_height: u64) {
        let filter = doc! {
            "vault_address": &self.vault_address,
            "status": { "$in": [Status::Pending.as_str(), Status::Confirmed.as_str()] },
            "signers": { "$ne": &self.signer_address },
        };
        let invalid_mints: Vec<InvalidMint> =
            match self.db.find_many(COLLECTION_INVALID_MINTS, filter).await {
                Ok(records) => records,
                Err(err) => {
                    error!("error fetching invalid mints: {}", err);
                    return;
                }
            };
        debug!(count = invalid_mints.len(), "found invalid mints to sign");

        for invalid_mint in &invalid_mints {
            if invalid_mint.status == Status::Pending {
                match self.confirm_invalid_mint(invalid_mint, current_height).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        error!(
                            hash = %invalid_mint.transaction_hash,
                            "error confirming invalid mint: {}", err
                        );
                        continue;
                    }
                }
            }
            if let Err(err) = self
                .sign_return_tx(
                    COLLECTION_INVALID_MINTS,
                    invalid_mint.id,
                    &invalid_mint.transaction_hash,
                    invalid_mint.return_tx.as_deref(),
                    &invalid_mint.sender_address,
                    &invalid_mint.amount,
                )
                .await
            {
                warn!(
                    hash = %invalid_mint.transaction_hash,
                    "error signing invalid mint return: {}", err
                );
            }
        }
    }

    async fn sync_burns(&self) {
        let filter = doc! {
            "wpokt_address": &self.wpokt_address,
            "status": Status::Confirmed.as_str(),
            "signers": { "$ne": &self.signer_address },
        };
        let burns: Vec<Burn> = match self.db.find_many(COLLECTION_BURNS, filter).await {
            Ok(records) => records,
            Err(err) => {
                error!("error fetching burns: {}", err);
                return;
            }
        };
        debug!(count = burns.len(), "found burns to sign");

        for burn in &burns {
            if let Err(err) = self
                .sign_return_tx(
                    COLLECTION_BURNS,
                    burn.id,
                    &burn.transaction_hash,
                    burn.return_tx.as_deref(),
                    &burn.recipient_address,
                    &burn.amount,
                )
                .await
            {
                warn!(hash = %burn.transaction_hash, "error signing burn return: {}", err);
            }
        }
    }
}

impl PeriodicService for BurnSigner {
    fn name(&self) -> &'static str {
        BURN_SIGNER_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: BURN_SIGNER_NAME.to_string(),
            last_sync_time: self.last_sync_time,
            next_sync_time: next_sync_time(self.last_sync_time, self.interval),
            pokt_height: String::new(),
            eth_block_number: String::new(),
            healthy: true,
        }
    }

    async fn tick(&mut self) {
        debug!("starting burn signing");
        self.last_sync_time = DateTime::now();

        let current_height = match self.client.get_height().await {
            Ok(height) => height,
            Err(err) => {
                error!("error fetching pokt height: {}", err);
                return;
            }
        };

        self.sync_invalid_mints(current_height).await;
        self.sync_burns().await;

        debug!("finished burn signing");
    }
}
