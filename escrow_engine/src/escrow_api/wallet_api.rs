use std::{fmt::Debug, sync::Arc};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    db_types::{MinorUnits, PayoutAccount, Wallet},
    epp::{DebitRequest, EppPayout, PayoutInstruction},
    escrow_api::{at_most_one, call_epp, errors::EscrowError, escrow_objects::validate_amount},
    events::{EventProducers, NotificationEvent, NotificationKind},
    traits::{LedgerScope, LedgerStore, PaymentProcessor},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub user_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    /// The payout account (external id) to pay out to
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutReceipt {
    pub payout: EppPayout,
    pub fee: MinorUnits,
    pub debit_id: String,
}

/// Initiates payouts from a payee's connected account. The payout itself is recorded in the ledger only when the
/// processor reports it (`payout.created`), so this API never writes.
pub struct WalletApi<B> {
    db: B,
    processor: Arc<dyn PaymentProcessor>,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi")
    }
}

impl<B> WalletApi<B> {
    pub fn new(db: B, processor: Arc<dyn PaymentProcessor>, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, processor, config, producers }
    }
}

impl<B> WalletApi<B>
where B: LedgerStore
{
    pub async fn request_payout(&self, req: PayoutRequest) -> Result<PayoutReceipt, EscrowError> {
        validate_amount(req.amount)?;
        if req.destination.trim().is_empty() {
            return Err(EscrowError::validation("A payout destination is required"));
        }
        let (connected, destination, wallet) = self.payout_context(&req).await?;
        let minimum = self.config.fees.minimum_payout();
        if req.amount <= minimum {
            return Err(EscrowError::validation(format!("Payouts must be more than {minimum}")));
        }
        if !wallet.is_active {
            return Err(EscrowError::validation(format!("The {} wallet is not active", wallet.currency)));
        }
        let available = wallet.available_for_payout();
        if available < req.amount {
            info!("💸️ {} asked for {} but only {available} is available", req.user_id, req.amount);
            return Err(EscrowError::InsufficientFunds(format!("{available} is available for payout")));
        }
        let balance =
            call_epp(self.config.epp_timeout, "retrieve_balance", self.processor.retrieve_balance(&connected)).await?;
        let live = balance.available_for_payout(&req.currency, destination.is_bank);
        if live < req.amount {
            info!("💸️ {} asked for {} but the processor only has {live} available", req.user_id, req.amount);
            return Err(EscrowError::InsufficientFunds(format!("{live} is available for payout")));
        }

        let fee = self.config.fees.payout_fee(req.amount);
        let debit = DebitRequest {
            connected_account_id: connected.clone(),
            amount: fee,
            currency: req.currency.clone(),
            description: format!("Payout fee for {}", req.amount),
        };
        let debit_id = call_epp(self.config.epp_timeout, "create_debit", self.processor.create_debit(debit)).await?;
        let instruction = PayoutInstruction {
            connected_account_id: connected,
            destination: destination.external_id.clone(),
            amount: req.amount - fee,
            currency: req.currency.clone(),
        };
        let payout = call_epp(self.config.epp_timeout, "create_payout", self.processor.create_payout(instruction)).await?;
        info!("💸️ Payout {} of {} requested for {} (fee {fee})", payout.id, payout.amount, req.user_id);
        let event =
            NotificationEvent::new(NotificationKind::PayoutRequested, vec![req.user_id.clone()], payout.amount, &payout.currency);
        self.producers.notify(event).await;
        Ok(PayoutReceipt { payout, fee, debit_id })
    }

    async fn payout_context(&self, req: &PayoutRequest) -> Result<(String, PayoutAccount, Wallet), EscrowError> {
        let mut scope = self.db.begin().await?;
        let account = at_most_one(self.db.accounts_for_user(&mut scope, &req.user_id).await?, &req.user_id)?
            .ok_or_else(|| EscrowError::validation(format!("User {} has no payment account", req.user_id)))?;
        let connected = account
            .connected_account_id
            .ok_or_else(|| EscrowError::validation(format!("User {} cannot receive payouts yet", req.user_id)))?;
        let destination = self
            .db
            .payout_account_by_external_id(&mut scope, &req.destination)
            .await?
            .filter(|d| d.user_id == req.user_id)
            .ok_or_else(|| EscrowError::validation(format!("Unknown payout account {}", req.destination)))?;
        if !destination.is_active {
            return Err(EscrowError::validation(format!("Payout account {} is not active", req.destination)));
        }
        let wallet = self.db.fetch_or_create_wallet(&mut scope, &req.user_id, &req.currency).await?;
        scope.commit().await?;
        Ok((connected, destination, wallet))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payout_requests_deserialize() {
        let req: PayoutRequest =
            serde_json::from_str(r#"{"user_id":"bob","amount":2500,"currency":"usd","destination":"ba_1"}"#).unwrap();
        assert_eq!(req.amount, MinorUnits::from(2_500));
        assert_eq!(req.destination, "ba_1");
    }
}
