use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use log::*;

use crate::{
    config::EngineConfig,
    db_types::{Invoice, NewPaymentAccount, PaymentAccount, PaymentMethod, Wallet},
    epp::CustomerProfile,
    escrow_api::{at_most_one, call_epp, errors::EscrowError},
    helpers::with_retries,
    saga::Saga,
    traits::{
        AccountInfo,
        AccountManagement,
        HistoryEntry,
        LedgerError,
        LedgerScope,
        LedgerStore,
        Pagination,
        PaymentProcessor,
    },
};

/// Which processor identity an account is being opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Customer,
    Payee,
}

/// Account and payment-method management, plus the read queries that back a user's payment screens.
pub struct AccountApi<B> {
    db: B,
    processor: Arc<dyn PaymentProcessor>,
    config: EngineConfig,
}

impl<B> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi")
    }
}

impl<B> AccountApi<B> {
    pub fn new(db: B, processor: Arc<dyn PaymentProcessor>, config: EngineConfig) -> Self {
        Self { db, processor, config }
    }
}

impl<B> AccountApi<B>
where B: LedgerStore
{
    /// Makes sure `user_id` can pay: creates the processor customer if the user does not have one yet.
    pub async fn open_customer_account(
        &self,
        user_id: &str,
        profile: &CustomerProfile,
    ) -> Result<PaymentAccount, EscrowError> {
        self.open_account(user_id, profile, Role::Customer).await
    }

    /// Makes sure `user_id` can be paid: creates the processor connected account if the user does not have one yet.
    pub async fn open_payee_account(
        &self,
        user_id: &str,
        profile: &CustomerProfile,
    ) -> Result<PaymentAccount, EscrowError> {
        self.open_account(user_id, profile, Role::Payee).await
    }

    async fn open_account(
        &self,
        user_id: &str,
        profile: &CustomerProfile,
        role: Role,
    ) -> Result<PaymentAccount, EscrowError> {
        if user_id.trim().is_empty() {
            return Err(EscrowError::validation("A user id is required"));
        }
        let existing = {
            let mut scope = self.db.begin().await?;
            let existing = at_most_one(self.db.accounts_for_user(&mut scope, user_id).await?, user_id)?;
            scope.rollback().await?;
            existing
        };
        let has_identity = |a: &PaymentAccount| match role {
            Role::Customer => a.customer_id.is_some(),
            Role::Payee => a.connected_account_id.is_some(),
        };
        if let Some(account) = existing.as_ref().filter(|a| has_identity(a)) {
            debug!("🔄️ {user_id} already has a {role:?} identity");
            return Ok(account.clone());
        }

        let timeout = self.config.epp_timeout;
        let processor = Arc::clone(&self.processor);
        let mut saga = Saga::new(format!("open_{role:?}_account").to_lowercase());
        let external_id = match role {
            Role::Customer => {
                let create = call_epp(timeout, "create_customer", self.processor.create_customer(profile));
                saga.step("create customer", create, |id: &String| undo(processor, timeout, role, id.clone())).await
            },
            Role::Payee => {
                let create =
                    call_epp(timeout, "create_connected_account", self.processor.create_connected_account(profile));
                saga.step("create connected account", create, |id: &String| undo(processor, timeout, role, id.clone()))
                    .await
            },
        };
        let external_id = match external_id {
            Ok(id) => id,
            Err(e) => {
                saga.abort().await;
                return Err(e);
            },
        };
        let result = with_retries(&self.config.retry, "open_account", || async {
            let mut scope = self.db.begin().await?;
            let account = match existing.as_ref() {
                Some(a) if role == Role::Customer => self.db.set_customer_id(&mut scope, a.id, &external_id).await?,
                Some(a) => self.db.set_connected_account_id(&mut scope, a.id, Some(&external_id)).await?,
                None => {
                    let new_account = match role {
                        Role::Customer => NewPaymentAccount::new(user_id).with_customer_id(external_id.as_str()),
                        Role::Payee => NewPaymentAccount::new(user_id).with_connected_account_id(external_id.as_str()),
                    };
                    self.db.insert_payment_account(&mut scope, new_account).await?
                },
            };
            scope.commit().await?;
            Ok::<_, LedgerError>(account)
        })
        .await
        .map_err(EscrowError::from);
        let account = saga.settle(result).await?;
        info!("🔄️ {user_id} linked to {external_id}");
        Ok(account)
    }

    /// Makes `method_id` the user's default payment method, at the processor and in the ledger.
    pub async fn set_default_method(&self, user_id: &str, method_id: &str) -> Result<PaymentMethod, EscrowError> {
        let mut scope = self.db.begin().await?;
        let account = at_most_one(self.db.accounts_for_user(&mut scope, user_id).await?, user_id)?
            .ok_or_else(|| EscrowError::validation(format!("User {user_id} has no payment account")))?;
        let customer_id = account
            .customer_id
            .ok_or_else(|| EscrowError::validation(format!("User {user_id} has no customer identity")))?;
        self.owned_method(&mut scope, user_id, method_id).await?;
        scope.rollback().await?;

        let set = self.processor.set_default_payment_method(&customer_id, method_id);
        call_epp(self.config.epp_timeout, "set_default_payment_method", set).await?;
        let method = with_retries(&self.config.retry, "set_default_method", || async {
            let mut scope = self.db.begin().await?;
            let m = self.db.mark_default_payment_method(&mut scope, user_id, method_id).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(m)
        })
        .await?;
        debug!("🔄️ {method_id} is now the default payment method for {user_id}");
        Ok(method)
    }

    /// Detaches a payment method. Refused while an uncaptured hold was placed with the same card.
    pub async fn delete_method(&self, user_id: &str, method_id: &str) -> Result<(), EscrowError> {
        let mut scope = self.db.begin().await?;
        let method = self.owned_method(&mut scope, user_id, method_id).await?;
        let fingerprint = method.details.fingerprint.clone().unwrap_or_default();
        let holds = self.db.uncaptured_count_for_fingerprint(&mut scope, user_id, &fingerprint).await?;
        scope.rollback().await?;
        if holds > 0 {
            return Err(EscrowError::validation(format!(
                "Payment method {method_id} is used by {holds} uncaptured payments"
            )));
        }
        let detach = self.processor.detach_payment_method(method_id);
        call_epp(self.config.epp_timeout, "detach_payment_method", detach).await?;
        with_retries(&self.config.retry, "delete_method", || async {
            let mut scope = self.db.begin().await?;
            self.db.delete_payment_method(&mut scope, method_id).await?;
            scope.commit().await
        })
        .await?;
        info!("🔄️ Payment method {method_id} removed for {user_id}");
        Ok(())
    }

    //---------------------------------------   Reads   -----------------------------------------------------------
    pub async fn account_info(&self, user_id: &str) -> Result<AccountInfo, EscrowError> {
        let account = at_most_one(self.db.fetch_payment_accounts(user_id).await?, user_id)?
            .ok_or_else(|| EscrowError::validation(format!("User {user_id} has no payment account")))?;
        let wallets = self.db.fetch_wallets(user_id).await?;
        let payout_accounts = self.db.fetch_payout_accounts(user_id).await?;
        let payment_methods = self.db.fetch_payment_methods(user_id).await?;
        Ok(AccountInfo { account, wallets, payout_accounts, payment_methods })
    }

    /// The user's wallet in `currency`, if they have ever had a balance in it.
    pub async fn balance(&self, user_id: &str, currency: &str) -> Result<Option<Wallet>, EscrowError> {
        Ok(self.db.fetch_wallet(user_id, currency).await?)
    }

    pub async fn transaction_history(
        &self,
        user_id: &str,
        page: Pagination,
    ) -> Result<Vec<HistoryEntry>, EscrowError> {
        check_page(page)?;
        Ok(self.db.transaction_history(user_id, page).await?)
    }

    pub async fn invoices(&self, user_id: &str, page: Pagination) -> Result<Vec<Invoice>, EscrowError> {
        check_page(page)?;
        Ok(self.db.invoices_for_user(user_id, page).await?)
    }

    async fn owned_method(
        &self,
        scope: &mut B::Scope,
        user_id: &str,
        method_id: &str,
    ) -> Result<PaymentMethod, EscrowError> {
        self.db
            .payment_method_by_external_id(scope, method_id)
            .await?
            .filter(|m| m.user_id == user_id)
            .ok_or_else(|| EscrowError::validation(format!("Payment method {method_id} does not belong to {user_id}")))
    }
}

fn check_page(page: Pagination) -> Result<(), EscrowError> {
    if page.is_valid() {
        Ok(())
    } else {
        Err(EscrowError::validation(format!("Invalid page {} (limit {})", page.page, page.limit)))
    }
}

fn undo(
    processor: Arc<dyn PaymentProcessor>,
    timeout: Duration,
    role: Role,
    id: String,
) -> impl Future<Output = Result<(), String>> + Send + 'static {
    async move {
        let result = match role {
            Role::Customer => tokio::time::timeout(timeout, processor.delete_customer(&id)).await,
            Role::Payee => tokio::time::timeout(timeout, processor.delete_connected_account(&id)).await,
        };
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Could not delete {id}. {e}")),
            Err(_) => Err(format!("Deleting {id} timed out")),
        }
    }
}
