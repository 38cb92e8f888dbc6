use std::sync::Arc;

use async_trait::async_trait;
use escrow_engine::{
    db_types::MinorUnits,
    epp::{Balance, CustomerProfile, DebitRequest, EppPayout, PaymentIntent, PaymentIntentRequest, PayoutInstruction},
    PaymentProcessor,
    ProcessorError,
};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    config::EppConfig,
    data_objects::{Deleted, ObjectId},
    helpers::{connected_account_params, customer_params, error_message, intent_params, FormParams},
    EppApiError,
};

/// Requests made on behalf of a connected account name it in this header
pub const CONNECTED_ACCOUNT_HEADER: &str = "Stripe-Account";

#[derive(Clone)]
pub struct EppApi {
    config: EppConfig,
    client: Arc<Client>,
}

impl EppApi {
    pub fn new(config: EppConfig) -> Result<Self, EppApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let auth = format!("Bearer {}", config.api_key.reveal());
        let mut val = HeaderValue::from_str(&auth).map_err(|e| EppApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert("Authorization", val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| EppApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    /// Sends a form-encoded request. `on_behalf_of` scopes the request to a connected account.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &FormParams,
        on_behalf_of: Option<&str>,
    ) -> Result<T, EppApiError> {
        let url = self.url(path);
        trace!("Sending {method} {url}");
        let mut req = self.client.request(method.clone(), url);
        if !params.is_empty() {
            req = if method == Method::GET { req.query(params) } else { req.form(params) };
        }
        if let Some(account) = on_behalf_of {
            req = req.header(CONNECTED_ACCOUNT_HEADER, account);
        }
        let response = req.send().await.map_err(|e| EppApiError::RestRequestError(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("{path} successful. {status}");
            response.json::<T>().await.map_err(|e| EppApiError::JsonError(e.to_string()))
        } else {
            let body = response.text().await.map_err(|e| EppApiError::RestResponseError(e.to_string()))?;
            let message = error_message(&body);
            debug!("{path} failed with {status}. {message}");
            Err(EppApiError::QueryError { status: status.as_u16(), message })
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: FormParams,
        on_behalf_of: Option<&str>,
    ) -> Result<T, ProcessorError> {
        Ok(self.rest_query(Method::POST, path, &params, on_behalf_of).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ProcessorError> {
        let result: Deleted = self.rest_query(Method::DELETE, path, &vec![], None).await?;
        if !result.deleted {
            return Err(ProcessorError::InvalidResponse(format!("{} was not deleted", result.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for EppApi {
    async fn create_hold(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError> {
        let intent: PaymentIntent = self.post("/payment_intents", intent_params(&request), None).await?;
        info!("Hold {} placed for {} {}", intent.id, intent.amount, intent.currency);
        Ok(intent)
    }

    async fn capture_hold(
        &self,
        hold_id: &str,
        amount: MinorUnits,
        application_fee: MinorUnits,
    ) -> Result<PaymentIntent, ProcessorError> {
        let params = vec![
            ("amount_to_capture".to_string(), amount.value().to_string()),
            ("application_fee_amount".to_string(), application_fee.value().to_string()),
        ];
        let intent: PaymentIntent = self.post(&format!("/payment_intents/{hold_id}/capture"), params, None).await?;
        info!("Hold {hold_id} captured for {amount}");
        Ok(intent)
    }

    async fn cancel_hold(&self, hold_id: &str) -> Result<PaymentIntent, ProcessorError> {
        let intent = self.post(&format!("/payment_intents/{hold_id}/cancel"), vec![], None).await?;
        info!("Hold {hold_id} released");
        Ok(intent)
    }

    async fn create_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError> {
        self.post("/payment_intents", intent_params(&request), None).await
    }

    async fn create_transfer_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError> {
        if request.destination.is_none() {
            return Err(ProcessorError::Rejected("A transfer charge needs a destination account".into()));
        }
        self.post("/payment_intents", intent_params(&request), None).await
    }

    async fn create_debit(&self, request: DebitRequest) -> Result<String, ProcessorError> {
        // An account debit is a charge whose source is the connected account
        let params = vec![
            ("amount".to_string(), request.amount.value().to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("source".to_string(), request.connected_account_id.clone()),
            ("description".to_string(), request.description.clone()),
        ];
        let charge: ObjectId = self.post("/charges", params, None).await?;
        Ok(charge.id)
    }

    async fn create_payout(&self, instruction: PayoutInstruction) -> Result<EppPayout, ProcessorError> {
        let params = vec![
            ("amount".to_string(), instruction.amount.value().to_string()),
            ("currency".to_string(), instruction.currency.clone()),
            ("destination".to_string(), instruction.destination.clone()),
        ];
        let payout: EppPayout = self.post("/payouts", params, Some(&instruction.connected_account_id)).await?;
        info!("Payout {} of {} created for {}", payout.id, payout.amount, instruction.connected_account_id);
        Ok(payout)
    }

    async fn cancel_payout(&self, connected_account_id: &str, payout_id: &str) -> Result<(), ProcessorError> {
        let _: ObjectId = self.post(&format!("/payouts/{payout_id}/cancel"), vec![], Some(connected_account_id)).await?;
        Ok(())
    }

    async fn retrieve_balance(&self, connected_account_id: &str) -> Result<Balance, ProcessorError> {
        Ok(self.rest_query(Method::GET, "/balance", &vec![], Some(connected_account_id)).await?)
    }

    async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, ProcessorError> {
        let customer: ObjectId = self.post("/customers", customer_params(profile), None).await?;
        Ok(customer.id)
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<(), ProcessorError> {
        self.delete(&format!("/customers/{customer_id}")).await
    }

    async fn create_connected_account(&self, profile: &CustomerProfile) -> Result<String, ProcessorError> {
        let account: ObjectId = self.post("/accounts", connected_account_params(profile), None).await?;
        Ok(account.id)
    }

    async fn delete_connected_account(&self, connected_account_id: &str) -> Result<(), ProcessorError> {
        self.delete(&format!("/accounts/{connected_account_id}")).await
    }

    async fn set_default_payment_method(&self, customer_id: &str, method_id: &str) -> Result<(), ProcessorError> {
        let params = vec![("invoice_settings[default_payment_method]".to_string(), method_id.to_string())];
        let _: ObjectId = self.post(&format!("/customers/{customer_id}"), params, None).await?;
        Ok(())
    }

    async fn detach_payment_method(&self, method_id: &str) -> Result<(), ProcessorError> {
        let _: ObjectId = self.post(&format!("/payment_methods/{method_id}/detach"), vec![], None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urls() {
        let api = EppApi::new(EppConfig::new("https://epp.example.com/v1", "sk_test_1")).unwrap();
        assert_eq!(api.url("/payment_intents/pi_1/capture"), "https://epp.example.com/v1/payment_intents/pi_1/capture");
    }

    #[tokio::test]
    async fn unreachable_processor_is_a_transport_error() {
        let mut config = EppConfig::new("http://127.0.0.1:9", "sk_test_1");
        config.timeout = std::time::Duration::from_secs(2);
        let api = EppApi::new(config).unwrap();
        let err = api.cancel_hold("pi_1").await.expect_err("Nothing listens on the discard port");
        assert!(matches!(err, ProcessorError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn transfer_charges_need_a_destination() {
        let api = EppApi::new(EppConfig::default()).unwrap();
        let request = PaymentIntentRequest {
            customer_id: "cus_1".into(),
            payment_method_id: "pm_1".into(),
            amount: MinorUnits::from(4_750),
            currency: "usd".into(),
            description: "Job".into(),
            capture_method: escrow_engine::epp::CaptureMethod::Automatic,
            destination: None,
            application_fee: None,
            metadata: Default::default(),
        };
        let err = api.create_transfer_charge(request).await.expect_err("No destination");
        assert!(matches!(err, ProcessorError::Rejected(_)));
    }
}
