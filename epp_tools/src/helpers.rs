use escrow_engine::epp::{CaptureMethod, CustomerProfile, PaymentIntentRequest};

use crate::data_objects::ApiErrorBody;

pub type FormParams = Vec<(String, String)>;

fn param<K: Into<String>, V: ToString>(key: K, value: V) -> (String, String) {
    (key.into(), value.to_string())
}

/// Form parameters for a confirmed payment intent. Metadata becomes `metadata[key]` entries.
pub fn intent_params(request: &PaymentIntentRequest) -> FormParams {
    let capture_method = match request.capture_method {
        CaptureMethod::Manual => "manual",
        CaptureMethod::Automatic => "automatic",
    };
    let mut params = vec![
        param("customer", &request.customer_id),
        param("payment_method", &request.payment_method_id),
        param("amount", request.amount.value()),
        param("currency", &request.currency),
        param("description", &request.description),
        param("capture_method", capture_method),
        param("confirm", "true"),
        param("off_session", "true"),
    ];
    if let Some(destination) = &request.destination {
        params.push(param("transfer_data[destination]", destination));
    }
    if let Some(fee) = request.application_fee {
        params.push(param("application_fee_amount", fee.value()));
    }
    let mut metadata = request.metadata.iter().collect::<Vec<_>>();
    metadata.sort();
    for (k, v) in metadata {
        params.push(param(format!("metadata[{k}]"), v));
    }
    params
}

pub fn customer_params(profile: &CustomerProfile) -> FormParams {
    let mut params = vec![param("name", profile.full_name())];
    if let Some(email) = &profile.email {
        params.push(param("email", email));
    }
    if let Some(phone) = &profile.phone {
        params.push(param("phone", phone));
    }
    params
}

pub fn connected_account_params(profile: &CustomerProfile) -> FormParams {
    let mut params = vec![
        param("type", "express"),
        param("business_type", "individual"),
        param("individual[first_name]", &profile.first_name),
        param("individual[last_name]", &profile.last_name),
        param("capabilities[transfers][requested]", "true"),
    ];
    if let Some(email) = &profile.email {
        params.push(param("email", email));
    }
    params
}

/// The most useful description of a failed request. Falls back to the raw body when it is not a standard error object.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody { error }) => {
            let message = error.message.unwrap_or_else(|| "Unknown error".to_string());
            match error.decline_code.or(error.code) {
                Some(code) => format!("{message} ({code})"),
                None => message,
            }
        },
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use escrow_engine::db_types::MinorUnits;

    use super::*;

    #[test]
    fn hold_parameters() {
        let request = PaymentIntentRequest {
            customer_id: "cus_1".into(),
            payment_method_id: "pm_1".into(),
            amount: MinorUnits::from(11_700),
            currency: "usd".into(),
            description: "Fix the roof".into(),
            capture_method: CaptureMethod::Manual,
            destination: Some("acct_9".into()),
            application_fee: Some(MinorUnits::from(3_400)),
            metadata: HashMap::from([
                ("job_id".to_string(), "job-1".to_string()),
                ("is_application".to_string(), "false".to_string()),
            ]),
        };
        let params = intent_params(&request);
        let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("amount"), Some("11700"));
        assert_eq!(get("capture_method"), Some("manual"));
        assert_eq!(get("transfer_data[destination]"), Some("acct_9"));
        assert_eq!(get("application_fee_amount"), Some("3400"));
        assert_eq!(get("metadata[job_id]"), Some("job-1"));
        // Sorted metadata keeps requests reproducible
        let keys = params.iter().filter(|(k, _)| k.starts_with("metadata")).map(|(k, _)| k.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["metadata[is_application]", "metadata[job_id]"]);
    }

    #[test]
    fn platform_charges_have_no_destination() {
        let request = PaymentIntentRequest {
            customer_id: "cus_1".into(),
            payment_method_id: "pm_1".into(),
            amount: MinorUnits::from(2_500),
            currency: "usd".into(),
            description: "Listing fee".into(),
            capture_method: CaptureMethod::Automatic,
            destination: None,
            application_fee: None,
            metadata: HashMap::new(),
        };
        let params = intent_params(&request);
        assert!(params.iter().all(|(k, _)| k != "transfer_data[destination]" && k != "application_fee_amount"));
        assert!(params.contains(&("capture_method".to_string(), "automatic".to_string())));
    }

    #[test]
    fn error_messages() {
        let body = r#"{"error":{"message":"Your card was declined.","code":"card_declined","decline_code":"insufficient_funds"}}"#;
        assert_eq!(error_message(body), "Your card was declined. (insufficient_funds)");
        let body = r#"{"error":{"message":"No such customer: 'cus_x'","code":"resource_missing"}}"#;
        assert_eq!(error_message(body), "No such customer: 'cus_x' (resource_missing)");
        assert_eq!(error_message("Bad gateway"), "Bad gateway");
    }

    #[test]
    fn profile_parameters() {
        let profile = CustomerProfile {
            first_name: "Alice".into(),
            last_name: "Smith".into(),
            email: Some("alice@example.com".into()),
            phone: None,
        };
        assert_eq!(customer_params(&profile), vec![
            ("name".to_string(), "Alice Smith".to_string()),
            ("email".to_string(), "alice@example.com".to_string()),
        ]);
        let params = connected_account_params(&profile);
        assert!(params.contains(&("individual[first_name]".to_string(), "Alice".to_string())));
        assert!(params.contains(&("email".to_string(), "alice@example.com".to_string())));
    }
}
