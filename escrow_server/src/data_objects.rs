use std::fmt::Display;

use escrow_engine::GateOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

impl From<GateOutcome> for JsonResponse {
    /// Every outcome is acknowledged with a 2xx so the processor stops redelivering. Only `failed` is reported as
    /// unsuccessful.
    fn from(outcome: GateOutcome) -> Self {
        match outcome {
            GateOutcome::Failed => Self::failure(outcome),
            _ => Self::success(outcome),
        }
    }
}
