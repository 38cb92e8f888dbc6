use escrow_engine::ProcessorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EppApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not send request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl From<EppApiError> for ProcessorError {
    fn from(e: EppApiError) -> Self {
        match e {
            // 4xx means the processor looked at the request and said no. Anything else may or may not have landed.
            EppApiError::QueryError { status, message } if (400..500).contains(&status) && status != 429 => {
                ProcessorError::Rejected(message)
            },
            EppApiError::QueryError { status, message } => ProcessorError::Transport(format!("{status}. {message}")),
            EppApiError::RestRequestError(s) | EppApiError::RestResponseError(s) => ProcessorError::Transport(s),
            EppApiError::Initialization(s) => ProcessorError::Transport(s),
            EppApiError::JsonError(s) => ProcessorError::InvalidResponse(s),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn client_errors_are_rejections() {
        let e = EppApiError::QueryError { status: 402, message: "Your card was declined.".into() };
        assert_eq!(ProcessorError::from(e), ProcessorError::Rejected("Your card was declined.".into()));
        let e = EppApiError::QueryError { status: 429, message: "Too many requests".into() };
        assert!(matches!(ProcessorError::from(e), ProcessorError::Transport(_)));
        let e = EppApiError::QueryError { status: 503, message: "Unavailable".into() };
        assert!(matches!(ProcessorError::from(e), ProcessorError::Transport(_)));
        let e = EppApiError::JsonError("missing field `id`".into());
        assert!(matches!(ProcessorError::from(e), ProcessorError::InvalidResponse(_)));
    }
}
