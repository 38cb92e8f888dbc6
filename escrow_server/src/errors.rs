use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use escrow_engine::EscrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Could not process webhook. {0}")]
    Webhook(#[from] EscrowError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Webhook(e) => match e {
                EscrowError::Authentication(_) => StatusCode::UNAUTHORIZED,
                EscrowError::Validation(_) => StatusCode::BAD_REQUEST,
                // The processor redelivers anything outside the 2xx range. 418 marks a delivery we want back.
                EscrowError::RetryRequested(_) => StatusCode::IM_A_TEAPOT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn webhook_status_codes() {
        let status = |e: EscrowError| ServerError::from(e).status_code();
        assert_eq!(status(EscrowError::Authentication("bad signature".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(EscrowError::Validation("not json".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(EscrowError::RetryRequested("later".into())), StatusCode::IM_A_TEAPOT);
        assert_eq!(status(EscrowError::ConsistencyViolation("oops".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
