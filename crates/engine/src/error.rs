use notifyhub_core::credits::Credits;
use notifyhub_core::providers::MissingCredential;
use notifyhub_db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("insufficient credit: {required} required, {available} available")]
    InsufficientCredit {
        required: Credits,
        available: Credits,
        affordable_count: u64,
    },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            StoreError::Conflict(what) => EngineError::Conflict(what),
            other => EngineError::Store(other),
        }
    }
}

impl From<MissingCredential> for EngineError {
    fn from(err: MissingCredential) -> Self {
        EngineError::Provider(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: EngineError = StoreError::NotFound("tenant org_1".into()).into();
        assert!(matches!(err, EngineError::NotFound(ref w) if w == "tenant org_1"));
        assert_eq!(err.to_string(), "tenant org_1 not found");
    }

    #[test]
    fn test_insufficient_credit_message() {
        let err = EngineError::InsufficientCredit {
            required: Credits::whole(7),
            available: Credits::whole(5),
            affordable_count: 5,
        };
        assert_eq!(
            err.to_string(),
            "insufficient credit: 7.00 required, 5.00 available"
        );
    }
}
