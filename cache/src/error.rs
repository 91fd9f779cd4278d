use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again";

/// Every way an inventory operation can fail. The cache rolls back on all of
/// them alike; the variants exist so callers can react (e.g. prompt a login on
/// [`CacheError::Unauthorized`]).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("item {item_id} is not in inventory {container}")]
    UnknownItem { container: String, item_id: String },
}

impl CacheError {
    /// The message carried by the error, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            CacheError::Network(m)
            | CacheError::Unauthorized(m)
            | CacheError::Validation(m)
            | CacheError::Decode(m)
            | CacheError::InvalidInput(m) => m.clone(),
            CacheError::Server { message, .. } => message.clone(),
            CacheError::UnknownItem { .. } => self.to_string(),
        }
    }

    /// Text suitable for showing to the user verbatim.
    pub fn user_message(&self) -> String {
        let message = self.message();
        if message.trim().is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, CacheError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CacheError::Decode(err.to_string())
        } else {
            CacheError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_falls_back_when_empty() {
        assert_eq!(
            CacheError::Network(String::new()).user_message(),
            GENERIC_FAILURE_MESSAGE
        );
        assert_eq!(
            CacheError::Validation("not enough milk".into()).user_message(),
            "not enough milk"
        );
        assert_eq!(
            CacheError::Server {
                status: 502,
                message: " ".into()
            }
            .user_message(),
            GENERIC_FAILURE_MESSAGE
        );
    }
}
