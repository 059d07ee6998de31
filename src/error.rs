//! Typed errors for the seams where callers branch on the failure kind.
//!
//! Application-level flows (config, CLI commands, ingestion, startup) use
//! `anyhow::Result`; the pipeline's dependency calls return these instead so
//! that fallbacks are visible in signatures.

/// The vector index could not answer a similarity search.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
    #[error("query embedding failed: {0}")]
    Embedding(String),
}

/// A call to the hosted translation API did not produce usable text.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Request(String),
    #[error("translation API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("translation API returned an empty result")]
    Empty,
}

/// A call to the hosted chat-completion API failed.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Request(String),
    #[error("chat API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed chat response: {0}")]
    Malformed(String),
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
}

/// Pose checking failures that surface as client errors.
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Invalid image")]
    InvalidImage,
    #[error("pose estimator failed: {0}")]
    Estimator(String),
    #[error("failed to save annotated image: {0}")]
    Save(String),
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        TranslationError::Request(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TranslationError::Empty.to_string(),
            "translation API returned an empty result"
        );
        let err = ChatError::Status {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "chat API returned 503: overloaded");
        assert_eq!(PoseError::InvalidImage.to_string(), "Invalid image");
        assert_eq!(
            ChatError::MissingApiKey("FANAR_API_KEY".to_string()).to_string(),
            "FANAR_API_KEY environment variable not set"
        );
    }
}
