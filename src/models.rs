//! Core data models used throughout fitness-rag.
//!
//! These types represent the conversation turns, retrieved passages, and
//! pipeline events that flow through a query, plus the documents and chunks
//! produced when building the vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message, serialized in the chat-completion message shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A passage returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub text: String,
    /// Opaque key-value metadata carried from ingestion (title, source, year, ...).
    pub source_metadata: serde_json::Value,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_metadata: serde_json::json!({}),
        }
    }

    /// Human-readable origin of the passage, used in debug logs.
    pub fn source_label(&self) -> &str {
        self.source_metadata
            .get("source")
            .or_else(|| self.source_metadata.get("title"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }
}

/// An event emitted by the query pipeline.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"status","message":"Searching vector DB..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Status {
        message: String,
    },
    BotResponse {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<String>,
    },
    Error {
        message: String,
    },
}

impl PipelineEvent {
    pub fn status(message: impl Into<String>) -> Self {
        PipelineEvent::Status {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Status { .. })
    }

    /// SSE event name: `"error"` for the error variant, `"message"` otherwise.
    pub fn event_name(&self) -> &'static str {
        match self {
            PipelineEvent::Error { .. } => "error",
            _ => "message",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PipelineEvent::Status { message }
            | PipelineEvent::BotResponse { message, .. }
            | PipelineEvent::Error { message } => message,
        }
    }
}

/// One completed exchange, persisted as a JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogRecord {
    #[serde(default)]
    pub user_query: String,
    #[serde(default)]
    pub response: String,
}

/// Raw item produced by the index builder before chunking.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub source: String,
    pub source_id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub body: String,
    pub metadata_json: String,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
