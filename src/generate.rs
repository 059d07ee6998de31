//! Context-constrained answer generation.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::conversation::ConversationManager;
use crate::llm::ChatClient;
use crate::models::{ConversationTurn, RetrievedPassage};

pub const NO_INFORMATION: &str = "⚠️ The database does not contain this information.";
pub const HEDGED_BANNER: &str =
    "⚠️ Some details may not be explicitly in the database. Here’s what was retrieved:";
pub const GENERATION_FAILED: &str = "⚠️ An error occurred while generating a response:";

const CONTEXT_HEADER: &str = "Here are the ONLY database snippets you can use:";
const ANSWER_INSTRUCTION: &str = "Answer clearly and concisely, prioritizing ONLY the above snippets. \
If something is not in them, you may briefly state it is missing, but do not fabricate details.";

/// Phrases that mark a reply as reaching beyond the retrieved snippets.
const HEDGING_PHRASES: &[&str] = &[
    "not explicitly stated",
    "we can infer",
    "although not mentioned",
    "let me give a more complete version",
];

pub struct ResponseGenerator {
    chat: Arc<dyn ChatClient>,
    snippet_chars: usize,
    history_window: usize,
}

impl ResponseGenerator {
    pub fn new(chat: Arc<dyn ChatClient>, snippet_chars: usize, history_window: usize) -> Self {
        Self {
            chat,
            snippet_chars,
            history_window,
        }
    }

    /// Answer `query` from `passages` only.
    ///
    /// The conversation lock is held only while reading the history window
    /// and while committing the exchange, never across the chat call. Hedged
    /// replies and failed calls leave the history untouched.
    pub async fn generate(
        &self,
        query: &str,
        passages: &[RetrievedPassage],
        conversation: &Mutex<ConversationManager>,
    ) -> String {
        if passages.is_empty() {
            return NO_INFORMATION.to_string();
        }

        let prompt = build_prompt(query, passages, self.snippet_chars);
        let messages = {
            let conv = conversation.lock().await;
            conv.recent_messages_with(ConversationTurn::user(prompt.clone()), self.history_window)
        };

        let reply = match self.chat.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat completion failed");
                return format!("{} {}", GENERATION_FAILED, e);
            }
        };

        if is_hedged(&reply) {
            tracing::info!("reply hedges beyond the snippets, not recording it");
            return format!("{}\n\n{}", HEDGED_BANNER, reply);
        }

        let mut conv = conversation.lock().await;
        conv.add_user(prompt);
        conv.add_assistant(reply.clone());
        reply
    }
}

pub fn is_hedged(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    HEDGING_PHRASES.iter().any(|p| lower.contains(p))
}

/// Cuts `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn build_prompt(query: &str, passages: &[RetrievedPassage], snippet_chars: usize) -> String {
    let snippets: Vec<String> = passages
        .iter()
        .map(|p| format!("- {}", truncate_snippet(&p.text, snippet_chars)))
        .collect();
    format!(
        "Question: {}\n\n{}\n{}\n\n{}",
        query,
        CONTEXT_HEADER,
        snippets.join("\n"),
        ANSWER_INSTRUCTION
    )
}
