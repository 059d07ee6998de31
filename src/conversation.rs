//! Conversation history for chat-completion requests.
//!
//! [`ConversationManager`] keeps an ordered, append-only list of turns plus
//! a fixed system prompt. Every message list it produces starts with exactly
//! one system turn. It is not internally synchronized; the pipeline shares
//! it behind an async mutex.

use crate::models::{ConversationTurn, Role};

/// Instruction prompt sent as the system turn of every chat request.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant that ONLY answers using the context provided. \
Do NOT use prior knowledge. \
If the context does not contain the answer, say you don't have enough information. \
Answer clearly using bullet points starting with '- '. \
Do not include side notes or introductions. \
If the topic is football, always interpret it as soccer (association football), NOT American football. \
Don't give such long answers that the user has to scroll to read them. \
Answer ONLY with concise bullet points from the snippets. \
Do not explain the language of the snippets. \
Do not mention translations or the source language. \
Only return the rules/content directly.";

#[derive(Debug, Clone)]
pub struct ConversationManager {
    system_prompt: String,
    history: Vec<ConversationTurn>,
    last_user_query: Option<String>,
    last_response: Option<String>,
}

impl ConversationManager {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            last_user_query: None,
            last_response: None,
        }
    }

    pub fn add_user(&mut self, text: impl Into<String>) {
        self.history.push(ConversationTurn::user(text));
    }

    pub fn add_assistant(&mut self, text: impl Into<String>) {
        self.history.push(ConversationTurn::assistant(text));
    }

    /// Appends a user/assistant pair and remembers both as the latest exchange.
    pub fn update(&mut self, user: impl Into<String>, reply: impl Into<String>) {
        let user = user.into();
        let reply = reply.into();
        self.history.push(ConversationTurn::user(user.clone()));
        self.history.push(ConversationTurn::assistant(reply.clone()));
        self.remember_exchange(user, reply);
    }

    /// Remembers the latest exchange as the user saw it without touching
    /// history. The RAG path records the English prompt/reply turns itself,
    /// so the original query and localized reply only land here.
    pub fn remember_exchange(&mut self, user: impl Into<String>, reply: impl Into<String>) {
        self.last_user_query = Some(user.into());
        self.last_response = Some(reply.into());
    }

    /// System turn followed by the whole history.
    pub fn messages(&self) -> Vec<ConversationTurn> {
        self.recent_messages(self.history.len())
    }

    /// System turn followed by the last `n` turns.
    pub fn recent_messages(&self, n: usize) -> Vec<ConversationTurn> {
        let start = self.history.len().saturating_sub(n);
        let mut out = Vec::with_capacity(1 + self.history.len() - start);
        out.push(self.system_turn());
        out.extend(self.history[start..].iter().cloned());
        out
    }

    /// Like [`recent_messages`](Self::recent_messages), but the window of `n`
    /// turns ends with `pending`, a turn that has not been recorded.
    pub fn recent_messages_with(&self, pending: ConversationTurn, n: usize) -> Vec<ConversationTurn> {
        let mut out = self.recent_messages(n.saturating_sub(1));
        if n > 0 {
            out.push(pending);
        }
        out
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn last_user_query(&self) -> Option<&str> {
        self.last_user_query.as_deref()
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Number of recorded turns, not counting the system prompt.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn system_turn(&self) -> ConversationTurn {
        ConversationTurn {
            role: Role::System,
            content: self.system_prompt.clone(),
        }
    }
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(SYSTEM_PROMPT)
    }
}
