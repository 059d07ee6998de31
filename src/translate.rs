//! Translation seam and answer localization.
//!
//! [`Translator`] is implemented by [`HostedTranslator`] for the hosted
//! translation API. [`localize_answer`] turns an English reply into the
//! requested answer language and absorbs translation failures by falling
//! back to the English text wrapped for right-to-left display.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::TranslationConfig;
use crate::error::TranslationError;
use crate::language::AnswerLanguage;

const RTL_EMBEDDING: char = '\u{202B}';
const POP_DIRECTIONAL: char = '\u{202C}';

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` between two language codes. An empty result is an error.
    async fn translate(&self, text: &str, source: &str, target: &str)
        -> Result<String, TranslationError>;
}

/// Wraps text in right-to-left embedding markers.
pub fn make_rtl(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 6);
    out.push(RTL_EMBEDDING);
    out.push_str(text);
    out.push(POP_DIRECTIONAL);
    out
}

/// Replaces ASCII list bullets with the centered bullet glyph.
pub fn arabic_bullets(text: &str) -> String {
    text.replace("- ", "• ")
}

/// Render an English reply in the answer language.
///
/// English passes through untouched. Arabic and Persian replies are
/// translated and wrapped RTL (Arabic also gets bullet glyphs); when
/// translation fails the English reply is returned RTL-wrapped.
pub async fn localize_answer(
    translator: &dyn Translator,
    reply_en: &str,
    lang: AnswerLanguage,
) -> String {
    if !lang.is_rtl() {
        return reply_en.to_string();
    }

    match translator.translate(reply_en, "en", lang.code()).await {
        Ok(translated) => match lang {
            AnswerLanguage::Arabic => make_rtl(&arabic_bullets(&translated)),
            _ => make_rtl(&translated),
        },
        Err(e) => {
            tracing::warn!(target_lang = lang.code(), error = %e, "answer translation failed, returning English");
            make_rtl(reply_en)
        }
    }
}

/// Client for the hosted translation API.
pub struct HostedTranslator {
    client: reqwest::Client,
    url: String,
    model: String,
    preprocessing: String,
    api_key: String,
}

impl HostedTranslator {
    pub fn new(config: &TranslationConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            preprocessing: config.preprocessing.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Translator for HostedTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        let body = serde_json::json!({
            "model": self.model,
            "text": text,
            "langpair": format!("{}-{}", source, target),
            "preprocessing": self.preprocessing,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        tracing::debug!(response = %json, "translation API response");
        extract_translation(&json)
    }
}

/// First non-empty of `text`, `translated_text`, `translation`.
fn extract_translation(json: &serde_json::Value) -> Result<String, TranslationError> {
    ["text", "translated_text", "translation"]
        .iter()
        .filter_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or(TranslationError::Empty)
}
