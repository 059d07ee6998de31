//! Per-query orchestration.
//!
//! [`Pipeline::run`] spawns one task per query. The task walks the
//! [`Stage`] machine and pushes [`PipelineEvent`]s into a bounded channel;
//! the caller consumes them as a stream. Every run ends in exactly one
//! terminal event.
//!
//! Visualization requests ("show me the yoga pose") that match the image
//! index skip the machine entirely and answer with the image.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::chat_log::ChatLog;
use crate::config::Config;
use crate::conversation::{ConversationManager, SYSTEM_PROMPT};
use crate::db;
use crate::embedding::create_embedder;
use crate::error::RetrievalError;
use crate::expand::QueryExpander;
use crate::generate::ResponseGenerator;
use crate::images::ImageRetriever;
use crate::index::LazyIndex;
use crate::language::{AnswerLanguage, LanguageRouter};
use crate::llm::{api_key_from_env, HostedChatClient};
use crate::migrate::apply_schema;
use crate::models::{ChatLogRecord, PipelineEvent, RetrievedPassage};
use crate::retriever::Retriever;
use crate::translate::{localize_answer, HostedTranslator, Translator};

const EVENT_BUFFER: usize = 16;

pub const VISUALIZATION_MESSAGE: &str = "Here is the pose visualization you requested.";

const VISUALIZATION_KEYWORDS: &[&str] = &[
    "show me",
    "visualize",
    "see",
    "display",
    "image",
    "pose",
    "technique",
    "picture",
    "photo",
];

/// Pipeline stages, in order. Each non-final stage emits one status event
/// on entry.
#[derive(Debug)]
enum Stage {
    Received,
    LanguageResolution,
    Searching {
        query_en: String,
        answer_lang: AnswerLanguage,
    },
    Generating {
        query_en: String,
        answer_lang: AnswerLanguage,
        passages: Vec<RetrievedPassage>,
    },
    AnswerTranslation {
        reply_en: String,
        answer_lang: AnswerLanguage,
    },
    Done {
        reply: String,
    },
}

pub struct Pipeline {
    router: LanguageRouter,
    translator: Arc<dyn Translator>,
    index: LazyIndex,
    retriever: Retriever,
    generator: ResponseGenerator,
    conversation: Arc<Mutex<ConversationManager>>,
    images: ImageRetriever,
    chat_log: Option<ChatLog>,
}

impl Pipeline {
    pub fn new(
        index: LazyIndex,
        retriever: Retriever,
        generator: ResponseGenerator,
        translator: Arc<dyn Translator>,
        conversation: Arc<Mutex<ConversationManager>>,
    ) -> Self {
        Self {
            router: LanguageRouter::new(),
            translator,
            index,
            retriever,
            generator,
            conversation,
            images: ImageRetriever::default(),
            chat_log: None,
        }
    }

    /// Wires the hosted chat and translation clients, the SQLite-backed
    /// index, the image index and the chat log from `config`. History from
    /// the chat log is restored before the pipeline is returned.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let api_key = api_key_from_env(&config.llm)?;
        let chat = Arc::new(HostedChatClient::new(&config.llm, api_key.clone())?);
        let translator = Arc::new(HostedTranslator::new(&config.translation, api_key)?);

        let pool = db::connect(config).await?;
        apply_schema(&pool).await?;
        let embedder = create_embedder(&config.embedding)?;
        let index = LazyIndex::sqlite(pool, embedder);

        let retriever = Retriever::new(QueryExpander::new(), config.retrieval.k);
        let generator = ResponseGenerator::new(
            chat,
            config.retrieval.snippet_chars,
            config.retrieval.history_window,
        );

        let mut conversation = ConversationManager::new(SYSTEM_PROMPT);
        let chat_log = config.server.chat_log.clone().map(ChatLog::new);
        if let Some(log) = &chat_log {
            log.seed(&mut conversation)?;
        }

        let mut pipeline = Self::new(
            index,
            retriever,
            generator,
            translator,
            Arc::new(Mutex::new(conversation)),
        );
        if let Some(path) = &config.server.image_index {
            let images = ImageRetriever::load(path)?;
            tracing::info!(entries = images.len(), "image index loaded");
            pipeline = pipeline.with_images(images);
        }
        if let Some(log) = chat_log {
            pipeline = pipeline.with_chat_log(log);
        }
        Ok(pipeline)
    }

    pub fn with_images(mut self, images: ImageRetriever) -> Self {
        self.images = images;
        self
    }

    pub fn with_chat_log(mut self, chat_log: ChatLog) -> Self {
        self.chat_log = Some(chat_log);
        self
    }

    pub fn conversation(&self) -> &Arc<Mutex<ConversationManager>> {
        &self.conversation
    }

    /// Loads the embedder and vector index. Safe to call concurrently.
    pub async fn warmup(&self) -> Result<(), RetrievalError> {
        self.index.get().await.map(|_| ())
    }

    /// Starts processing `query` and returns its event stream.
    pub fn run(self: &Arc<Self>, query: impl Into<String>) -> ReceiverStream<PipelineEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let events = EventSink::new(tx);
        let pipeline = Arc::clone(self);
        let query = query.into();
        tokio::spawn(async move {
            let worker = {
                let events = events.clone();
                tokio::spawn(async move { pipeline.execute(query, events).await })
            };
            // A panicking stage still owes the client its terminal event.
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "pipeline task aborted");
                if !events.finished() {
                    emit(
                        &events,
                        PipelineEvent::Error {
                            message: format!("An error occurred: {}", e),
                        },
                    )
                    .await;
                }
            }
        });
        ReceiverStream::new(rx)
    }

    async fn execute(&self, query: String, tx: EventSink) {
        if let Some(image_path) = self.visualization_for(&query) {
            tracing::info!(image = %image_path, "answering with pose visualization");
            self.conversation
                .lock()
                .await
                .update(query.clone(), VISUALIZATION_MESSAGE);
            emit(
                &tx,
                PipelineEvent::BotResponse {
                    message: VISUALIZATION_MESSAGE.to_string(),
                    image_path: Some(image_path),
                },
            )
            .await;
            self.log_exchange(&query, VISUALIZATION_MESSAGE).await;
            return;
        }

        match self.drive(&query, &tx).await {
            Ok(reply) => {
                self.conversation
                    .lock()
                    .await
                    .remember_exchange(query.clone(), reply.clone());
                emit(
                    &tx,
                    PipelineEvent::BotResponse {
                        message: reply.clone(),
                        image_path: None,
                    },
                )
                .await;
                self.log_exchange(&query, &reply).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline failed");
                emit(
                    &tx,
                    PipelineEvent::Error {
                        message: format!("An error occurred: {}", e),
                    },
                )
                .await;
            }
        }
    }

    /// Runs the stage machine to completion and returns the final reply.
    async fn drive(&self, query: &str, tx: &EventSink) -> Result<String> {
        let mut stage = Stage::Received;

        loop {
            tracing::debug!(?stage, "pipeline stage");
            stage = match stage {
                Stage::Received => {
                    emit(tx, PipelineEvent::status("Received user query...")).await;
                    Stage::LanguageResolution
                }
                Stage::LanguageResolution => {
                    let plan = self.router.resolve(query);
                    let query_en = match plan.translate_query_from {
                        Some(source) => {
                            match self.translator.translate(query, source.code(), "en").await {
                                Ok(translated) => translated,
                                Err(e) => {
                                    tracing::warn!(error = %e, "query translation failed");
                                    emit(
                                        tx,
                                        PipelineEvent::status(format!(
                                            "⚠️ Failed to translate {} query to English.",
                                            source.display_name()
                                        )),
                                    )
                                    .await;
                                    query.to_string()
                                }
                            }
                        }
                        None => query.to_string(),
                    };
                    Stage::Searching {
                        query_en,
                        answer_lang: plan.answer_lang,
                    }
                }
                Stage::Searching {
                    query_en,
                    answer_lang,
                } => {
                    emit(tx, PipelineEvent::status("Searching vector DB...")).await;
                    let index = self.index.get().await?;
                    let passages = self.retriever.retrieve(index.as_ref(), &query_en).await?;
                    Stage::Generating {
                        query_en,
                        answer_lang,
                        passages,
                    }
                }
                Stage::Generating {
                    query_en,
                    answer_lang,
                    passages,
                } => {
                    emit(tx, PipelineEvent::status("Generating response...")).await;
                    let reply_en = self
                        .generator
                        .generate(&query_en, &passages, &self.conversation)
                        .await;
                    if answer_lang.is_rtl() {
                        Stage::AnswerTranslation {
                            reply_en,
                            answer_lang,
                        }
                    } else {
                        Stage::Done { reply: reply_en }
                    }
                }
                Stage::AnswerTranslation {
                    reply_en,
                    answer_lang,
                } => {
                    emit(
                        tx,
                        PipelineEvent::status(format!(
                            "Translating response back to {}...",
                            answer_lang.display_name()
                        )),
                    )
                    .await;
                    let reply =
                        localize_answer(self.translator.as_ref(), &reply_en, answer_lang).await;
                    Stage::Done { reply }
                }
                Stage::Done { reply } => return Ok(reply),
            };
        }
    }

    /// Static image URL for a visualization request, if the query asks for
    /// one and the image index has a match.
    pub fn visualization_for(&self, query: &str) -> Option<String> {
        if !wants_visualization(query) {
            return None;
        }
        self.images.find(query).map(static_url)
    }

    async fn log_exchange(&self, query: &str, response: &str) {
        if let Some(log) = &self.chat_log {
            let record = ChatLogRecord {
                user_query: query.to_string(),
                response: response.to_string(),
            };
            if let Err(e) = log.append(&record).await {
                tracing::warn!(error = %e, "failed to append chat log");
            }
        }
    }
}

/// `fitrag ask <query>`: runs one query through the pipeline and prints
/// each event as it arrives.
pub async fn run_ask(config: &Config, query: &str) -> Result<()> {
    use tokio_stream::StreamExt;

    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    let mut events = pipeline.run(query);
    while let Some(event) = events.next().await {
        match &event {
            PipelineEvent::Status { message } => println!("… {}", message),
            PipelineEvent::BotResponse {
                message,
                image_path,
            } => {
                println!("{}", message);
                if let Some(path) = image_path {
                    println!("image: {}", path);
                }
            }
            PipelineEvent::Error { message } => anyhow::bail!("{}", message),
        }
    }
    Ok(())
}

pub fn wants_visualization(query: &str) -> bool {
    let lower = query.to_lowercase();
    VISUALIZATION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Serves relative image paths from `/static/`; rooted paths pass through.
pub fn static_url(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/static/{}", path)
    }
}

/// Sending half of a run's event channel. Remembers whether the terminal
/// event has gone out.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::Sender<PipelineEvent>,
    finished: Arc<AtomicBool>,
}

impl EventSink {
    fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            tx,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

async fn emit(sink: &EventSink, event: PipelineEvent) {
    if event.is_terminal() {
        sink.finished.store(true, Ordering::Release);
    }
    if sink.tx.send(event).await.is_err() {
        // The client went away; keep going so history stays consistent.
        tracing::debug!("event receiver dropped");
    }
}
