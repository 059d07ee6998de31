//! End-to-end pipeline runs against in-memory fakes for the vector index,
//! chat model, and translator.

use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;

use fitness_rag::chat_log::ChatLog;
use fitness_rag::conversation::{ConversationManager, SYSTEM_PROMPT};
use fitness_rag::error::{ChatError, RetrievalError, TranslationError};
use fitness_rag::expand::QueryExpander;
use fitness_rag::generate::{ResponseGenerator, HEDGED_BANNER, NO_INFORMATION};
use fitness_rag::images::ImageRetriever;
use fitness_rag::index::{LazyIndex, VectorIndex};
use fitness_rag::llm::ChatClient;
use fitness_rag::models::{ConversationTurn, PipelineEvent, RetrievedPassage};
use fitness_rag::pipeline::{Pipeline, VISUALIZATION_MESSAGE};
use fitness_rag::retriever::Retriever;
use fitness_rag::translate::{make_rtl, Translator};

struct FixedIndex {
    passages: Vec<&'static str>,
}

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn similarity_search(
        &self,
        _query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        Ok(self
            .passages
            .iter()
            .take(k)
            .map(|t| RetrievedPassage::new(*t))
            .collect())
    }
}

struct ScriptedChat {
    reply: Result<String, String>,
    calls: StdMutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedChat {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: StdMutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: StdMutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(ChatError::Malformed(message.clone())),
        }
    }
}

/// Translates to English by lookup; translation out of English fails.
struct OneWayTranslator {
    to_english: &'static str,
}

#[async_trait]
impl Translator for OneWayTranslator {
    async fn translate(
        &self,
        _text: &str,
        _source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        if target == "en" {
            Ok(self.to_english.to_string())
        } else {
            Err(TranslationError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }
}

/// Prefixes the target code so tests can see what was translated.
struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(
        &self,
        text: &str,
        _source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        Ok(format!("[{}] {}", target, text))
    }
}

fn build(
    passages: Vec<&'static str>,
    chat: Arc<ScriptedChat>,
    translator: Arc<dyn Translator>,
) -> Arc<Pipeline> {
    let index = LazyIndex::ready(Arc::new(FixedIndex { passages }));
    let generator = ResponseGenerator::new(chat, 400, 6);
    let conversation = Arc::new(Mutex::new(ConversationManager::new(SYSTEM_PROMPT)));
    Arc::new(Pipeline::new(
        index,
        Retriever::new(QueryExpander::new(), 8),
        generator,
        translator,
        conversation,
    ))
}

async fn collect(pipeline: &Arc<Pipeline>, query: &str) -> Vec<PipelineEvent> {
    pipeline.run(query).collect().await
}

fn statuses(events: &[PipelineEvent]) -> Vec<&str> {
    events
        .iter()
        .filter(|e| !e.is_terminal())
        .map(|e| e.message())
        .collect()
}

#[tokio::test]
async fn test_english_query_streams_statuses_then_one_answer() {
    let chat = ScriptedChat::replying("- Yoga improves flexibility.\n- It reduces stress.");
    let pipeline = build(
        vec!["Yoga improves flexibility and balance."],
        chat.clone(),
        Arc::new(TaggingTranslator),
    );

    let events = collect(&pipeline, "What are the benefits of yoga?").await;

    assert_eq!(
        statuses(&events),
        vec![
            "Received user query...",
            "Searching vector DB...",
            "Generating response..."
        ]
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    let last = events.last().unwrap();
    assert!(last.is_terminal());
    assert_eq!(
        last,
        &PipelineEvent::BotResponse {
            message: "- Yoga improves flexibility.\n- It reduces stress.".to_string(),
            image_path: None,
        }
    );
    assert_eq!(chat.call_count(), 1);
    assert_eq!(pipeline.conversation().lock().await.len(), 2);
}

#[tokio::test]
async fn test_visualization_request_short_circuits() {
    let chat = ScriptedChat::replying("unused");
    let pipeline = build(vec!["anything"], chat.clone(), Arc::new(TaggingTranslator));
    let images = ImageRetriever::from_json(r#"{"yoga": "yoga.jpg", "squat": "squat.png"}"#).unwrap();
    let pipeline = Arc::new(
        Arc::try_unwrap(pipeline)
            .ok()
            .expect("sole owner")
            .with_images(images),
    );

    let events = collect(&pipeline, "Show me the yoga pose").await;

    assert_eq!(
        events,
        vec![PipelineEvent::BotResponse {
            message: VISUALIZATION_MESSAGE.to_string(),
            image_path: Some("/static/yoga.jpg".to_string()),
        }]
    );
    assert_eq!(chat.call_count(), 0);

    let conv = pipeline.conversation().lock().await;
    assert_eq!(conv.last_user_query(), Some("Show me the yoga pose"));
    assert_eq!(conv.last_response(), Some(VISUALIZATION_MESSAGE));
}

#[tokio::test]
async fn test_visualization_without_image_match_runs_pipeline() {
    let chat = ScriptedChat::replying("- Keep your back straight.");
    let pipeline = build(vec!["Plank form notes."], chat.clone(), Arc::new(TaggingTranslator));

    let events = collect(&pipeline, "show me plank technique").await;

    assert_eq!(statuses(&events).len(), 3);
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn test_no_passages_answers_without_chat_call() {
    let chat = ScriptedChat::replying("unused");
    let pipeline = build(vec![], chat.clone(), Arc::new(TaggingTranslator));

    let events = collect(&pipeline, "Who won the 1930 padel cup?").await;

    assert_eq!(events.last().unwrap().message(), NO_INFORMATION);
    assert_eq!(chat.call_count(), 0);
    assert!(pipeline.conversation().lock().await.is_empty());
}

#[tokio::test]
async fn test_hedged_reply_is_bannered_and_not_recorded() {
    let chat = ScriptedChat::replying("Although not mentioned, stretching helps.");
    let pipeline = build(vec!["Stretching notes."], chat, Arc::new(TaggingTranslator));

    let events = collect(&pipeline, "Does stretching help?").await;

    let answer = events.last().unwrap().message();
    assert!(answer.starts_with(HEDGED_BANNER));
    assert!(answer.ends_with("Although not mentioned, stretching helps."));
    assert!(pipeline.conversation().lock().await.is_empty());
}

#[tokio::test]
async fn test_chat_failure_is_answer_text_not_error_event() {
    let chat = ScriptedChat::failing("boom");
    let pipeline = build(vec!["HIIT notes."], chat, Arc::new(TaggingTranslator));

    let events = collect(&pipeline, "What is HIIT?").await;

    let last = events.last().unwrap();
    assert!(matches!(last, PipelineEvent::BotResponse { .. }));
    assert!(last.message().starts_with("⚠️ An error occurred while generating a response:"));
    assert!(pipeline.conversation().lock().await.is_empty());
}

#[tokio::test]
async fn test_arabic_answer_falls_back_to_rtl_english() {
    let chat = ScriptedChat::replying("- Yoga improves flexibility.");
    let pipeline = build(
        vec!["Yoga improves flexibility."],
        chat.clone(),
        Arc::new(OneWayTranslator {
            to_english: "What are the benefits of yoga?",
        }),
    );

    let events = collect(&pipeline, "ما هي فوائد اليوغا؟").await;

    assert_eq!(
        statuses(&events),
        vec![
            "Received user query...",
            "Searching vector DB...",
            "Generating response...",
            "Translating response back to Arabic..."
        ]
    );
    assert_eq!(
        events.last().unwrap().message(),
        make_rtl("- Yoga improves flexibility.")
    );

    // The English translation reached the model, not the Arabic text.
    let calls = chat.calls.lock().unwrap();
    let prompt = &calls[0].last().unwrap().content;
    assert!(prompt.starts_with("Question: What are the benefits of yoga?"));
}

#[tokio::test]
async fn test_english_query_with_arabic_override_is_translated_back() {
    let chat = ScriptedChat::replying("- Stay hydrated.");
    let pipeline = build(vec!["Hydration notes."], chat, Arc::new(TaggingTranslator));

    let events = collect(&pipeline, "How much water should I drink? answer in arabic").await;

    assert_eq!(
        events.last().unwrap().message(),
        make_rtl("[ar] • Stay hydrated.")
    );
}

#[tokio::test]
async fn test_mixed_script_query_keeps_english_and_answers_in_arabic() {
    let chat = ScriptedChat::replying("- Train early in the morning.");
    let pipeline = build(vec!["Heat training notes."], chat.clone(), Arc::new(TaggingTranslator));
    let query = "İstanbul heat: football training tips? اجب بالعربيه";

    let events = collect(&pipeline, query).await;

    assert_eq!(
        statuses(&events),
        vec![
            "Received user query...",
            "Searching vector DB...",
            "Generating response...",
            "Translating response back to Arabic..."
        ]
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(
        events.last().unwrap().message(),
        make_rtl("[ar] • Train early in the morning.")
    );

    // Mostly Latin text is not sent through query translation.
    let calls = chat.calls.lock().unwrap();
    let prompt = &calls[0].last().unwrap().content;
    assert!(prompt.starts_with("Question: İstanbul heat: football training tips?"));

    let conv = pipeline.conversation().lock().await;
    assert_eq!(conv.last_user_query(), Some(query));
}

#[tokio::test]
async fn test_answered_query_is_remembered_as_last_exchange() {
    let chat = ScriptedChat::replying("- Rest 48 hours between sessions.");
    let pipeline = build(vec!["Recovery notes."], chat, Arc::new(TaggingTranslator));

    let _ = collect(&pipeline, "How long should I rest?").await;

    let conv = pipeline.conversation().lock().await;
    assert_eq!(conv.len(), 2);
    assert_eq!(conv.last_user_query(), Some("How long should I rest?"));
    assert_eq!(conv.last_response(), Some("- Rest 48 hours between sessions."));
}

#[tokio::test]
async fn test_panicking_stage_still_ends_with_error_event() {
    struct PanickingChat;

    #[async_trait]
    impl ChatClient for PanickingChat {
        async fn complete(&self, _messages: &[ConversationTurn]) -> Result<String, ChatError> {
            panic!("model client crashed");
        }
    }

    let pipeline = Arc::new(Pipeline::new(
        LazyIndex::ready(Arc::new(FixedIndex {
            passages: vec!["HIIT notes."],
        })),
        Retriever::new(QueryExpander::new(), 8),
        ResponseGenerator::new(Arc::new(PanickingChat), 400, 6),
        Arc::new(TaggingTranslator),
        Arc::new(Mutex::new(ConversationManager::default())),
    ));

    let events = collect(&pipeline, "What is HIIT?").await;

    assert_eq!(
        statuses(&events),
        vec![
            "Received user query...",
            "Searching vector DB...",
            "Generating response..."
        ]
    );
    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    match terminals[0] {
        PipelineEvent::Error { message } => assert!(message.starts_with("An error occurred:")),
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn test_query_translation_failure_warns_and_continues() {
    struct DownTranslator;

    #[async_trait]
    impl Translator for DownTranslator {
        async fn translate(
            &self,
            _text: &str,
            _source: &str,
            _target: &str,
        ) -> Result<String, TranslationError> {
            Err(TranslationError::Empty)
        }
    }

    let chat = ScriptedChat::replying("- Answer.");
    let pipeline = build(vec!["Notes."], chat, Arc::new(DownTranslator));

    let events = collect(&pipeline, "ما هي قواعد البادل؟").await;

    assert!(statuses(&events).contains(&"⚠️ Failed to translate Arabic query to English."));
    assert_eq!(events.last().unwrap().message(), make_rtl("- Answer."));
}

#[tokio::test]
async fn test_unavailable_index_yields_single_error_event() {
    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn similarity_search(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
            Err(RetrievalError::Unavailable("vector store offline".to_string()))
        }
    }

    let chat = ScriptedChat::replying("unused");
    let pipeline = Arc::new(Pipeline::new(
        LazyIndex::ready(Arc::new(DownIndex)),
        Retriever::new(QueryExpander::new(), 8),
        ResponseGenerator::new(chat.clone(), 400, 6),
        Arc::new(TaggingTranslator),
        Arc::new(Mutex::new(ConversationManager::default())),
    ));

    let events = collect(&pipeline, "What is HIIT?").await;

    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    match terminals[0] {
        PipelineEvent::Error { message } => {
            assert!(message.starts_with("An error occurred:"));
            assert!(message.contains("vector store offline"));
        }
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn test_completed_exchange_is_logged() {
    let tmp = tempfile::TempDir::new().unwrap();
    let log_path = tmp.path().join("chat_log.jsonl");

    let chat = ScriptedChat::replying("- Squats build legs.");
    let pipeline = build(vec!["Squat notes."], chat, Arc::new(TaggingTranslator));
    let pipeline = Arc::new(
        Arc::try_unwrap(pipeline)
            .ok()
            .expect("sole owner")
            .with_chat_log(ChatLog::new(&log_path)),
    );

    let _ = collect(&pipeline, "Why do squats?").await;

    // The append happens after the terminal event is sent.
    let reader = ChatLog::new(&log_path);
    let mut records = Vec::new();
    for _ in 0..100 {
        records = reader.replay().unwrap();
        if !records.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_query, "Why do squats?");
    assert_eq!(records[0].response, "- Squats build legs.");
}
