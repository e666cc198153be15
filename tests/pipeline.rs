use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use gita_guide::core::config::{AppPaths, ConfigService, GuideSettings, LlmSettings, PromptSettings};
use gita_guide::core::errors::ApiError;
use gita_guide::corpus::{Corpus, Passage};
use gita_guide::embedding::{Embedder, HashEmbedder};
use gita_guide::guide::{Guide, IndexStatus};
use gita_guide::index::{InMemoryIndex, SemanticIndex, VectorIndex};
use gita_guide::llm::{ChatRequest, FragmentReceiver, GenerationClient, LlmProvider};
use gita_guide::prompt::PromptComposer;
use gita_guide::retrieval::{RetrievalResult, Retriever};
use gita_guide::server::router::router;
use gita_guide::session::{ChatEvent, Role, Session};
use gita_guide::state::AppState;

/// Streams fixed fragments and remembers every prompt it was sent.
struct EchoProvider {
    fragments: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl EchoProvider {
    fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _model_id: &str,
    ) -> Result<FragmentReceiver, ApiError> {
        if let Some(message) = request.messages.first() {
            self.prompts.lock().expect("lock").push(message.content.clone());
        }
        let (tx, rx) = mpsc::channel(self.fragments.len().max(1));
        for fragment in &self.fragments {
            tx.send(Ok(fragment.clone())).await.expect("send");
        }
        Ok(rx)
    }

    async fn embed(&self, _inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Err(ApiError::BadRequest("echo provider has no embeddings".to_string()))
    }
}

fn duty_verse() -> Passage {
    Passage {
        id: "2.47".to_string(),
        chapter: 2,
        verse: 47,
        themes: vec!["duty".to_string()],
        commentary: "Act without attachment to results.".to_string(),
        primary_translation: "You have a right to perform your duty...".to_string(),
        secondary_translation: "కర్మణ్యేవాధికారస్తే".to_string(),
        original_text: "कर्मण्येवाधिकारस्ते".to_string(),
    }
}

async fn ready_guide(provider: Arc<EchoProvider>) -> Arc<Guide> {
    let corpus = Corpus::from_passages(PathBuf::from("kb.json"), vec![duty_verse()]).expect("corpus");
    let store: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));

    let index = SemanticIndex::new(store.clone(), embedder.clone(), false);
    index.build_or_reuse(&corpus).await.expect("build");
    index.build_or_reuse(&corpus).await.expect("reuse");
    assert_eq!(store.count().await.expect("count"), 1);

    Arc::new(Guide::ready(
        Retriever::new(embedder.clone(), store),
        IndexStatus::Ready {
            entries: 1,
            backend: "memory".to_string(),
        },
        PromptComposer::new(&PromptSettings::default()),
        GenerationClient::new(provider, LlmSettings::default()),
        embedder.model_id(),
    ))
}

#[tokio::test]
async fn anxious_question_is_grounded_in_the_duty_verse() {
    let provider = Arc::new(EchoProvider::new(&["Breathe. ", "Act, and let go."]));
    let guide = ready_guide(provider.clone()).await;

    let retrieval = guide
        .retrieve("I feel anxious about failing")
        .await
        .expect("retrieve");
    assert!(matches!(&retrieval, RetrievalResult::Found { passage, .. } if passage.id == "2.47"));

    let mut session = Session::new(guide);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let content = session
        .on_query("I feel anxious about failing", true, &tx)
        .await
        .expect("answer")
        .content
        .clone();

    let prompt = provider.prompts().pop().expect("one prompt");
    assert!(prompt.contains("Chapter 2, Verse 47"));
    assert!(prompt.contains("\"You have a right to perform your duty...\""));

    assert!(content.starts_with("Breathe. Act, and let go."));
    assert!(content.contains("कर्मण्येवाधिकारस्ते"));
    assert!(content.contains("కర్మణ్యేవాధికారస్తే"));

    let mut streamed = String::new();
    while let Ok(event) = rx.try_recv() {
        if let ChatEvent::Partial { fragment, .. } = event {
            streamed.push_str(&fragment);
        }
    }
    assert_eq!(streamed, "Breathe. Act, and let go.");

    let roles: Vec<Role> = session.transcript().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
}

async fn serve(guide: Arc<Guide>, dir: &tempfile::TempDir) -> String {
    let paths = Arc::new(AppPaths::with_dirs(
        dir.path().to_path_buf(),
        dir.path().join("data"),
    ));
    let config = ConfigService::new(paths.clone());
    let state = Arc::new(AppState::from_parts(paths, config, GuideSettings::default(), guide));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    format!("127.0.0.1:{}", addr.port())
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.expect("open").expect("frame");
        if let Ok(text) = msg.to_text() {
            if !text.is_empty() {
                return serde_json::from_str(text).expect("json");
            }
        }
    }
}

#[tokio::test]
async fn websocket_streams_chunks_then_done() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(EchoProvider::new(&["Peace ", "be with you."]));
    let addr = serve(ready_guide(provider).await, &dir).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("connect");

    let history = next_json(&mut ws).await;
    assert_eq!(history["type"], "history");
    assert_eq!(history["messages"][0]["role"], "assistant");

    let query = json!({"type": "query", "message": "How do I find peace?", "showSecondary": false});
    ws.send(Message::text(query.to_string())).await.expect("send");

    let first = next_json(&mut ws).await;
    assert_eq!(first, json!({"type": "chunk", "message": "Peace ", "rendered": "Peace ▌"}));
    let second = next_json(&mut ws).await;
    assert_eq!(second["type"], "chunk");
    let done = next_json(&mut ws).await;
    assert_eq!(done, json!({"type": "done", "message": "Peace be with you."}));
}

#[tokio::test]
async fn unavailable_index_shows_banner_and_refuses_queries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(EchoProvider::new(&["never"]));
    let guide = Arc::new(Guide::unavailable(
        "corpus file 'kb.json' could not be read",
        PromptComposer::new(&PromptSettings::default()),
        GenerationClient::new(provider.clone(), LlmSettings::default()),
        "hash:128".to_string(),
    ));
    let addr = serve(guide, &dir).await;

    let status: Value = reqwest::get(format!("http://{}/api/status", addr))
        .await
        .expect("status")
        .json()
        .await
        .expect("json");
    assert_eq!(status["index"]["state"], "unavailable");
    assert!(status["banner"].as_str().expect("banner").contains("kb.json"));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("connect");
    assert_eq!(next_json(&mut ws).await["type"], "history");
    assert_eq!(next_json(&mut ws).await["type"], "banner");

    let query = json!({"type": "query", "message": "hello"});
    ws.send(Message::text(query.to_string())).await.expect("send");
    let refusal = next_json(&mut ws).await;
    assert_eq!(refusal["type"], "error");
    assert!(refusal["message"].as_str().expect("message").contains("knowledge base is not loaded"));
    assert!(provider.prompts().is_empty());
}
