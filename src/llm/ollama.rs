use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::lines::LineBuffer;
use super::provider::{FragmentReceiver, LlmProvider};
use super::types::{embedding_values, ChatRequest};
use crate::core::errors::ApiError;

/// Talks to an Ollama server over its native `/api/*` endpoints.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn chat_body(&self, request: &ChatRequest, model_id: &str) -> Value {
        let mut options = Map::new();
        if let Some(t) = request.temperature { options.insert("temperature".to_string(), json!(t)); }
        if let Some(t) = request.top_p { options.insert("top_p".to_string(), json!(t)); }
        if let Some(t) = request.max_tokens { options.insert("num_predict".to_string(), json!(t)); }

        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": true,
        });
        if !options.is_empty() {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("options".to_string(), Value::Object(options));
            }
        }
        body
    }
}

/// Result of decoding one NDJSON line from `/api/chat`.
#[derive(Debug, PartialEq)]
enum ChatLine {
    Content(String),
    Done,
    Failed(String),
    Skip,
}

fn parse_chat_line(line: &str) -> ChatLine {
    let Ok(json) = serde_json::from_str::<Value>(line) else {
        return ChatLine::Skip;
    };
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return ChatLine::Failed(err.to_string());
    }
    if let Some(content) = json["message"]["content"].as_str() {
        if !content.is_empty() {
            return ChatLine::Content(content.to_string());
        }
    }
    if json["done"].as_bool() == Some(true) {
        return ChatLine::Done;
    }
    ChatLine::Skip
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<FragmentReceiver, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.chat_body(&request, model_id);

        let res = self.client.post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("Ollama stream error: {}", text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = LineBuffer::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        for line in buffer.push(&bytes) {
                            match parse_chat_line(&line) {
                                ChatLine::Content(content) => {
                                    if tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                                ChatLine::Done => return,
                                ChatLine::Failed(err) => {
                                    let _ = tx.send(Err(ApiError::Upstream(err))).await;
                                    return;
                                }
                                ChatLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::upstream(e))).await;
                        return;
                    }
                }
            }
            if let Some(line) = buffer.finish() {
                match parse_chat_line(&line) {
                    ChatLine::Content(content) => {
                        let _ = tx.send(Ok(content)).await;
                    }
                    ChatLine::Failed(err) => {
                        let _ = tx.send(Err(ApiError::Upstream(err))).await;
                    }
                    ChatLine::Done | ChatLine::Skip => {}
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/api/embed", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self.client.post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("Ollama embed error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let Some(data) = payload["embeddings"].as_array() else {
            return Err(ApiError::Upstream("Ollama embed response has no embeddings".to_string()));
        };
        data.iter()
            .map(|item| match item.as_array() {
                Some(vals) => embedding_values(vals),
                None => Err(ApiError::Upstream("Ollama embedding is not an array".to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    async fn collect(mut rx: FragmentReceiver) -> (String, Option<String>) {
        let mut text = String::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(fragment) => text.push_str(&fragment),
                Err(err) => return (text, Some(err.to_string())),
            }
        }
        (text, None)
    }

    #[test]
    fn chat_lines_decode_content_done_and_errors() {
        assert_eq!(
            parse_chat_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#),
            ChatLine::Content("Hi".to_string())
        );
        assert_eq!(
            parse_chat_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#),
            ChatLine::Done
        );
        assert_eq!(
            parse_chat_line(r#"{"error":"model 'x' not found"}"#),
            ChatLine::Failed("model 'x' not found".to_string())
        );
        assert_eq!(parse_chat_line("not json"), ChatLine::Skip);
    }

    #[test]
    fn sampling_options_are_forwarded() {
        let provider = OllamaProvider::new("http://localhost:11434/".to_string());
        let mut request = ChatRequest::new(vec![ChatMessage::user("hello")]);
        request.temperature = Some(0.2);
        request.max_tokens = Some(64);

        let body = provider.chat_body(&request, "gemma:2b");

        assert_eq!(provider.base_url, "http://localhost:11434");
        assert_eq!(body["model"], "gemma:2b");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["options"]["temperature"], 0.2);
        assert_eq!(body["options"]["num_predict"], 64);
    }

    #[tokio::test]
    async fn streams_ndjson_fragments_in_order() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                [
                    r#"{"message":{"role":"assistant","content":"Peace "},"done":false}"#,
                    r#"{"message":{"role":"assistant","content":"be "},"done":false}"#,
                    r#"{"message":{"role":"assistant","content":"with you."},"done":false}"#,
                    r#"{"message":{"role":"assistant","content":""},"done":true}"#,
                ]
                .join("\n")
            }),
        );
        let provider = OllamaProvider::new(serve(app).await);

        let rx = provider
            .stream_chat(ChatRequest::new(vec![ChatMessage::user("hi")]), "gemma:2b")
            .await
            .expect("stream should start");

        assert_eq!(collect(rx).await, ("Peace be with you.".to_string(), None));
    }

    #[tokio::test]
    async fn mid_stream_error_is_delivered_after_partial_content() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                "{\"message\":{\"content\":\"Partial\"},\"done\":false}\n{\"error\":\"model runner crashed\"}\n"
            }),
        );
        let provider = OllamaProvider::new(serve(app).await);

        let rx = provider
            .stream_chat(ChatRequest::new(vec![ChatMessage::user("hi")]), "gemma:2b")
            .await
            .expect("stream should start");

        let (text, err) = collect(rx).await;
        assert_eq!(text, "Partial");
        assert!(err.expect("error expected").contains("model runner crashed"));
    }

    #[tokio::test]
    async fn embed_preserves_input_order() {
        let app = Router::new().route(
            "/api/embed",
            post(|Json(body): Json<Value>| async move {
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                let embeddings: Vec<Vec<f32>> = inputs
                    .iter()
                    .enumerate()
                    .map(|(i, _)| vec![i as f32, 1.0])
                    .collect();
                Json(json!({ "embeddings": embeddings }))
            }),
        );
        let provider = OllamaProvider::new(serve(app).await);

        let vectors = provider
            .embed(&["a".to_string(), "b".to_string(), "c".to_string()], "nomic-embed-text")
            .await
            .expect("embed");

        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]]);
    }

    #[tokio::test]
    async fn non_numeric_embedding_fails_instead_of_shortening() {
        let app = Router::new().route(
            "/api/embed",
            post(|| async { Json(json!({ "embeddings": [[0.1, 0.2], [0.3, null]] })) }),
        );
        let provider = OllamaProvider::new(serve(app).await);

        let err = provider
            .embed(&["a".to_string(), "b".to_string()], "nomic-embed-text")
            .await
            .expect_err("null entry");
        assert!(matches!(err, ApiError::Upstream(_)));
        assert!(err.to_string().contains("not a number"));
    }

    #[tokio::test]
    async fn unreachable_server_reports_unhealthy() {
        let provider = OllamaProvider::new("http://127.0.0.1:9".to_string());
        assert!(!provider.health_check().await.expect("health check never errors"));
    }
}
