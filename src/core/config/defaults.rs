use serde_json::{json, Value};

pub const DEFAULT_CORPUS_PATH: &str = "gita_knowledge_base.json";
pub const DEFAULT_LLM_MODEL: &str = "gemma:2b";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_PERSONA_NAME: &str = "GitaGPT";
pub const DEFAULT_CORPUS_NAME: &str = "Bhagavad Gita";

/// Built-in configuration that `config.yml` is merged over.
pub fn default_config() -> Value {
    json!({
        "server": {
            "host": "127.0.0.1",
            "port": 8501,
            "allowed_origins": []
        },
        "corpus": {
            "path": DEFAULT_CORPUS_PATH
        },
        "embedding": {
            "provider": "ollama",
            "base_url": DEFAULT_OLLAMA_URL,
            "model": DEFAULT_EMBEDDING_MODEL,
            "dimensions": 512
        },
        "index": {
            "backend": "memory",
            "rebuild_on_corpus_change": false
        },
        "llm": {
            "provider": "ollama",
            "base_url": DEFAULT_OLLAMA_URL,
            "model": DEFAULT_LLM_MODEL
        },
        "prompt": {
            "persona_name": DEFAULT_PERSONA_NAME,
            "corpus_name": DEFAULT_CORPUS_NAME
        }
    })
}
