use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub ingestion: Ingestion,
	pub permission_sync: PermissionSync,
	pub chunking: Chunking,
	pub chat_memory: ChatMemory,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
	pub files: Files,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Files {
	pub root: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ingestion {
	/// Size of the worker pool; ingestions for different knowledge ids run in
	/// parallel up to this bound.
	pub workers: u32,
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PermissionSync {
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chunking {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
	pub tokenizer_repo: Option<String>,
}

/// Window strategy of the chat memory provider. `message_window` needs
/// `max_messages`; `token_window` needs `max_tokens` and `tokenizer_repo`.
#[derive(Debug, Deserialize, Clone)]
pub struct ChatMemory {
	pub strategy: String,
	pub max_messages: Option<u32>,
	pub max_tokens: Option<u32>,
	pub tokenizer_repo: Option<String>,
}
