pub mod chat_memory;
pub mod delete;
pub mod error;
pub mod permission;
pub mod register;
pub mod reingest;
pub mod retrieve;
pub mod sync;

use std::{future::Future, pin::Pin, sync::Arc};

pub use chat_memory::{ChatMemoryProvider, WindowStrategy};
pub use delete::{DeleteRequest, DeleteResponse};
pub use error::{Error, Result};
pub use permission::{
	GetPermissionRequest, GetPermissionResponse, PermissionEntry, RemovePermissionRequest,
	SetPermissionRequest,
};
pub use register::{RegisterRequest, RegisterResponse};
pub use reingest::ReingestRequest;
pub use retrieve::{RetrieveItem, RetrieveRequest, RetrieveResponse};

use arca_config::{Config, EmbeddingProviderConfig};
use arca_providers::embedding::{self, Embedding};
use arca_storage::{db::Db, files::FileStore, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, arca_providers::Result<Embedding>>;
}

/// Turns a stored blob back into plain text for chunking. Kept behind a trait
/// so richer formats can slot in without touching the pipeline.
pub trait DocumentParser
where
	Self: Send + Sync,
{
	fn parse(&self, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Accepts `text/*` content and anything that decodes as UTF-8.
pub struct PlainTextParser;
impl DocumentParser for PlainTextParser {
	fn parse(&self, bytes: &[u8], content_type: &str) -> Result<String> {
		String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidRequest {
			message: format!("Content of type {content_type} is not valid UTF-8 text."),
		})
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, arca_providers::Result<Embedding>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

pub struct ArcaService {
	pub cfg: Config,
	pub db: Db,
	pub qdrant: QdrantStore,
	pub files: Arc<dyn FileStore>,
	pub providers: Providers,
}

/// Embeds a batch and checks every vector against the configured
/// dimensionality before anything is persisted.
pub async fn embed_checked(
	providers: &Providers,
	cfg: &EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Embedding> {
	let embedding = providers.embedding.embed(cfg, texts).await?;

	if embedding.vectors.len() != texts.len() {
		return Err(Error::Provider {
			message: format!(
				"Embedding provider returned {} vectors for {} inputs.",
				embedding.vectors.len(),
				texts.len()
			),
		});
	}

	for vector in &embedding.vectors {
		if vector.len() != cfg.dimensions as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding dimensionality {} does not match the configured {}.",
					vector.len(),
					cfg.dimensions
				),
			});
		}
	}

	Ok(embedding)
}
