mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	ChatMemory, Chunking, Config, EmbeddingProviderConfig, Files, Ingestion, PermissionSync,
	Postgres, Providers, Qdrant, Service, Storage,
};

use std::{fs, path::Path};

pub const STRATEGY_MESSAGE_WINDOW: &str = "message_window";
pub const STRATEGY_TOKEN_WINDOW: &str = "token_window";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.files.root.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.files.root must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.ingestion.workers == 0 {
		return Err(Error::Validation {
			message: "ingestion.workers must be greater than zero.".to_string(),
		});
	}
	if cfg.ingestion.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "ingestion.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.permission_sync.base_backoff_ms <= 0 {
		return Err(Error::Validation {
			message: "permission_sync.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.permission_sync.max_backoff_ms < cfg.permission_sync.base_backoff_ms {
		return Err(Error::Validation {
			message: "permission_sync.max_backoff_ms must be at least base_backoff_ms."
				.to_string(),
		});
	}
	if cfg.chunking.max_tokens == 0 {
		return Err(Error::Validation {
			message: "chunking.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_tokens >= cfg.chunking.max_tokens {
		return Err(Error::Validation {
			message: "chunking.overlap_tokens must be less than chunking.max_tokens.".to_string(),
		});
	}

	match cfg.chat_memory.strategy.as_str() {
		STRATEGY_MESSAGE_WINDOW => {
			if cfg.chat_memory.max_messages.map(|max| max == 0).unwrap_or(true) {
				return Err(Error::Validation {
					message:
						"chat_memory.max_messages is required and must be greater than zero for the message_window strategy."
							.to_string(),
				});
			}
		},
		STRATEGY_TOKEN_WINDOW => {
			if cfg.chat_memory.max_tokens.map(|max| max == 0).unwrap_or(true) {
				return Err(Error::Validation {
					message:
						"chat_memory.max_tokens is required and must be greater than zero for the token_window strategy."
							.to_string(),
				});
			}
			if cfg.chat_memory.tokenizer_repo.is_none() {
				return Err(Error::Validation {
					message: "chat_memory.tokenizer_repo is required for the token_window strategy."
						.to_string(),
				});
			}
		},
		_ => {
			return Err(Error::Validation {
				message: "chat_memory.strategy must be one of message_window or token_window."
					.to_string(),
			});
		},
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.chunking.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.chunking.tokenizer_repo = None;
	}
	if cfg
		.chat_memory
		.tokenizer_repo
		.as_deref()
		.map(|repo| repo.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.chat_memory.tokenizer_repo = None;
	}
}
