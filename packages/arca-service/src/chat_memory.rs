use std::sync::Arc;

use uuid::Uuid;

use crate::{Error, Result};
use arca_chunking::TokenCount;
use arca_config::{self, ChatMemory};
use arca_storage::{chat::ChatMemoryStore, models::ChatMessageRow};

/// How the provider trims full history down to a working window. Both
/// strategies keep the most recent messages and preserve order.
#[derive(Clone)]
pub enum WindowStrategy {
	MessageWindow { max_messages: usize },
	TokenWindow { max_tokens: usize, counter: Arc<dyn TokenCount> },
}
impl WindowStrategy {
	/// Builds the configured strategy. The token window loads its tokenizer
	/// here, so a bad `tokenizer_repo` surfaces at startup rather than on the
	/// first conversation.
	pub fn from_config(cfg: &ChatMemory) -> Result<Self> {
		match cfg.strategy.as_str() {
			arca_config::STRATEGY_MESSAGE_WINDOW => {
				let max_messages = cfg.max_messages.ok_or_else(|| Error::Startup {
					message: "chat_memory.max_messages is required for message_window."
						.to_string(),
				})?;

				Ok(Self::MessageWindow { max_messages: max_messages as usize })
			},
			arca_config::STRATEGY_TOKEN_WINDOW => {
				let max_tokens = cfg.max_tokens.ok_or_else(|| Error::Startup {
					message: "chat_memory.max_tokens is required for token_window.".to_string(),
				})?;
				let repo = cfg.tokenizer_repo.as_deref().ok_or_else(|| Error::Startup {
					message: "chat_memory.tokenizer_repo is required for token_window."
						.to_string(),
				})?;
				let tokenizer = arca_chunking::load_tokenizer(repo).map_err(|err| {
					Error::Startup {
						message: format!("Failed to load chat memory tokenizer {repo}: {err}."),
					}
				})?;

				Ok(Self::TokenWindow {
					max_tokens: max_tokens as usize,
					counter: Arc::new(tokenizer),
				})
			},
			other => Err(Error::Startup {
				message: format!("Unknown chat memory strategy {other}."),
			}),
		}
	}
}

pub struct ChatMemoryProvider {
	store: Arc<dyn ChatMemoryStore>,
	strategy: WindowStrategy,
}
impl ChatMemoryProvider {
	/// Probes the store with a session id that cannot exist. Any store error is
	/// fatal to startup; an empty history is the expected answer.
	pub async fn connect(
		store: Arc<dyn ChatMemoryStore>,
		strategy: WindowStrategy,
	) -> Result<Self> {
		let probe = format!("startup-probe-{}", Uuid::new_v4());

		store.get_messages(&probe).await.map_err(|err| Error::Startup {
			message: format!("Chat memory store probe failed: {err}."),
		})?;

		Ok(Self { store, strategy })
	}

	/// Full persisted history trimmed to the configured window.
	pub async fn window(&self, session_id: &str) -> Result<Vec<ChatMessageRow>> {
		let messages = self.store.get_messages(session_id).await?;

		Ok(windowed(messages, &self.strategy))
	}

	pub async fn update(&self, session_id: &str, messages: &[ChatMessageRow]) -> Result<()> {
		Ok(self.store.update_messages(session_id, messages).await?)
	}

	pub async fn delete(&self, session_id: &str) -> Result<()> {
		Ok(self.store.delete_messages(session_id).await?)
	}
}

/// Pure windowing step. `token_window` walks from the newest message backwards
/// and stops at the first message that would overflow the budget; a single
/// over-budget newest message yields an empty window rather than a partial
/// message.
fn windowed(messages: Vec<ChatMessageRow>, strategy: &WindowStrategy) -> Vec<ChatMessageRow> {
	match strategy {
		WindowStrategy::MessageWindow { max_messages } => {
			let skip = messages.len().saturating_sub(*max_messages);

			messages.into_iter().skip(skip).collect()
		},
		WindowStrategy::TokenWindow { max_tokens, counter } => {
			let mut used = 0;
			let mut keep = 0;

			for message in messages.iter().rev() {
				let tokens = counter.count(&message.content);

				if used + tokens > *max_tokens {
					break;
				}

				used += tokens;
				keep += 1;
			}

			let skip = messages.len() - keep;

			messages.into_iter().skip(skip).collect()
		},
	}
}
