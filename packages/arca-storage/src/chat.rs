use sqlx::PgPool;

use crate::{BoxFuture, Result, models::ChatMessageRow};

/// Persisted full-history message store backing the chat memory window.
/// Ordered by `seq`; an empty result is "no history yet", not an error.
pub trait ChatMemoryStore
where
	Self: Send + Sync,
{
	fn get_messages<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<ChatMessageRow>>>;
	fn update_messages<'a>(
		&'a self,
		session_id: &'a str,
		messages: &'a [ChatMessageRow],
	) -> BoxFuture<'a, Result<()>>;
	fn delete_messages<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub struct PgChatMemoryStore {
	pool: PgPool,
}
impl PgChatMemoryStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}
impl ChatMemoryStore for PgChatMemoryStore {
	fn get_messages<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<ChatMessageRow>>> {
		Box::pin(async move {
			let rows = sqlx::query_as::<_, ChatMessageRow>(
				"\
SELECT seq, role, content, created_at
FROM chat_messages
WHERE session_id = $1
ORDER BY seq ASC",
			)
			.bind(session_id)
			.fetch_all(&self.pool)
			.await?;

			Ok(rows)
		})
	}

	// Replace-all in one transaction so readers never observe a half-written
	// session.
	fn update_messages<'a>(
		&'a self,
		session_id: &'a str,
		messages: &'a [ChatMessageRow],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
				.bind(session_id)
				.execute(&mut *tx)
				.await?;

			for message in messages {
				sqlx::query(
					"\
INSERT INTO chat_messages (session_id, seq, role, content, created_at)
VALUES ($1, $2, $3, $4, $5)",
				)
				.bind(session_id)
				.bind(message.seq)
				.bind(&message.role)
				.bind(&message.content)
				.bind(message.created_at)
				.execute(&mut *tx)
				.await?;
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn delete_messages<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
				.bind(session_id)
				.execute(&self.pool)
				.await?;

			Ok(())
		})
	}
}
