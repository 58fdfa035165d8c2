use std::sync::Arc;

use time::OffsetDateTime;

use crate::acceptance;
use arca_service::{ChatMemoryProvider, WindowStrategy};
use arca_storage::{chat::PgChatMemoryStore, db::Db, models::ChatMessageRow};

fn message(seq: i64, role: &str, content: &str) -> ChatMessageRow {
	ChatMessageRow {
		seq,
		role: role.to_string(),
		content: content.to_string(),
		created_at: OffsetDateTime::now_utc(),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ARCA_PG_DSN to run."]
async fn windowed_history_round_trips_through_postgres() {
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!("Skipping windowed_history_round_trips_through_postgres; set ARCA_PG_DSN to run.");

		return;
	};
	let cfg = arca_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let store = Arc::new(PgChatMemoryStore::new(db.pool.clone()));
	let provider =
		ChatMemoryProvider::connect(store, WindowStrategy::MessageWindow { max_messages: 2 })
			.await
			.expect("Startup probe must succeed against an empty store.");

	provider
		.update("session-1", &[
			message(1, "user", "First question."),
			message(2, "assistant", "First answer."),
			message(3, "user", "Second question."),
		])
		.await
		.expect("Failed to write history.");

	let window = provider.window("session-1").await.expect("Failed to read window.");

	assert_eq!(window.len(), 2);
	assert_eq!(window[0].seq, 2);
	assert_eq!(window[1].seq, 3);

	// Sessions are isolated; an unknown session is simply empty.
	assert!(provider.window("session-2").await.expect("Failed to read window.").is_empty());

	provider.delete("session-1").await.expect("Failed to delete history.");
	assert!(provider.window("session-1").await.expect("Failed to read window.").is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
