use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// One metadata record per ingested source. The checksum correlates the row
/// with the file store blob and the vector partition.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KnowledgeRecord {
	pub knowledge_id: Uuid,
	pub kind: String,
	pub checksum: String,
	pub content_type: String,
	pub source: String,
	pub label: Option<String>,
	pub tags: Value,
	pub ingestion_status: String,
	pub token_count: Option<i64>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PermissionRow {
	pub username: String,
	pub level: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SyncOutboxEntry {
	pub knowledge_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct IngestJob {
	pub knowledge_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChatMessageRow {
	pub seq: i64,
	pub role: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}
