use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::{KnowledgeRecord, PermissionRow}};

pub struct NewKnowledge<'a> {
	pub knowledge_id: Uuid,
	pub kind: &'a str,
	pub checksum: &'a str,
	pub content_type: &'a str,
	pub source: &'a str,
	pub label: Option<&'a str>,
	pub tags: serde_json::Value,
	pub now: OffsetDateTime,
}

pub async fn insert_knowledge_tx(
	tx: &mut Transaction<'_, Postgres>,
	new: NewKnowledge<'_>,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO knowledge (
	knowledge_id,
	kind,
	checksum,
	content_type,
	source,
	label,
	tags,
	ingestion_status,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', $8, $8)",
	)
	.bind(new.knowledge_id)
	.bind(new.kind)
	.bind(new.checksum)
	.bind(new.content_type)
	.bind(new.source)
	.bind(new.label)
	.bind(new.tags)
	.bind(new.now)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

pub async fn fetch_knowledge<'e, E>(executor: E, knowledge_id: Uuid) -> Result<Option<KnowledgeRecord>>
where
	E: PgExecutor<'e>,
{
	let record = sqlx::query_as::<_, KnowledgeRecord>(
		"SELECT * FROM knowledge WHERE knowledge_id = $1",
	)
	.bind(knowledge_id)
	.fetch_optional(executor)
	.await?;

	Ok(record)
}

pub async fn exists_by_kind_checksum<'e, E>(executor: E, kind: &str, checksum: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let existing: Option<Uuid> = sqlx::query_scalar(
		"SELECT knowledge_id FROM knowledge WHERE kind = $1 AND checksum = $2 LIMIT 1",
	)
	.bind(kind)
	.bind(checksum)
	.fetch_optional(executor)
	.await?;

	Ok(existing.is_some())
}

pub async fn list_knowledge<'e, E>(executor: E) -> Result<Vec<KnowledgeRecord>>
where
	E: PgExecutor<'e>,
{
	let records =
		sqlx::query_as::<_, KnowledgeRecord>("SELECT * FROM knowledge ORDER BY created_at")
			.fetch_all(executor)
			.await?;

	Ok(records)
}

/// Records a terminal (or re-entered PENDING) status. `token_count` is only
/// written alongside SUCCEEDED; it is cleared otherwise so a FAILED run never
/// leaves a stale count behind.
pub async fn update_ingestion_status<'e, E>(
	executor: E,
	knowledge_id: Uuid,
	status: &str,
	token_count: Option<i64>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"UPDATE knowledge SET ingestion_status = $1, token_count = $2, updated_at = $3 WHERE knowledge_id = $4",
	)
	.bind(status)
	.bind(token_count)
	.bind(now)
	.bind(knowledge_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn update_checksum_source<'e, E>(
	executor: E,
	knowledge_id: Uuid,
	checksum: &str,
	source: &str,
	content_type: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"UPDATE knowledge SET checksum = $1, source = $2, content_type = $3, updated_at = $4 WHERE knowledge_id = $5",
	)
	.bind(checksum)
	.bind(source)
	.bind(content_type)
	.bind(now)
	.bind(knowledge_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn list_permissions<'e, E>(executor: E, knowledge_id: Uuid) -> Result<Vec<PermissionRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, PermissionRow>(
		"SELECT username, level FROM knowledge_permissions WHERE knowledge_id = $1",
	)
	.bind(knowledge_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn upsert_permission_tx(
	tx: &mut Transaction<'_, Postgres>,
	knowledge_id: Uuid,
	username: &str,
	level: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO knowledge_permissions (knowledge_id, username, level, granted_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (knowledge_id, username) DO UPDATE
SET level = EXCLUDED.level, granted_at = EXCLUDED.granted_at",
	)
	.bind(knowledge_id)
	.bind(username)
	.bind(level)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

pub async fn delete_permission_tx(
	tx: &mut Transaction<'_, Postgres>,
	knowledge_id: Uuid,
	username: &str,
) -> Result<()> {
	sqlx::query("DELETE FROM knowledge_permissions WHERE knowledge_id = $1 AND username = $2")
		.bind(knowledge_id)
		.bind(username)
		.execute(&mut **tx)
		.await?;

	Ok(())
}

pub async fn delete_knowledge<'e, E>(executor: E, knowledge_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM knowledge WHERE knowledge_id = $1")
		.bind(knowledge_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

/// Arms the one ingest job row for the id. The conditional update never
/// touches a RUNNING row, which is what gives the at-most-one-in-flight
/// invariant; returns false when the job is currently in flight.
pub async fn arm_ingest_job_tx(
	tx: &mut Transaction<'_, Postgres>,
	knowledge_id: Uuid,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
INSERT INTO ingest_jobs (knowledge_id, status, attempts, available_at, created_at, updated_at)
VALUES ($1, 'PENDING', 0, $2, $2, $2)
ON CONFLICT (knowledge_id) DO UPDATE
SET status = 'PENDING', attempts = 0, last_error = NULL, available_at = $2, updated_at = $2
WHERE ingest_jobs.status <> 'RUNNING'",
	)
	.bind(knowledge_id)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Enqueues a permission-sync request, coalescing onto the single live row per
/// knowledge id. Called inside the same transaction as the permission-map
/// mutation so delivery is guaranteed once the mutation commits.
pub async fn enqueue_permission_sync_tx(
	tx: &mut Transaction<'_, Postgres>,
	knowledge_id: Uuid,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO permission_sync_outbox (knowledge_id, status, attempts, available_at, created_at, updated_at)
VALUES ($1, 'PENDING', 0, $2, $2, $2)
ON CONFLICT (knowledge_id) DO UPDATE
SET status = 'PENDING', attempts = 0, last_error = NULL, available_at = $2, updated_at = $2",
	)
	.bind(knowledge_id)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(())
}
