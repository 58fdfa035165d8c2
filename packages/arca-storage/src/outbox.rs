use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{IngestJob, SyncOutboxEntry},
};

const MAX_ERROR_CHARS: usize = 1_024;

#[derive(Clone, Copy, Debug)]
pub struct Backoff {
	pub base_ms: i64,
	pub max_ms: i64,
}
impl Backoff {
	/// Capped exponential backoff keyed to the attempt counter.
	pub fn for_attempt(&self, attempt: i32) -> Duration {
		let attempts = attempt.max(1) as u32;
		let exp = attempts.saturating_sub(1).min(6);
		let base = self.base_ms.saturating_mul(1 << exp);

		Duration::milliseconds(base.min(self.max_ms))
	}
}

/// Claims the next due ingest job. A claim flips the row to RUNNING under a
/// lease; lease-expired RUNNING rows are reclaimable so a crashed worker does
/// not strand its job. FAILED rows are terminal and never reclaimed
/// (ingestion is not auto-retried).
pub async fn claim_ingest_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<IngestJob>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, IngestJob>(
		"\
SELECT *
FROM ingest_jobs
WHERE (status = 'PENDING' OR (status = 'RUNNING' AND available_at <= $1))
	AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE ingest_jobs SET status = 'RUNNING', available_at = $1, updated_at = $2 WHERE knowledge_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.knowledge_id)
		.execute(&mut *tx)
		.await?;

		job.status = "RUNNING".to_string();
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_ingest_done(db: &Db, knowledge_id: Uuid) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"UPDATE ingest_jobs SET status = 'DONE', updated_at = $1 WHERE knowledge_id = $2",
	)
	.bind(now)
	.bind(knowledge_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_ingest_failed(db: &Db, knowledge_id: Uuid, attempts: i32, error: &str) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
UPDATE ingest_jobs
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	updated_at = $3
WHERE knowledge_id = $4",
	)
	.bind(attempts.saturating_add(1))
	.bind(sanitize_error(error))
	.bind(now)
	.bind(knowledge_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Claims the next due permission-sync request. FAILED rows stay claimable:
/// sync is at-least-once and must never be dropped.
pub async fn claim_permission_sync(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<SyncOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, SyncOutboxEntry>(
		"\
SELECT *
FROM permission_sync_outbox
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE permission_sync_outbox SET available_at = $1, updated_at = $2 WHERE knowledge_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.knowledge_id)
		.execute(&mut *tx)
		.await?;

		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

/// Completes a sync request, but only when no newer enqueue landed while the
/// claim was held; a concurrent permission mutation resets the row to PENDING
/// and that state must survive.
pub async fn mark_permission_sync_done(db: &Db, knowledge_id: Uuid, claimed_at: OffsetDateTime) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
UPDATE permission_sync_outbox
SET status = 'DONE', updated_at = $1
WHERE knowledge_id = $2 AND updated_at = $3",
	)
	.bind(now)
	.bind(knowledge_id)
	.bind(claimed_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_permission_sync_failed(
	db: &Db,
	knowledge_id: Uuid,
	attempts: i32,
	error: &str,
	backoff: Backoff,
) -> Result<()> {
	let next_attempts = attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let available_at = now + backoff.for_attempt(next_attempts);

	sqlx::query(
		"\
UPDATE permission_sync_outbox
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE knowledge_id = $5",
	)
	.bind(next_attempts)
	.bind(sanitize_error(error))
	.bind(available_at)
	.bind(now)
	.bind(knowledge_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Trims and redacts credential-looking fragments before an error lands in a
/// table an operator will read.
pub fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
