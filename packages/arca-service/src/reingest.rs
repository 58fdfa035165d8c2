use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{ArcaService, Error, Result};
use arca_domain::IngestionStatus;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReingestRequest {
	pub knowledge_id: Uuid,
	/// Replacement content. When absent the stored blob is re-processed as-is,
	/// e.g. after a chunking or embedding configuration change.
	#[serde(default)]
	pub content: Option<Vec<u8>>,
	#[serde(default)]
	pub content_type: Option<String>,
	#[serde(default)]
	pub source: Option<String>,
}

impl ArcaService {
	/// Queues a knowledge entry for another ingestion run. Rejected while a run
	/// is already in flight, so two pipelines never race on the same id.
	pub async fn reingest(&self, req: ReingestRequest) -> Result<()> {
		let now = OffsetDateTime::now_utc();
		let record = self.get(req.knowledge_id).await?;
		let replacement = match req.content {
			Some(content) => {
				if content.is_empty() {
					return Err(Error::InvalidRequest {
						message: "Replacement content must not be empty.".to_string(),
					});
				}

				let checksum = blake3::hash(&content).to_hex().to_string();
				let content_type =
					req.content_type.as_deref().unwrap_or(&record.content_type).trim().to_string();
				let source = req.source.as_deref().unwrap_or(&record.source).trim().to_string();
				let metadata = serde_json::json!({
					"content_type": content_type,
					"source": source,
					"size": content.len(),
				});

				self.files.store(&checksum, &content, &metadata).await?;

				Some((checksum, content_type, source))
			},
			None => None,
		};
		if let Err(err) = self.queue_reingest(&record, replacement.as_ref(), now).await {
			// The replacement blob was stored ahead of the rejected queueing;
			// drop it again so nothing unreferenced lingers in the file store.
			if let Some((checksum, ..)) = &replacement
				&& checksum != &record.checksum
				&& let Err(cleanup_err) = self.files.delete(checksum).await
			{
				tracing::warn!(
					knowledge_id = %req.knowledge_id,
					checksum = %checksum,
					error = %cleanup_err,
					"Replacement blob cleanup failed after rejected re-ingestion."
				);
			}

			return Err(err);
		}

		if let Some((checksum, ..)) = &replacement
			&& checksum != &record.checksum
			&& let Err(err) = self.files.delete(&record.checksum).await
		{
			tracing::warn!(
				knowledge_id = %req.knowledge_id,
				checksum = %record.checksum,
				error = %err,
				"Old blob cleanup failed after content replacement."
			);
		}

		tracing::info!(
			knowledge_id = %req.knowledge_id,
			replaced_content = replacement.is_some(),
			"Queued knowledge for re-ingestion."
		);

		Ok(())
	}

	/// Re-arms the job row and applies the optional content replacement in one
	/// transaction.
	async fn queue_reingest(
		&self,
		record: &arca_storage::models::KnowledgeRecord,
		replacement: Option<&(String, String, String)>,
		now: OffsetDateTime,
	) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;

		if !arca_storage::knowledge::arm_ingest_job_tx(&mut tx, record.knowledge_id, now).await? {
			return Err(Error::Conflict {
				message: format!("Ingestion is already running for {}.", record.knowledge_id),
			});
		}

		if let Some((checksum, content_type, source)) = replacement {
			arca_storage::knowledge::update_checksum_source(
				&mut *tx,
				record.knowledge_id,
				checksum,
				source,
				content_type,
				now,
			)
			.await
			.map_err(|err| match err {
				arca_storage::Error::Sqlx(sqlx::Error::Database(inner))
					if inner.is_unique_violation() =>
					Error::DuplicateChecksum { kind: record.kind.clone(), checksum: checksum.clone() },
				other => other.into(),
			})?;
		}

		arca_storage::knowledge::update_ingestion_status(
			&mut *tx,
			record.knowledge_id,
			IngestionStatus::Pending.as_str(),
			None,
			now,
		)
		.await?;

		tx.commit().await?;

		Ok(())
	}
}
