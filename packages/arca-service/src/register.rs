use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{ArcaService, Error, Result};
use arca_domain::{IngestionStatus, KnowledgeKind};
use arca_storage::knowledge::{self, NewKnowledge};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
	pub kind: KnowledgeKind,
	pub content: Vec<u8>,
	pub content_type: String,
	pub source: String,
	#[serde(default)]
	pub label: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
	/// Caller-supplied content hash. Computed from the content when absent.
	#[serde(default)]
	pub checksum: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
	pub knowledge_id: Uuid,
	pub checksum: String,
	pub status: IngestionStatus,
}

impl ArcaService {
	/// Registers a new source: persists the blob, inserts the PENDING metadata
	/// row, and arms the ingest job in the same transaction as the insert.
	/// Content already registered under the same kind and checksum is rejected.
	pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse> {
		let now = OffsetDateTime::now_utc();
		let content_type = req.content_type.trim();
		let source = req.source.trim();

		if req.content.is_empty() {
			return Err(Error::InvalidRequest { message: "Content must not be empty.".to_string() });
		}
		if content_type.is_empty() || source.is_empty() {
			return Err(Error::InvalidRequest {
				message: "content_type and source are required.".to_string(),
			});
		}

		let checksum = match req.checksum {
			Some(checksum) => {
				let checksum = checksum.trim().to_ascii_lowercase();

				if checksum.len() < 3 || !checksum.bytes().all(|b| b.is_ascii_alphanumeric()) {
					return Err(Error::InvalidRequest {
						message: "Checksum must be at least 3 alphanumeric characters.".to_string(),
					});
				}

				checksum
			},
			None => blake3::hash(&req.content).to_hex().to_string(),
		};

		if knowledge::exists_by_kind_checksum(&self.db.pool, req.kind.as_str(), &checksum).await? {
			return Err(Error::DuplicateChecksum {
				kind: req.kind.as_str().to_string(),
				checksum,
			});
		}

		let metadata = serde_json::json!({
			"content_type": content_type,
			"source": source,
			"size": req.content.len(),
		});

		// The blob lands before the metadata row. If the insert below loses a
		// checksum race the blob is simply re-addressable content, not a leak.
		self.files.store(&checksum, &req.content, &metadata).await?;

		let knowledge_id = Uuid::new_v4();
		let mut tx = self.db.pool.begin().await?;

		knowledge::insert_knowledge_tx(&mut tx, NewKnowledge {
			knowledge_id,
			kind: req.kind.as_str(),
			checksum: &checksum,
			content_type,
			source,
			label: req.label.as_deref(),
			tags: serde_json::json!(req.tags),
			now,
		})
		.await
		.map_err(|err| match err {
			arca_storage::Error::Sqlx(sqlx::Error::Database(inner))
				if inner.is_unique_violation() =>
				Error::DuplicateChecksum {
					kind: req.kind.as_str().to_string(),
					checksum: checksum.clone(),
				},
			other => other.into(),
		})?;
		knowledge::arm_ingest_job_tx(&mut tx, knowledge_id, now).await?;

		tx.commit().await?;

		tracing::info!(
			knowledge_id = %knowledge_id,
			kind = req.kind.as_str(),
			checksum = %checksum,
			"Registered knowledge for ingestion."
		);

		Ok(RegisterResponse { knowledge_id, checksum, status: IngestionStatus::Pending })
	}

	/// Worker-side status transition. `token_count` only sticks on SUCCEEDED;
	/// terminal states can only be left through re-ingestion.
	pub async fn set_ingestion_status(
		&self,
		knowledge_id: Uuid,
		status: IngestionStatus,
		token_count: Option<i64>,
	) -> Result<()> {
		let record = self.get(knowledge_id).await?;
		let current =
			IngestionStatus::parse(&record.ingestion_status).unwrap_or(IngestionStatus::Pending);

		if !current.can_transition(status) {
			return Err(Error::Conflict {
				message: format!(
					"Ingestion status cannot move from {} to {}.",
					current.as_str(),
					status.as_str()
				),
			});
		}

		let token_count =
			if matches!(status, IngestionStatus::Succeeded) { token_count } else { None };

		knowledge::update_ingestion_status(
			&self.db.pool,
			knowledge_id,
			status.as_str(),
			token_count,
			OffsetDateTime::now_utc(),
		)
		.await?;

		Ok(())
	}

	pub async fn get(&self, knowledge_id: Uuid) -> Result<arca_storage::models::KnowledgeRecord> {
		knowledge::fetch_knowledge(&self.db.pool, knowledge_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("No knowledge with id {knowledge_id}.") }
		})
	}

	pub async fn list(&self) -> Result<Vec<arca_storage::models::KnowledgeRecord>> {
		Ok(knowledge::list_knowledge(&self.db.pool).await?)
	}
}
