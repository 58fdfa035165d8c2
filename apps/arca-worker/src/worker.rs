use std::{sync::Arc, time::Duration as StdDuration};

use time::OffsetDateTime;
use uuid::Uuid;

use arca_chunking::{SplitterConfig, Tokenizer};
use arca_domain::IngestionStatus;
use arca_service::{ArcaService, DocumentParser, Error, sync};
use arca_storage::{
	knowledge,
	outbox::{self, Backoff},
	qdrant::SegmentPoint,
};

#[derive(Clone)]
pub struct WorkerState {
	pub service: Arc<ArcaService>,
	pub parser: Arc<dyn DocumentParser>,
	pub splitter: SplitterConfig,
	pub tokenizer: Arc<Tokenizer>,
}

/// Spawns the configured number of claim loops. Different knowledge ids run in
/// parallel; the single job row per id keeps one id on one worker.
pub async fn run_worker(state: WorkerState) -> color_eyre::Result<()> {
	let workers = state.service.cfg.ingestion.workers.max(1);
	let mut handles = Vec::with_capacity(workers as usize);

	for worker_id in 0..workers {
		let state = state.clone();

		handles.push(tokio::spawn(async move { worker_loop(worker_id, state).await }));
	}

	tracing::info!(workers, "Worker loops started.");

	for handle in handles {
		handle.await?;
	}

	Ok(())
}

async fn worker_loop(worker_id: u32, state: WorkerState) {
	let poll = StdDuration::from_millis(state.service.cfg.ingestion.poll_interval_ms);

	loop {
		let mut worked = false;

		match process_ingest_once(&state).await {
			Ok(claimed) => worked |= claimed,
			Err(err) => {
				tracing::error!(worker_id, error = %err, "Ingest job processing failed.");
			},
		}
		match process_permission_sync_once(&state).await {
			Ok(claimed) => worked |= claimed,
			Err(err) => {
				tracing::error!(worker_id, error = %err, "Permission sync processing failed.");
			},
		}

		if !worked {
			tokio::time::sleep(poll).await;
		}
	}
}

/// Claims and runs at most one ingest job. A pipeline failure lands as a
/// terminal FAILED status plus a sanitized job error, never as a loop error;
/// only claim/bookkeeping problems propagate.
pub async fn process_ingest_once(state: &WorkerState) -> arca_service::Result<bool> {
	let service = &state.service;
	let now = OffsetDateTime::now_utc();
	let Some(job) = outbox::claim_ingest_job(
		&service.db,
		now,
		service.cfg.ingestion.claim_lease_seconds,
	)
	.await?
	else {
		return Ok(false);
	};

	match run_pipeline(state, job.knowledge_id).await {
		Ok(token_count) => {
			outbox::mark_ingest_done(&service.db, job.knowledge_id).await?;

			// The pipeline reads the permission rows before its upsert; a
			// mutation committing inside that window can be synced against the
			// old points and land its stale encoding with the new ones. A
			// follow-up sync pass re-applies whatever is current.
			let mut tx = service.db.pool.begin().await?;

			knowledge::enqueue_permission_sync_tx(
				&mut tx,
				job.knowledge_id,
				OffsetDateTime::now_utc(),
			)
			.await?;
			tx.commit().await?;
			tracing::info!(
				knowledge_id = %job.knowledge_id,
				token_count,
				"Ingestion succeeded."
			);
		},
		Err(err) => {
			fail_knowledge(service, job.knowledge_id).await;
			outbox::mark_ingest_failed(
				&service.db,
				job.knowledge_id,
				job.attempts,
				&err.to_string(),
			)
			.await?;
			tracing::error!(
				knowledge_id = %job.knowledge_id,
				error = %err,
				"Ingestion failed."
			);
		},
	}

	Ok(true)
}

/// fetch blob -> parse -> split -> embed once -> replace the id's points in a
/// single batch. Nothing reaches Qdrant before the one upsert call, so a
/// failed run leaves no partial vectors behind.
async fn run_pipeline(state: &WorkerState, knowledge_id: Uuid) -> arca_service::Result<Option<i64>> {
	let service = &state.service;
	let record = service.get(knowledge_id).await?;
	let bytes = service.files.get(&record.checksum).await?;
	let text = state.parser.parse(&bytes, &record.content_type)?;
	let segments = arca_chunking::split_text(&text, &state.splitter, state.tokenizer.as_ref());

	if segments.is_empty() {
		return Err(Error::InvalidRequest {
			message: "Document produced no segments to embed.".to_string(),
		});
	}

	let texts: Vec<String> = segments.iter().map(|segment| segment.text.clone()).collect();
	let embedding =
		arca_service::embed_checked(&service.providers, &service.cfg.providers.embedding, &texts)
			.await?;
	let rows = knowledge::list_permissions(&service.db.pool, knowledge_id).await?;
	let encoded = sync::encode_read_permissions(&rows);
	let points = segments
		.iter()
		.zip(embedding.vectors)
		.map(|(segment, vector)| SegmentPoint {
			segment_id: segment_id_for(knowledge_id, segment.index),
			segment_index: segment.index,
			text: segment.text.clone(),
			vector,
		})
		.collect();
	let ingested_at = OffsetDateTime::now_utc();

	// Stale points from a previous run of this id go first; a re-ingested
	// document may chunk into fewer segments than before.
	service.qdrant.delete_by_knowledge_id(knowledge_id).await?;
	service.qdrant.upsert(knowledge_id, &record.checksum, &encoded, ingested_at, points).await?;

	let token_count = embedding.total_tokens.map(|tokens| tokens as i64);

	service.set_ingestion_status(knowledge_id, IngestionStatus::Succeeded, token_count).await?;

	Ok(token_count)
}

/// Deterministic point id per (knowledge id, segment index), so a re-ingested
/// segment overwrites its predecessor instead of duplicating it.
fn segment_id_for(knowledge_id: Uuid, segment_index: i32) -> Uuid {
	let name = format!("{knowledge_id}:{segment_index}");

	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

async fn fail_knowledge(service: &ArcaService, knowledge_id: Uuid) {
	match service.set_ingestion_status(knowledge_id, IngestionStatus::Failed, None).await {
		// The record can disappear while the pipeline runs; its job row went
		// with it, so there is nothing left to mark.
		Ok(()) | Err(Error::NotFound { .. }) => {},
		Err(err) => {
			tracing::error!(
				knowledge_id = %knowledge_id,
				error = %err,
				"Failed to record FAILED ingestion status."
			);
		},
	}
}

/// Claims and delivers at most one permission-sync request. Failures back off
/// and stay claimable; sync is at-least-once and never dropped.
pub async fn process_permission_sync_once(state: &WorkerState) -> arca_service::Result<bool> {
	let service = &state.service;
	let now = OffsetDateTime::now_utc();
	let Some(entry) = outbox::claim_permission_sync(
		&service.db,
		now,
		service.cfg.ingestion.claim_lease_seconds,
	)
	.await?
	else {
		return Ok(false);
	};

	match sync::sync_permission_metadata(&service.db, &service.qdrant, entry.knowledge_id).await {
		Ok(()) => {
			outbox::mark_permission_sync_done(&service.db, entry.knowledge_id, entry.updated_at)
				.await?;
		},
		Err(err) => {
			let backoff = Backoff {
				base_ms: service.cfg.permission_sync.base_backoff_ms,
				max_ms: service.cfg.permission_sync.max_backoff_ms,
			};

			outbox::mark_permission_sync_failed(
				&service.db,
				entry.knowledge_id,
				entry.attempts,
				&err.to_string(),
				backoff,
			)
			.await?;
			tracing::error!(
				knowledge_id = %entry.knowledge_id,
				attempts = entry.attempts + 1,
				error = %err,
				"Permission sync failed; will retry."
			);
		},
	}

	Ok(true)
}
