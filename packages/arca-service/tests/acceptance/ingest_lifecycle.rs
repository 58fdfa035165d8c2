use std::sync::{Arc, atomic::Ordering};

use qdrant_client::qdrant::{Condition, CountPointsBuilder, Filter};

use crate::acceptance::{self, StubEmbedding};
use arca_domain::{IngestionStatus, KnowledgeKind, Permission};
use arca_service::{RegisterRequest, ReingestRequest, RetrieveRequest, SetPermissionRequest};
use arca_worker::worker;

async fn point_count(service: &arca_service::ArcaService, knowledge_id: uuid::Uuid) -> u64 {
	let request = CountPointsBuilder::new(service.qdrant.collection.clone())
		.filter(Filter::must([Condition::matches(
			arca_storage::qdrant::KNOWLEDGE_ID_FIELD,
			knowledge_id.to_string(),
		)]))
		.exact(true);

	service
		.qdrant
		.client
		.count(request)
		.await
		.expect("Failed to count points.")
		.result
		.map(|result| result.count)
		.unwrap_or_default()
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set ARCA_PG_DSN and ARCA_QDRANT_URL to run."]
async fn register_ingest_and_retrieve_round_trip() {
	let Some(qdrant_url) = acceptance::test_qdrant_url() else {
		eprintln!("Skipping register_ingest_and_retrieve_round_trip; set ARCA_QDRANT_URL to run.");

		return;
	};
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!("Skipping register_ingest_and_retrieve_round_trip; set ARCA_PG_DSN to run.");

		return;
	};
	let cfg = acceptance::test_config(
		test_db.dsn().to_string(),
		qdrant_url,
		test_db.collection_name("arca_acceptance"),
	);
	let (providers, calls) = StubEmbedding::providers();
	let service =
		Arc::new(acceptance::build_service(cfg, providers).await.expect("Failed to build service."));
	let state = acceptance::worker_state(service.clone());

	// Three sentences at one token each against max_tokens = 2 splits into two
	// segments.
	let registered = service
		.register(RegisterRequest {
			kind: KnowledgeKind::Text,
			content: b"Alpha facts here. Beta facts follow. Gamma closes the file.".to_vec(),
			content_type: "text/plain".to_string(),
			source: "inline".to_string(),
			label: Some("alpha".to_string()),
			tags: vec!["test".to_string()],
			checksum: None,
		})
		.await
		.expect("Failed to register knowledge.");

	assert_eq!(registered.status, IngestionStatus::Pending);

	assert!(worker::process_ingest_once(&state).await.expect("Failed to process ingest job."));

	let record = service.get(registered.knowledge_id).await.expect("Failed to fetch knowledge.");

	assert_eq!(record.ingestion_status, "SUCCEEDED");
	// One provider call for the whole batch; the stub reports 7 tokens per
	// segment.
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(record.token_count, Some(14));
	assert_eq!(point_count(&service, registered.knowledge_id).await, 2);

	// Content is invisible until a grant lands and the synchronizer runs.
	service
		.set_permission(SetPermissionRequest {
			knowledge_id: registered.knowledge_id,
			username: "*".to_string(),
			level: Permission::Read,
		})
		.await
		.expect("Failed to set permission.");

	assert!(
		worker::process_permission_sync_once(&state)
			.await
			.expect("Failed to process permission sync.")
	);

	let response = service
		.retrieve(RetrieveRequest {
			query: "alpha facts".to_string(),
			caller: None,
			knowledge_ids: Some(vec![registered.knowledge_id]),
			limit: None,
		})
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.items.len(), 2);

	for item in &response.items {
		assert_eq!(item.knowledge_id, registered.knowledge_id);
		assert!(!item.text.is_empty());
	}

	let mut indexes: Vec<i32> = response.items.iter().map(|item| item.segment_index).collect();

	indexes.sort_unstable();

	assert_eq!(indexes, vec![0, 1]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set ARCA_PG_DSN and ARCA_QDRANT_URL to run."]
async fn reingest_with_replacement_content_replaces_the_partition() {
	let Some(qdrant_url) = acceptance::test_qdrant_url() else {
		eprintln!(
			"Skipping reingest_with_replacement_content_replaces_the_partition; set ARCA_QDRANT_URL to run."
		);

		return;
	};
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!(
			"Skipping reingest_with_replacement_content_replaces_the_partition; set ARCA_PG_DSN to run."
		);

		return;
	};
	let cfg = acceptance::test_config(
		test_db.dsn().to_string(),
		qdrant_url,
		test_db.collection_name("arca_acceptance"),
	);
	let (providers, _) = StubEmbedding::providers();
	let service =
		Arc::new(acceptance::build_service(cfg, providers).await.expect("Failed to build service."));
	let state = acceptance::worker_state(service.clone());
	let registered = service
		.register(RegisterRequest {
			kind: KnowledgeKind::File,
			content: b"First sentence. Second sentence. Third sentence.".to_vec(),
			content_type: "text/plain".to_string(),
			source: "notes.txt".to_string(),
			label: None,
			tags: Vec::new(),
			checksum: None,
		})
		.await
		.expect("Failed to register knowledge.");

	assert!(worker::process_ingest_once(&state).await.expect("Failed to process ingest job."));
	assert_eq!(point_count(&service, registered.knowledge_id).await, 2);

	service
		.reingest(ReingestRequest {
			knowledge_id: registered.knowledge_id,
			content: Some(b"Only sentence.".to_vec()),
			content_type: None,
			source: None,
		})
		.await
		.expect("Failed to request re-ingestion.");

	let record = service.get(registered.knowledge_id).await.expect("Failed to fetch knowledge.");

	assert_eq!(record.ingestion_status, "PENDING");
	assert_ne!(record.checksum, registered.checksum);

	assert!(worker::process_ingest_once(&state).await.expect("Failed to process ingest job."));

	// The shorter document chunks into one segment; the stale second point is
	// gone.
	assert_eq!(point_count(&service, registered.knowledge_id).await, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set ARCA_PG_DSN and ARCA_QDRANT_URL to run."]
async fn failed_pipeline_leaves_terminal_status_and_no_vectors() {
	let Some(qdrant_url) = acceptance::test_qdrant_url() else {
		eprintln!(
			"Skipping failed_pipeline_leaves_terminal_status_and_no_vectors; set ARCA_QDRANT_URL to run."
		);

		return;
	};
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!(
			"Skipping failed_pipeline_leaves_terminal_status_and_no_vectors; set ARCA_PG_DSN to run."
		);

		return;
	};
	let cfg = acceptance::test_config(
		test_db.dsn().to_string(),
		qdrant_url,
		test_db.collection_name("arca_acceptance"),
	);
	let providers = arca_service::Providers::new(Arc::new(acceptance::FailingEmbedding));
	let service =
		Arc::new(acceptance::build_service(cfg, providers).await.expect("Failed to build service."));
	let state = acceptance::worker_state(service.clone());
	let registered = service
		.register(RegisterRequest {
			kind: KnowledgeKind::Text,
			content: b"Doomed sentence.".to_vec(),
			content_type: "text/plain".to_string(),
			source: "inline".to_string(),
			label: None,
			tags: Vec::new(),
			checksum: None,
		})
		.await
		.expect("Failed to register knowledge.");

	assert!(worker::process_ingest_once(&state).await.expect("Failed to process ingest job."));

	let record = service.get(registered.knowledge_id).await.expect("Failed to fetch knowledge.");

	assert_eq!(record.ingestion_status, "FAILED");
	assert_eq!(record.token_count, None);
	assert_eq!(point_count(&service, registered.knowledge_id).await, 0);

	// Failure is terminal until an explicit re-ingestion request.
	assert!(!worker::process_ingest_once(&state).await.expect("Failed to poll for jobs."));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set ARCA_PG_DSN and ARCA_QDRANT_URL to run."]
async fn successful_ingestion_schedules_a_follow_up_permission_sync() {
	let Some(qdrant_url) = acceptance::test_qdrant_url() else {
		eprintln!(
			"Skipping successful_ingestion_schedules_a_follow_up_permission_sync; set ARCA_QDRANT_URL to run."
		);

		return;
	};
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!(
			"Skipping successful_ingestion_schedules_a_follow_up_permission_sync; set ARCA_PG_DSN to run."
		);

		return;
	};
	let cfg = acceptance::test_config(
		test_db.dsn().to_string(),
		qdrant_url,
		test_db.collection_name("arca_acceptance"),
	);
	let (providers, _) = StubEmbedding::providers();
	let service =
		Arc::new(acceptance::build_service(cfg, providers).await.expect("Failed to build service."));
	let state = acceptance::worker_state(service.clone());

	service
		.register(RegisterRequest {
			kind: KnowledgeKind::Text,
			content: b"Window sentence.".to_vec(),
			content_type: "text/plain".to_string(),
			source: "inline".to_string(),
			label: None,
			tags: Vec::new(),
			checksum: None,
		})
		.await
		.expect("Failed to register knowledge.");

	assert!(worker::process_ingest_once(&state).await.expect("Failed to process ingest job."));

	// A permission mutation can be synced inside the pipeline's read-to-upsert
	// window and still end up stale on the freshly written points. The ingest
	// pass therefore schedules one more sync of its own, which re-applies the
	// rows as they are now.
	assert!(
		worker::process_permission_sync_once(&state)
			.await
			.expect("Failed to process permission sync.")
	);
	assert!(
		!worker::process_permission_sync_once(&state)
			.await
			.expect("Failed to poll for permission sync.")
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
