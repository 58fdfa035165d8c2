use std::sync::Arc;

use time::OffsetDateTime;

use crate::acceptance::{self, StubEmbedding};
use arca_domain::KnowledgeKind;
use arca_service::{ArcaService, Error, RegisterRequest, ReingestRequest};

async fn pg_only_service(test_db: &arca_testkit::TestDatabase) -> ArcaService {
	let cfg = acceptance::test_config(
		test_db.dsn().to_string(),
		"http://127.0.0.1:6334".to_string(),
		"arca_unused".to_string(),
	);
	let (providers, _) = StubEmbedding::providers();
	let db = arca_storage::db::Db::connect(&cfg.storage.postgres)
		.await
		.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let qdrant = arca_storage::qdrant::QdrantStore::new(&cfg.storage.qdrant)
		.expect("Failed to build Qdrant client.");
	let files = Arc::new(arca_storage::files::LocalFileStore::new(&cfg.storage.files));

	ArcaService { cfg, db, qdrant, files, providers }
}

fn sample_request(content: &[u8]) -> RegisterRequest {
	RegisterRequest {
		kind: KnowledgeKind::Text,
		content: content.to_vec(),
		content_type: "text/plain".to_string(),
		source: "inline".to_string(),
		label: None,
		tags: Vec::new(),
		checksum: None,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ARCA_PG_DSN to run."]
async fn duplicate_checksum_within_a_kind_is_rejected() {
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!("Skipping duplicate_checksum_within_a_kind_is_rejected; set ARCA_PG_DSN to run.");

		return;
	};
	let service = pg_only_service(&test_db).await;

	service.register(sample_request(b"Same bytes.")).await.expect("Failed to register knowledge.");

	let err = service
		.register(sample_request(b"Same bytes."))
		.await
		.expect_err("Duplicate content must be rejected.");

	assert!(matches!(err, Error::DuplicateChecksum { .. }));

	// The same bytes under a different kind are a different entry.
	let mut as_file = sample_request(b"Same bytes.");

	as_file.kind = KnowledgeKind::File;
	as_file.source = "copy.txt".to_string();

	service.register(as_file).await.expect("Failed to register under a different kind.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ARCA_PG_DSN to run."]
async fn reingest_is_rejected_while_a_run_is_in_flight() {
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!("Skipping reingest_is_rejected_while_a_run_is_in_flight; set ARCA_PG_DSN to run.");

		return;
	};
	let service = pg_only_service(&test_db).await;
	let registered = service
		.register(sample_request(b"Busy content."))
		.await
		.expect("Failed to register knowledge.");

	// A worker claims the armed job, putting the id in flight.
	let claimed = arca_storage::outbox::claim_ingest_job(&service.db, OffsetDateTime::now_utc(), 60)
		.await
		.expect("Failed to claim ingest job.")
		.expect("The registered job must be claimable.");

	assert_eq!(claimed.knowledge_id, registered.knowledge_id);

	let replacement = b"Replacement while busy.".to_vec();
	let replacement_checksum = blake3::hash(&replacement).to_hex().to_string();
	let err = service
		.reingest(ReingestRequest {
			knowledge_id: registered.knowledge_id,
			content: Some(replacement),
			content_type: None,
			source: None,
		})
		.await
		.expect_err("Re-ingestion must be rejected while in flight.");

	assert!(matches!(err, Error::Conflict { .. }));
	// The rejected replacement blob does not linger in the file store.
	assert!(matches!(
		service.files.get(&replacement_checksum).await,
		Err(arca_storage::Error::NotFound(_))
	));

	// Once the run finishes the request goes through.
	arca_storage::outbox::mark_ingest_done(&service.db, registered.knowledge_id)
		.await
		.expect("Failed to mark ingest done.");
	service
		.set_ingestion_status(
			registered.knowledge_id,
			arca_domain::IngestionStatus::Succeeded,
			None,
		)
		.await
		.expect("Failed to record success.");
	service
		.reingest(ReingestRequest {
			knowledge_id: registered.knowledge_id,
			content: None,
			content_type: None,
			source: None,
		})
		.await
		.expect("Failed to request re-ingestion after completion.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ARCA_PG_DSN to run."]
async fn invalid_register_requests_are_rejected() {
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!("Skipping invalid_register_requests_are_rejected; set ARCA_PG_DSN to run.");

		return;
	};
	let service = pg_only_service(&test_db).await;
	let mut empty = sample_request(b"");

	empty.content = Vec::new();

	assert!(matches!(
		service.register(empty).await,
		Err(Error::InvalidRequest { .. })
	));

	let mut bad_checksum = sample_request(b"Checked bytes.");

	bad_checksum.checksum = Some("../escape".to_string());

	assert!(matches!(
		service.register(bad_checksum).await,
		Err(Error::InvalidRequest { .. })
	));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
