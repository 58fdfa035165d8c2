use std::sync::Arc;

use crate::acceptance::{self, StubEmbedding};
use arca_domain::{KnowledgeKind, Permission};
use arca_service::{
	ArcaService, GetPermissionRequest, RegisterRequest, RemovePermissionRequest, RetrieveRequest,
	SetPermissionRequest,
};
use arca_worker::worker::{self, WorkerState};

async fn visible_count(service: &ArcaService, caller: Option<&str>) -> usize {
	service
		.retrieve(RetrieveRequest {
			query: "shared facts".to_string(),
			caller: caller.map(str::to_string),
			knowledge_ids: None,
			limit: None,
		})
		.await
		.expect("Failed to retrieve.")
		.items
		.len()
}

async fn grant(service: &ArcaService, state: &WorkerState, id: uuid::Uuid, user: &str, level: Permission) {
	service
		.set_permission(SetPermissionRequest {
			knowledge_id: id,
			username: user.to_string(),
			level,
		})
		.await
		.expect("Failed to set permission.");
	assert!(
		worker::process_permission_sync_once(state)
			.await
			.expect("Failed to process permission sync.")
	);
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set ARCA_PG_DSN and ARCA_QDRANT_URL to run."]
async fn visibility_follows_the_synchronized_permission_map() {
	let Some(qdrant_url) = acceptance::test_qdrant_url() else {
		eprintln!(
			"Skipping visibility_follows_the_synchronized_permission_map; set ARCA_QDRANT_URL to run."
		);

		return;
	};
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!(
			"Skipping visibility_follows_the_synchronized_permission_map; set ARCA_PG_DSN to run."
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
			kind: KnowledgeKind::Text,
			content: b"Shared facts live here.".to_vec(),
			content_type: "text/plain".to_string(),
			source: "inline".to_string(),
			label: None,
			tags: Vec::new(),
			checksum: None,
		})
		.await
		.expect("Failed to register knowledge.");
	let id = registered.knowledge_id;

	assert!(worker::process_ingest_once(&state).await.expect("Failed to process ingest job."));

	// No grants yet: nobody sees the content.
	assert_eq!(visible_count(&service, Some("alice")).await, 0);
	assert_eq!(visible_count(&service, None).await, 0);

	grant(&service, &state, id, "alice", Permission::Read).await;

	assert_eq!(visible_count(&service, Some("alice")).await, 1);
	assert_eq!(visible_count(&service, Some("bob")).await, 0);
	// A proper substring of a granted username never matches.
	assert_eq!(visible_count(&service, Some("al")).await, 0);
	assert_eq!(visible_count(&service, Some("alice2")).await, 0);
	assert_eq!(visible_count(&service, None).await, 0);

	// Write grants read; NONE grants nothing.
	grant(&service, &state, id, "bob", Permission::Write).await;
	grant(&service, &state, id, "carol", Permission::None).await;

	assert_eq!(visible_count(&service, Some("bob")).await, 1);
	assert_eq!(visible_count(&service, Some("carol")).await, 0);

	// The wildcard admits everyone, including anonymous callers.
	grant(&service, &state, id, "*", Permission::Read).await;

	assert_eq!(visible_count(&service, None).await, 1);
	assert_eq!(visible_count(&service, Some("mallory")).await, 1);

	// Removing the wildcard closes anonymous access again; alice keeps her
	// direct grant.
	service
		.remove_permission(RemovePermissionRequest { knowledge_id: id, username: "*".to_string() })
		.await
		.expect("Failed to remove permission.");
	assert!(
		worker::process_permission_sync_once(&state)
			.await
			.expect("Failed to process permission sync.")
	);
	assert_eq!(visible_count(&service, None).await, 0);
	assert_eq!(visible_count(&service, Some("mallory")).await, 0);
	assert_eq!(visible_count(&service, Some("alice")).await, 1);

	// Effective-permission resolution matches what retrieval enforces.
	let effective = service
		.get_permission(GetPermissionRequest { knowledge_id: id, username: "carol".to_string() })
		.await
		.expect("Failed to resolve permission.");

	assert_eq!(effective.effective, Permission::None);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ARCA_PG_DSN to run."]
async fn explicit_entry_takes_precedence_over_the_wildcard() {
	let Some(test_db) = acceptance::test_db().await else {
		eprintln!(
			"Skipping explicit_entry_takes_precedence_over_the_wildcard; set ARCA_PG_DSN to run."
		);

		return;
	};
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
	let service = ArcaService { cfg, db, qdrant, files, providers };
	let registered = service
		.register(RegisterRequest {
			kind: KnowledgeKind::Text,
			content: b"Precedence sample.".to_vec(),
			content_type: "text/plain".to_string(),
			source: "inline".to_string(),
			label: None,
			tags: Vec::new(),
			checksum: None,
		})
		.await
		.expect("Failed to register knowledge.");
	let id = registered.knowledge_id;

	for (user, level) in
		[("*", Permission::Read), ("alice", Permission::None), ("bob", Permission::Owner)]
	{
		service
			.set_permission(SetPermissionRequest {
				knowledge_id: id,
				username: user.to_string(),
				level,
			})
			.await
			.expect("Failed to set permission.");
	}

	let resolve = |user: &str| {
		let service = &service;
		let username = user.to_string();

		async move {
			service
				.get_permission(GetPermissionRequest { knowledge_id: id, username })
				.await
				.expect("Failed to resolve permission.")
				.effective
		}
	};

	// Explicit NONE beats the wildcard; unknown users fall through to it.
	assert_eq!(resolve("alice").await, Permission::None);
	assert_eq!(resolve("bob").await, Permission::Owner);
	assert_eq!(resolve("dave").await, Permission::Read);

	// A punctuated name never reaches the permission map; the vector store
	// index would split it into separately matchable tokens.
	let err = service
		.set_permission(SetPermissionRequest {
			knowledge_id: id,
			username: "alice.smith".to_string(),
			level: Permission::Read,
		})
		.await
		.expect_err("Punctuated usernames must be rejected.");

	assert!(matches!(err, arca_service::Error::InvalidRequest { .. }));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
