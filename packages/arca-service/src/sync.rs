use uuid::Uuid;

use crate::Result;
use arca_domain::{Permission, encode_permissions};
use arca_storage::{db::Db, knowledge, models::PermissionRow, qdrant::QdrantStore};

/// Canonical read-visibility encoding of a permission map: every username
/// whose level grants read, sorted and delimiter-wrapped.
pub fn encode_read_permissions(rows: &[PermissionRow]) -> String {
	encode_permissions(rows.iter().filter_map(|row| {
		Permission::parse(&row.level)
			.unwrap_or_default()
			.grants_read()
			.then_some(row.username.as_str())
	}))
}

/// Re-derives the encoded permission string from the metadata store and writes
/// it over every point of the knowledge id. Idempotent, so at-least-once
/// delivery from the outbox is safe; the metadata store is read fresh on each
/// attempt, which makes coalesced outbox entries converge on the latest state.
pub async fn sync_permission_metadata(
	db: &Db,
	qdrant: &QdrantStore,
	knowledge_id: Uuid,
) -> Result<()> {
	let rows = knowledge::list_permissions(&db.pool, knowledge_id).await?;
	let encoded = encode_read_permissions(&rows);

	qdrant.set_permission_payload(knowledge_id, &encoded).await?;

	tracing::debug!(
		knowledge_id = %knowledge_id,
		readers = rows.len(),
		"Synchronized permission payload."
	);

	Ok(())
}
