use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{ArcaService, Error, Result};
use arca_domain::{Permission, effective_permission, is_valid_username};
use arca_storage::knowledge;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetPermissionRequest {
	pub knowledge_id: Uuid,
	pub username: String,
	pub level: Permission,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemovePermissionRequest {
	pub knowledge_id: Uuid,
	pub username: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetPermissionRequest {
	pub knowledge_id: Uuid,
	pub username: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionEntry {
	pub username: String,
	pub level: Permission,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetPermissionResponse {
	pub knowledge_id: Uuid,
	pub username: String,
	pub effective: Permission,
}

impl ArcaService {
	/// Grants or replaces one permission entry. The vector-store mirror is not
	/// written here; the same transaction enqueues a sync request and the
	/// worker converges the payload afterwards.
	pub async fn set_permission(&self, req: SetPermissionRequest) -> Result<()> {
		let username = validated_username(&req.username)?;
		let now = OffsetDateTime::now_utc();

		self.get(req.knowledge_id).await?;

		let mut tx = self.db.pool.begin().await?;

		knowledge::upsert_permission_tx(&mut tx, req.knowledge_id, username, req.level.as_str(), now)
			.await?;
		knowledge::enqueue_permission_sync_tx(&mut tx, req.knowledge_id, now).await?;

		tx.commit().await?;

		tracing::info!(
			knowledge_id = %req.knowledge_id,
			username,
			level = req.level.as_str(),
			"Updated permission entry."
		);

		Ok(())
	}

	/// Removes an entry from the permission map. Removing an absent entry is a
	/// no-op but still enqueues a sync so the mirror re-converges.
	pub async fn remove_permission(&self, req: RemovePermissionRequest) -> Result<()> {
		let username = validated_username(&req.username)?;
		let now = OffsetDateTime::now_utc();

		self.get(req.knowledge_id).await?;

		let mut tx = self.db.pool.begin().await?;

		knowledge::delete_permission_tx(&mut tx, req.knowledge_id, username).await?;
		knowledge::enqueue_permission_sync_tx(&mut tx, req.knowledge_id, now).await?;

		tx.commit().await?;

		tracing::info!(knowledge_id = %req.knowledge_id, username, "Removed permission entry.");

		Ok(())
	}

	/// Resolves the effective permission for a username, with an exact entry
	/// taking precedence over the wildcard entry.
	pub async fn get_permission(&self, req: GetPermissionRequest) -> Result<GetPermissionResponse> {
		let username = req.username.trim();

		if !is_valid_username(username) {
			return Err(Error::InvalidRequest {
				message: "Username must be a single token of ASCII letters and digits.".to_string(),
			});
		}

		self.get(req.knowledge_id).await?;

		let entries: HashMap<String, Permission> =
			knowledge::list_permissions(&self.db.pool, req.knowledge_id)
				.await?
				.into_iter()
				.map(|row| {
					let level = Permission::parse(&row.level).unwrap_or_default();

					(row.username, level)
				})
				.collect();
		let effective = effective_permission(&entries, username);

		Ok(GetPermissionResponse {
			knowledge_id: req.knowledge_id,
			username: username.to_string(),
			effective,
		})
	}

	pub async fn list_permissions(&self, knowledge_id: Uuid) -> Result<Vec<PermissionEntry>> {
		self.get(knowledge_id).await?;

		let entries = knowledge::list_permissions(&self.db.pool, knowledge_id)
			.await?
			.into_iter()
			.map(|row| PermissionEntry {
				username: row.username,
				level: Permission::parse(&row.level).unwrap_or_default(),
			})
			.collect();

		Ok(entries)
	}
}

fn validated_username(raw: &str) -> Result<&str> {
	let username = raw.trim();

	if is_valid_username(username) {
		Ok(username)
	} else {
		Err(Error::InvalidRequest {
			message: "Username must be a single token of ASCII letters and digits.".to_string(),
		})
	}
}
