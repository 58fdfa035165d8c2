use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ArcaService, Error, Result};
use arca_storage::knowledge;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
	pub knowledge_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
	pub knowledge_id: Uuid,
}

impl ArcaService {
	/// Removes a knowledge entry everywhere. The metadata row is the source of
	/// truth and goes first; blob and vector cleanup are best-effort, logged on
	/// failure, and safe to repeat since both stores tolerate missing content.
	pub async fn delete(&self, req: DeleteRequest) -> Result<DeleteResponse> {
		let record = self.get(req.knowledge_id).await?;

		if !knowledge::delete_knowledge(&self.db.pool, req.knowledge_id).await? {
			return Err(Error::NotFound {
				message: format!("No knowledge with id {}.", req.knowledge_id),
			});
		}

		if let Err(err) = self.files.delete(&record.checksum).await {
			tracing::warn!(
				knowledge_id = %req.knowledge_id,
				checksum = %record.checksum,
				error = %err,
				"Blob cleanup failed after knowledge delete."
			);
		}
		if let Err(err) = self.qdrant.delete_by_knowledge_id(req.knowledge_id).await {
			tracing::warn!(
				knowledge_id = %req.knowledge_id,
				error = %err,
				"Vector cleanup failed after knowledge delete."
			);
		}

		tracing::info!(knowledge_id = %req.knowledge_id, "Deleted knowledge.");

		Ok(DeleteResponse { knowledge_id: req.knowledge_id })
	}
}
