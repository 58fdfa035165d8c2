use std::collections::HashMap;

use qdrant_client::qdrant::{ScoredPoint, Value, value::Kind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ArcaService, Error, Result};
use arca_storage::qdrant::QueryCaller;

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveRequest {
	pub query: String,
	/// Absent means an anonymous caller, visible only through wildcard grants.
	#[serde(default)]
	pub caller: Option<String>,
	#[serde(default)]
	pub knowledge_ids: Option<Vec<Uuid>>,
	#[serde(default)]
	pub limit: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveItem {
	pub knowledge_id: Uuid,
	pub segment_index: i32,
	pub text: String,
	pub score: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
	pub items: Vec<RetrieveItem>,
}

impl ArcaService {
	/// Similarity retrieval under the caller's visibility. The permission
	/// filter runs inside the vector store, so invisible segments never reach
	/// this process.
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<RetrieveResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "Query must not be empty.".to_string() });
		}

		let caller = caller_from(req.caller.as_deref())?;
		let limit = req.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
		let texts = [query.to_string()];
		let embedding =
			crate::embed_checked(&self.providers, &self.cfg.providers.embedding, &texts).await?;
		let Some(vector) = embedding.vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vector for the query.".to_string(),
			});
		};
		let points = self
			.qdrant
			.query(vector, req.knowledge_ids.as_deref(), &caller, limit)
			.await
			.map_err(crate::Error::from)?;
		let items = points.into_iter().filter_map(scored_point_item).collect();

		Ok(RetrieveResponse { items })
	}
}

/// The wildcard identity holds no grants of its own, so a caller naming it
/// gets the anonymous visibility arm instead of a username probe.
fn caller_from(raw: Option<&str>) -> Result<QueryCaller> {
	match raw.map(str::trim) {
		Some(username) if !username.is_empty() && username != arca_domain::WILDCARD_USER => {
			if !arca_domain::is_valid_username(username) {
				return Err(Error::InvalidRequest {
					message: "Caller must be a single token of ASCII letters and digits."
						.to_string(),
				});
			}

			Ok(QueryCaller::User(username.to_string()))
		},
		_ => Ok(QueryCaller::Anonymous),
	}
}

fn scored_point_item(point: ScoredPoint) -> Option<RetrieveItem> {
	let knowledge_id = payload_uuid(&point.payload, arca_storage::qdrant::KNOWLEDGE_ID_FIELD)?;
	let segment_index = payload_i32(&point.payload, "segment_index")?;
	let text = payload_string(&point.payload, "text")?;

	Some(RetrieveItem { knowledge_id, segment_index, text, score: point.score })
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Uuid::parse_str(text).ok(),
		_ => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_i32(payload: &HashMap<String, Value>, key: &str) -> Option<i32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => i32::try_from(*value).ok(),
		_ => None,
	}
}
