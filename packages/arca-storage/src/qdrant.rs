use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, Query, QueryPointsBuilder,
		ScoredPoint, SetPayloadPointsBuilder, TextIndexParamsBuilder, TokenizerType,
		UpsertPointsBuilder, Value, VectorParamsBuilder,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::Result;

pub const KNOWLEDGE_ID_FIELD: &str = "knowledge_id";
pub const PERMISSION_FIELD: &str = "permission";
/// Mirror of "wildcard entry present". The wildcard literal `*` never
/// tokenizes, so it cannot be probed through the text index; the synchronizer
/// keeps this flag in lockstep with the encoded string.
pub const PERMISSION_ANY_FIELD: &str = "permission_any";

/// One embedded segment headed for the collection.
#[derive(Debug, Clone)]
pub struct SegmentPoint {
	pub segment_id: Uuid,
	pub segment_index: i32,
	pub text: String,
	pub vector: Vec<f32>,
}

/// Caller identity at query time. Anonymous callers are only admitted through
/// a wildcard grant.
#[derive(Debug, Clone)]
pub enum QueryCaller {
	User(String),
	Anonymous,
}

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &arca_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Startup check: the collection must exist with the configured
	/// dimensionality and cosine distance, plus the payload indexes the
	/// permission filter depends on. Creates everything on first run; any
	/// failure here is fatal to process start.
	pub async fn ensure_collection(&self) -> Result<()> {
		if !self.client.collection_exists(&self.collection).await? {
			self.client
				.create_collection(
					CreateCollectionBuilder::new(&self.collection).vectors_config(
						VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
					),
				)
				.await?;
		}

		self.client
			.create_field_index(CreateFieldIndexCollectionBuilder::new(
				&self.collection,
				KNOWLEDGE_ID_FIELD,
				FieldType::Keyword,
			))
			.await?;
		// Word tokenization with lowercasing off: the encoded permission string
		// tokenizes to exact usernames, so a probe never matches a proper
		// substring of a member.
		self.client
			.create_field_index(
				CreateFieldIndexCollectionBuilder::new(
					&self.collection,
					PERMISSION_FIELD,
					FieldType::Text,
				)
				.field_index_params(
					TextIndexParamsBuilder::new(TokenizerType::Word).lowercase(false).build(),
				),
			)
			.await?;

		Ok(())
	}

	/// Writes one ingested document as a single batch. Nothing is persisted
	/// before this call, so a failed pipeline leaves no partial vectors.
	pub async fn upsert(
		&self,
		knowledge_id: Uuid,
		checksum: &str,
		encoded_permission: &str,
		ingested_at: OffsetDateTime,
		segments: Vec<SegmentPoint>,
	) -> Result<()> {
		let ingested_at = ingested_at.format(&Rfc3339).map_err(|err| {
			crate::Error::InvalidArgument(format!("Failed to format ingestion timestamp: {err}."))
		})?;
		let permission_any = arca_domain::grants_any(encoded_permission);
		let mut points = Vec::with_capacity(segments.len());

		for segment in segments {
			let mut payload_map = HashMap::new();

			payload_map
				.insert(KNOWLEDGE_ID_FIELD.to_string(), Value::from(knowledge_id.to_string()));
			payload_map.insert("checksum".to_string(), Value::from(checksum.to_string()));
			payload_map
				.insert("segment_index".to_string(), Value::from(i64::from(segment.segment_index)));
			payload_map.insert("text".to_string(), Value::from(segment.text));
			payload_map.insert("ingested_at".to_string(), Value::from(ingested_at.clone()));
			payload_map
				.insert(PERMISSION_FIELD.to_string(), Value::from(encoded_permission.to_string()));
			payload_map.insert(PERMISSION_ANY_FIELD.to_string(), Value::from(permission_any));

			points.push(PointStruct::new(
				segment.segment_id.to_string(),
				segment.vector,
				Payload::from(payload_map),
			));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Filtered batch payload write used by the permission synchronizer;
	/// touches every point of the knowledge id without enumerating point ids.
	pub async fn set_permission_payload(
		&self,
		knowledge_id: Uuid,
		encoded_permission: &str,
	) -> Result<()> {
		let mut payload_map = HashMap::new();

		payload_map
			.insert(PERMISSION_FIELD.to_string(), Value::from(encoded_permission.to_string()));
		payload_map.insert(
			PERMISSION_ANY_FIELD.to_string(),
			Value::from(arca_domain::grants_any(encoded_permission)),
		);

		let filter =
			Filter::must([Condition::matches(KNOWLEDGE_ID_FIELD, knowledge_id.to_string())]);
		let request = SetPayloadPointsBuilder::new(self.collection.clone(), Payload::from(payload_map))
			.points_selector(filter)
			.wait(true);

		self.client.set_payload(request).await?;

		Ok(())
	}

	pub async fn delete_by_knowledge_id(&self, knowledge_id: Uuid) -> Result<()> {
		let filter =
			Filter::must([Condition::matches(KNOWLEDGE_ID_FIELD, knowledge_id.to_string())]);
		let delete = DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

		match self.client.delete_points(delete).await {
			Ok(_) => Ok(()),
			Err(err) =>
				if is_not_found_error(&err) {
					tracing::info!(knowledge_id = %knowledge_id, "Qdrant points missing during delete.");

					Ok(())
				} else {
					Err(err.into())
				},
		}
	}

	/// Similarity query under the caller's visibility filter. The permission
	/// condition is part of the store-side filter, so content the caller may
	/// not read never surfaces regardless of similarity score.
	pub async fn query(
		&self,
		vector: Vec<f32>,
		knowledge_ids: Option<&[Uuid]>,
		caller: &QueryCaller,
		limit: u64,
	) -> Result<Vec<ScoredPoint>> {
		let mut must = Vec::new();

		if let Some(ids) = knowledge_ids {
			let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

			must.push(Condition::matches(KNOWLEDGE_ID_FIELD, ids));
		}

		must.push(Condition::from(visibility_filter(caller)));

		let request = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.filter(Filter::must(must))
			.limit(limit)
			.with_payload(true);
		let response = self.client.query(request).await?;

		Ok(response.result)
	}
}

/// A caller sees a point when their probe matches the encoded permission
/// string, or when the wildcard grant is present. Anonymous callers only have
/// the wildcard arm.
fn visibility_filter(caller: &QueryCaller) -> Filter {
	let wildcard = Condition::matches(PERMISSION_ANY_FIELD, true);

	match caller {
		QueryCaller::User(username) => Filter::should([
			Condition::matches_text(PERMISSION_FIELD, arca_domain::probe_for(username)),
			wildcard,
		]),
		QueryCaller::Anonymous => Filter::should([wildcard]),
	}
}

fn is_not_found_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}
