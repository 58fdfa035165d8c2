pub mod knowledge;
pub mod permission;

pub use knowledge::{IngestionStatus, KnowledgeKind};
pub use permission::{
	PERMISSION_DELIMITER, Permission, WILDCARD_USER, contains_user, decode_permissions,
	effective_permission, encode_permissions, grants_any, is_valid_username, probe_for,
};
