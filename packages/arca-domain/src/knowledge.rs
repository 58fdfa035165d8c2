use serde::{Deserialize, Serialize};

/// Origin of a knowledge item. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeKind {
	File,
	Text,
}
impl KnowledgeKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::File => "FILE",
			Self::Text => "TEXT",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"FILE" => Some(Self::File),
			"TEXT" => Some(Self::Text),
			_ => None,
		}
	}
}

/// Lifecycle status of a knowledge item.
///
/// `Pending` moves to exactly one terminal state per ingestion attempt. The
/// only way out of a terminal state is a full re-ingestion, which re-enters at
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestionStatus {
	Pending,
	Succeeded,
	Failed,
}
impl IngestionStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Succeeded => "SUCCEEDED",
			Self::Failed => "FAILED",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"PENDING" => Some(Self::Pending),
			"SUCCEEDED" => Some(Self::Succeeded),
			"FAILED" => Some(Self::Failed),
			_ => None,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Succeeded | Self::Failed)
	}

	pub fn can_transition(&self, next: Self) -> bool {
		match self {
			Self::Pending => next.is_terminal(),
			Self::Succeeded | Self::Failed => next == Self::Pending,
		}
	}
}
