pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Startup error: {message}")]
	Startup { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Duplicate content: {kind} knowledge with checksum {checksum} is already registered.")]
	DuplicateChecksum { kind: String, checksum: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<arca_storage::Error> for Error {
	fn from(err: arca_storage::Error) -> Self {
		match err {
			arca_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			arca_storage::Error::Io(inner) => Self::Storage { message: inner.to_string() },
			arca_storage::Error::SerdeJson(inner) => Self::Storage { message: inner.to_string() },
			arca_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			arca_storage::Error::NotFound(message) => Self::NotFound { message },
			arca_storage::Error::Conflict(message) => Self::Conflict { message },
			arca_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<arca_providers::Error> for Error {
	fn from(err: arca_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
