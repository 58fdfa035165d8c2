use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;

use crate::{BoxFuture, Error, Result};

/// Content-addressed blob storage keyed by checksum. The registry and the
/// ingestion pipeline only ever talk to this seam; `NotFound` is
/// distinguishable from an unexpected storage failure.
pub trait FileStore
where
	Self: Send + Sync,
{
	fn store<'a>(
		&'a self,
		checksum: &'a str,
		bytes: &'a [u8],
		metadata: &'a Value,
	) -> BoxFuture<'a, Result<()>>;
	fn get<'a>(&'a self, checksum: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
	fn delete<'a>(&'a self, checksum: &'a str) -> BoxFuture<'a, Result<()>>;
	fn delete_all<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

/// Local-disk implementation, sharded by checksum prefix
/// (`<root>/ab/abcdef...`), with a JSON metadata sidecar next to each blob.
pub struct LocalFileStore {
	root: PathBuf,
}
impl LocalFileStore {
	pub fn new(cfg: &arca_config::Files) -> Self {
		Self { root: PathBuf::from(&cfg.root) }
	}

	fn blob_path(&self, checksum: &str) -> Result<PathBuf> {
		validate_checksum(checksum)?;

		Ok(self.root.join(&checksum[..2]).join(checksum))
	}

	fn meta_path(blob: &Path) -> PathBuf {
		let mut meta = blob.as_os_str().to_owned();

		meta.push(".meta.json");

		PathBuf::from(meta)
	}
}
impl FileStore for LocalFileStore {
	fn store<'a>(
		&'a self,
		checksum: &'a str,
		bytes: &'a [u8],
		metadata: &'a Value,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let blob = self.blob_path(checksum)?;

			if let Some(parent) = blob.parent() {
				fs::create_dir_all(parent).await?;
			}

			fs::write(&blob, bytes).await?;
			fs::write(Self::meta_path(&blob), serde_json::to_vec(metadata)?).await?;

			Ok(())
		})
	}

	fn get<'a>(&'a self, checksum: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let blob = self.blob_path(checksum)?;

			match fs::read(&blob).await {
				Ok(bytes) => Ok(bytes),
				Err(err) if err.kind() == std::io::ErrorKind::NotFound =>
					Err(Error::NotFound(format!("No blob stored for checksum {checksum}."))),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn delete<'a>(&'a self, checksum: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let blob = self.blob_path(checksum)?;

			match fs::remove_file(&blob).await {
				Ok(()) => {
					// Sidecar removal is best-effort; a missing sidecar is fine.
					let _ = fs::remove_file(Self::meta_path(&blob)).await;

					Ok(())
				},
				Err(err) if err.kind() == std::io::ErrorKind::NotFound =>
					Err(Error::NotFound(format!("No blob stored for checksum {checksum}."))),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn delete_all<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match fs::remove_dir_all(&self.root).await {
				Ok(()) => {},
				Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
				Err(err) => return Err(err.into()),
			}

			fs::create_dir_all(&self.root).await?;

			Ok(())
		})
	}
}

fn validate_checksum(checksum: &str) -> Result<()> {
	if checksum.len() < 3 || !checksum.chars().all(|ch| ch.is_ascii_alphanumeric()) {
		return Err(Error::InvalidArgument(format!("Invalid checksum {checksum:?}.")));
	}

	Ok(())
}
