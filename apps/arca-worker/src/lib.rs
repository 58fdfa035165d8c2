pub mod worker;

use std::sync::Arc;

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use tracing_subscriber::EnvFilter;

use arca_service::{ArcaService, PlainTextParser, Providers};
use arca_storage::{db::Db, files::LocalFileStore, qdrant::QdrantStore};

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

#[derive(Debug, Parser)]
#[command(
	version = VERSION,
	rename_all = "kebab",
	styles = styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = arca_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	// Collection and payload indexes must be in place before any pipeline or
	// permission sync touches the store; failure here aborts startup.
	qdrant.ensure_collection().await?;

	let files = Arc::new(LocalFileStore::new(&config.storage.files));
	let tokenizer_repo = config
		.chunking
		.tokenizer_repo
		.clone()
		.unwrap_or_else(|| config.providers.embedding.model.clone());
	let tokenizer = arca_chunking::load_tokenizer(&tokenizer_repo)
		.map_err(|err| color_eyre::eyre::eyre!(err))?;
	let splitter = arca_chunking::SplitterConfig {
		max_tokens: config.chunking.max_tokens,
		overlap_tokens: config.chunking.overlap_tokens,
	};
	let service = Arc::new(ArcaService {
		cfg: config,
		db,
		qdrant,
		files,
		providers: Providers::default(),
	});
	let state = worker::WorkerState {
		service,
		parser: Arc::new(PlainTextParser),
		splitter,
		tokenizer: Arc::new(tokenizer),
	};

	worker::run_worker(state).await
}
