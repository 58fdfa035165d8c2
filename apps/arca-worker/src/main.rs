use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	arca_worker::run(arca_worker::Args::parse()).await
}
