use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use clap::Parser;
use llmwarden_core::{telemetry, version};
use tracing::info;

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| version::BuildInfo::new().to_string());

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
	/// Inline YAML config
	#[arg(short, long, value_name = "config")]
	config: Option<String>,

	/// Path to a YAML config file
	#[arg(short, long, value_name = "file")]
	file: Option<PathBuf>,

	/// Parse and validate the config, then exit
	#[arg(long, value_name = "validate-only")]
	validate_only: bool,

	/// Print version (as a simple version string)
	#[arg(short = 'V', value_name = "version")]
	version_short: bool,

	/// Print version (as a multi-line report)
	#[arg(long = "version")]
	version_long: bool,
}

fn main() -> anyhow::Result<()> {
	let _log_flush = telemetry::setup_logging();

	let args = Args::parse();
	let Args {
		config,
		file,
		validate_only,
		version_short,
		version_long,
	} = args;

	if version_short {
		println!("{}", version::BuildInfo::new().version);
		return Ok(());
	}
	if version_long {
		println!("{}", *LONG_VERSION);
		return Ok(());
	}
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.unwrap()
		.block_on(async move {
			let (contents, filename) = match (config, file) {
				(Some(_), Some(_)) => {
					anyhow::bail!("only one of --config or --file")
				},
				(Some(config), None) => (config, None),
				(None, Some(file)) => {
					let contents = fs_err::tokio::read_to_string(&file).await?;
					(contents, Some(file))
				},
				(None, None) => (String::new(), None),
			};
			let config = llmwarden_gateway::config::parse_config(&contents, filename.as_deref())?;
			if validate_only {
				println!("Configuration is valid!");
				return Ok(());
			}
			run(Arc::new(config)).await
		})
}

async fn run(cfg: Arc<llmwarden_gateway::Config>) -> anyhow::Result<()> {
	info!("version: {}", version::BuildInfo::new());
	info!(
		policies = cfg.policy.policies.len(),
		listen_addr = %cfg.listen_addr,
		"starting gateway"
	);
	llmwarden_gateway::app::run(cfg)
		.await?
		.wait_termination()
		.await
}
