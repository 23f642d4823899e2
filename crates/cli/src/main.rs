mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use tracing::{debug, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The verbosity flag takes precedence over the environment variable
    // for log control: `UASCOPE_LOG=warn uascope -vvv ...` still logs at
    // trace level. The environment variable can set per-crate levels.
    let env_filter = EnvFilter::builder()
        .with_default_directive("reqwest=warn".parse()?)
        .with_env_var("UASCOPE_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    // load config
    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/uascope/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/uascope/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    if let Some(data_file) = &cli.data_file {
        config.data.file = data_file.clone();
    }
    debug!(?config, "effective configuration");

    match cli.command {
        Command::Detect(args) => commands::detect(config, args).await,
        Command::Batch(args) => commands::batch(config, args).await,
        Command::Bench(args) => commands::bench(config, args).await,
        Command::Watch(args) => commands::watch(config, args).await,
    }
}
