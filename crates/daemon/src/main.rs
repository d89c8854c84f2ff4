use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use km_daemon::AppState;

mod cli;

use cli::op::{Op, OpContext};
use cli::Cli;

const FALLBACK_LOG_LEVEL: &str = "warn";

/// `RUST_LOG` wins, then `--log-level`, then the config file.
fn log_filter(cli: &Cli) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = cli.log_level.clone().unwrap_or_else(|| {
        AppState::load(cli.config_path.clone())
            .map(|state| state.config.log_level)
            .unwrap_or_else(|_| FALLBACK_LOG_LEVEL.to_string())
    });
    EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LOG_LEVEL))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(log_filter(&cli))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true),
        )
        .init();

    let ctx = OpContext::new(cli.config_path.clone());
    match cli.command.execute(&ctx).await {
        Ok(output) => {
            println!("{output}");
        }
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            drop(guard);
            std::process::exit(1);
        }
    }
}
