//! Hone CLI entrypoint.

use clap::Parser;
use console::style;
use hone_core::config::{ALL_TARGET, DEFAULT_CONFIG_PATH};
use hone_scheduler::ServiceRelease;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod run;
mod scm;

use run::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "hone")]
#[command(author, version, about = "Run a target and its dependencies", long_about = None)]
struct Cli {
    /// `[CONFIG] [TARGET]`. A single value is the target.
    #[arg(value_name = "ARGS", num_args = 0..=2)]
    args: Vec<String>,

    /// Start dependents of a service once it is running instead of waiting
    /// for it to exit.
    #[arg(long)]
    detach_services: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn options(&self) -> RunOptions {
        let (config, target) = match self.args.as_slice() {
            [] => (DEFAULT_CONFIG_PATH, ALL_TARGET),
            [target] => (DEFAULT_CONFIG_PATH, target.as_str()),
            [config, target, ..] => (config.as_str(), target.as_str()),
        };
        RunOptions {
            config: PathBuf::from(config),
            target: target.to_string(),
            service_release: if self.detach_services {
                ServiceRelease::OnDetach
            } else {
                ServiceRelease::OnTermination
            },
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        fmt.json().init();
    } else {
        fmt.with_target(false).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let code = match run::run(&cli.options()).await {
        // Exit statuses are a byte; keep failures non-zero.
        Ok(errors) => errors.len().min(255) as i32,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}
