use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod actuator;
mod channel;
mod cli;
mod client;
mod directive;
mod endpoint;
mod entropy;
mod error;
mod fetch;
mod poll;
mod port;
mod request;
mod response;
mod stats;
mod tls;

#[cfg(test)]
mod testutil;

fn main() -> Result<()> {
    init_tracing();
    let args = cli::Cli::parse();
    match args.cmd {
        cli::Cmd::Poll(opts) => poll::run(opts),
        cli::Cmd::Fetch(opts) => fetch::run(opts),
    }
}

/// `RUST_LOG` filter (default `info`); JSON lines when
/// `TELEOP_LOG_FORMAT=json`.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if std::env::var("TELEOP_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
