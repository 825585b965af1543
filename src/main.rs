mod cli;

use std::sync::Arc;

use clap::{Parser, error::ErrorKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agentwwise::config;
use agentwwise::server;
use agentwwise::session::Session;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are informational, not errors
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.print().expect("failed to write to stdout");
                std::process::exit(0);
            }
            e.print().expect("failed to write to stderr");
            std::process::exit(2);
        }
    };

    // stdout is the protocol channel; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    if cli.list_verbs {
        println!("{}", server::render_verb_listing());
        return;
    }

    let (config_path, config_file) = config::load_config(cli.config.as_deref());
    let mut resolved = config::resolve_config(&config_file, config_path);
    if let Some(url) = cli.url {
        resolved.url = url;
    }
    if let Some(timeout) = cli.timeout {
        resolved.call_timeout_ms = timeout;
    }

    if let Err(e) = url::Url::parse(&resolved.url) {
        error!(url = %resolved.url, error = %e, "invalid WAAPI endpoint URL");
        std::process::exit(2);
    }

    info!(
        url = %resolved.url,
        config = ?resolved.config_path,
        "starting tool server"
    );
    let session = Arc::new(Session::new(resolved.session_config()));

    let exit_code = tokio::select! {
        result = server::serve(Arc::clone(&session)) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "stdio server failed");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; shutting down");
            0
        }
    };

    session.disconnect().await;
    std::process::exit(exit_code);
}
