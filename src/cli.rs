use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "agentwwise",
    version,
    about = "Headless Wwise authoring automation via the Wwise Authoring API",
    long_about = "agentwwise is a headless tool-server for Wwise authoring automation. It speaks \
        line-delimited JSON-RPC 2.0 on stdin/stdout (list_commands, execute_plan, ping) and \
        drives a running Wwise authoring application through its WebSocket Authoring API \
        (WAAPI).\n\n\
        Clients submit declarative plans: ordered lists of verbs with arguments, with value \
        forwarding between steps ($last, $name.field) and all-or-nothing semantics via a \
        server-side undo group. Structured logs go to stderr; the process exits on stdin EOF.",
    term_width = 100
)]
pub struct Cli {
    /// WAAPI endpoint URL (overrides the config file)
    #[arg(long, env = "AGENTWWISE_URL")]
    pub url: Option<String>,

    /// Default call timeout in milliseconds (overrides the config file)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to a TOML config file
    #[arg(long, env = "AGENTWWISE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter (tracing env-filter syntax, e.g. "debug" or "agentwwise=trace")
    #[arg(long, env = "AGENTWWISE_LOG", default_value = "info")]
    pub log: String,

    /// Print the verb listing and exit without serving
    #[arg(long)]
    pub list_verbs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["agentwwise"]).unwrap();
        assert!(cli.url.is_none());
        assert!(cli.timeout.is_none());
        assert!(cli.config.is_none());
        assert_eq!(cli.log, "info");
        assert!(!cli.list_verbs);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "agentwwise",
            "--url",
            "ws://10.0.0.5:8080/waapi",
            "--timeout",
            "2500",
            "--log",
            "debug",
            "--list-verbs",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("ws://10.0.0.5:8080/waapi"));
        assert_eq!(cli.timeout, Some(2500));
        assert_eq!(cli.log, "debug");
        assert!(cli.list_verbs);
    }
}
