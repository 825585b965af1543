// Library target exists to expose internal modules for integration tests.
// The binary entry point is in main.rs.

mod cli;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod plan;
pub mod queue;
pub mod server;
pub mod session;
pub mod subscriptions;
pub mod verbs;
pub mod waapi;

/// Returns the clap `Command` definition.
///
/// Exposed so integration tests can validate the CLI surface without
/// depending on the binary crate directly.
#[must_use]
pub fn command() -> clap::Command {
    <cli::Cli as clap::CommandFactory>::command()
}
