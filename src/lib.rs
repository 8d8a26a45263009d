/*!
 * gpctl - cluster lifecycle control for a distributed database
 *
 * The `gpctl` CLI talks to a hub on the coordinator host, which drives an
 * agent on every cluster host. This crate holds the CLI side:
 *
 * - [`client`]: the authenticated channel to the hub
 * - [`commands`]: one function per subcommand
 * - [`progress`]: terminal rendering of cluster initialization progress
 */

pub mod client;
pub mod commands;
pub mod progress;

pub use commands::ConfigureOptions;
pub use progress::ProgressRenderer;
