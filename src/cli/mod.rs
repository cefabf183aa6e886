use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_duration;
use crate::routing::Route;

#[derive(Debug, Parser)]
#[clap(name = "dag-dashboard", about = "Terminal dashboard for a DAG scheduler")]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) command: Command,

    /// YAML config file. Defaults apply when omitted.
    #[clap(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Scheduler base URL, overriding the config file.
    #[clap(long, global = true, env = "DAG_DASHBOARD_URL")]
    pub(crate) base_url: Option<String>,

    /// Poll interval for the list page, e.g. `5s`.
    #[clap(long, global = true, value_parser = parse_duration)]
    pub(crate) interval: Option<Duration>,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Command {
    /// Open a page. `/home` keeps refreshing until interrupted.
    Open {
        #[clap(default_value = "/home")]
        route: Route,
    },

    /// Flip the enabled state of a job.
    Toggle { name: String },
}
