//! Command-Line Interface
//!
//! Flag parsing and name selection. Everything here deals in names; atoms
//! only exist once the display connection resolves them.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Command-line arguments for selcast
#[derive(Parser, Debug)]
#[command(name = "selcast")]
#[command(version, about = "Own and serve X11 selections, or fetch them", long_about = None)]
pub struct Args {
    /// Operate on the CLIPBOARD selection (the default)
    #[arg(short = 'c', long, group = "which")]
    pub clipboard: bool,

    /// Operate on the PRIMARY selection
    #[arg(short = 'p', long, group = "which")]
    pub primary: bool,

    /// Operate on the SECONDARY selection
    #[arg(short = 's', long, group = "which")]
    pub secondary: bool,

    /// Operate on an arbitrary named selection
    #[arg(short = 'x', long, value_name = "NAME", group = "which")]
    pub selection: Option<String>,

    /// Target to request or serve
    #[arg(short = 't', long, value_name = "NAME", default_value = "UTF8_STRING")]
    pub target: String,

    /// Print the captured payload and exit without claiming the selection
    #[arg(short = 'o', long)]
    pub out_only: bool,

    /// Keep serving in the foreground instead of detaching
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// X display to connect to (defaults to $DISPLAY)
    #[arg(long, value_name = "DISPLAY")]
    pub display: Option<String>,

    /// Seconds to wait on an unresponsive peer before giving up (0 = forever)
    #[arg(
        long,
        value_name = "SECS",
        env = "SELCAST_WAIT_TIMEOUT",
        default_value_t = 10
    )]
    pub wait_timeout: u64,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "compact")]
    pub log_format: String,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Name of the selection this run operates on.
    pub fn selection_name(&self) -> &str {
        if let Some(name) = &self.selection {
            name
        } else if self.primary {
            "PRIMARY"
        } else if self.secondary {
            "SECONDARY"
        } else {
            "CLIPBOARD"
        }
    }

    /// Peer deadline derived from `--wait-timeout`; None waits forever.
    pub fn peer_wait(&self) -> Option<Duration> {
        (self.wait_timeout > 0).then(|| Duration::from_secs(self.wait_timeout))
    }
}
