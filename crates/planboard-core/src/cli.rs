use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::DefaultCommand;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "planboard",
    version,
    about = "Planboard: task board with calendar and report views",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the task grid, optionally filtered.
    List(ListArgs),
    /// Create a task.
    Add(AddArgs),
    /// Change fields of an existing task.
    Modify(ModifyArgs),
    /// Delete a task.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
    /// Show a month calendar with starting and ending tasks.
    Calendar(CalendarArgs),
    /// Show completion statistics.
    Report {
        #[arg(long = "scope")]
        scope: Option<String>,
        /// Month to report on, as YYYY-MM.
        #[arg(long = "month")]
        month: Option<String>,
    },
    /// Show the stats panel, or click a stat card.
    Stats {
        #[arg(long = "card")]
        card: Option<String>,
    },
    Version,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    #[arg(long = "status")]
    pub status: Option<String>,

    #[arg(long = "difficulty")]
    pub difficulty: Option<String>,

    /// all, overdue, upcoming, not-started or YYYY-MM-DD.
    #[arg(long = "date")]
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    pub title: String,

    #[arg(long = "description")]
    pub description: Option<String>,

    #[arg(long = "status")]
    pub status: Option<String>,

    #[arg(long = "start")]
    pub start: Option<String>,

    #[arg(long = "due")]
    pub due: Option<String>,

    #[arg(long = "difficulty")]
    pub difficulty: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ModifyArgs {
    pub id: String,

    #[arg(long = "title")]
    pub title: Option<String>,

    #[arg(long = "description")]
    pub description: Option<String>,

    #[arg(long = "status")]
    pub status: Option<String>,

    #[arg(long = "start", conflicts_with = "clear_start")]
    pub start: Option<String>,

    #[arg(long = "clear-start")]
    pub clear_start: bool,

    #[arg(long = "due", conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long = "clear-due")]
    pub clear_due: bool,

    #[arg(long = "difficulty", conflicts_with = "clear_difficulty")]
    pub difficulty: Option<String>,

    #[arg(long = "clear-difficulty")]
    pub clear_difficulty: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarArgs {
    /// Month to show, as YYYY-MM.
    #[arg(long = "month")]
    pub month: Option<String>,

    #[arg(long = "prev", default_value_t = 0)]
    pub prev: u32,

    #[arg(long = "next", default_value_t = 0)]
    pub next: u32,

    /// Click a day: show the grid filtered to it.
    #[arg(long = "day")]
    pub day: Option<String>,
}

impl Command {
    /// Bare subcommand for the configured `default.command`.
    pub fn from_default(default: DefaultCommand) -> Self {
        match default {
            DefaultCommand::List => Self::List(ListArgs::default()),
            DefaultCommand::Calendar => Self::Calendar(CalendarArgs::default()),
            DefaultCommand::Report => Self::Report {
                scope: None,
                month: None,
            },
            DefaultCommand::Stats => Self::Stats { card: None },
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Global flags whose value is the next argument.
const VALUE_FLAGS: [&str; 3] = ["--rc", "--rc-file", "--data"];

/// Pulls positional `rc.key=value` / `rc.key:value` arguments out before
/// clap sees them. Only arguments ahead of the subcommand are captured, so
/// a task title such as `rc.fix: crash` reaches the subcommand intact.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    let mut in_globals = true;
    let mut flag_value_next = false;
    for arg in iter {
        if !in_globals {
            cleaned.push(arg);
            continue;
        }

        let s = arg.to_string_lossy();
        if flag_value_next {
            flag_value_next = false;
        } else if s == "--" {
            in_globals = false;
        } else if let Some(override_kv) = positional_override(&s) {
            debug!(key = %override_kv.0, value = %override_kv.1, "captured positional rc override");
            overrides.push(override_kv);
            continue;
        } else if VALUE_FLAGS.contains(&s.as_ref()) {
            flag_value_next = true;
        } else if !s.starts_with('-') {
            debug!(subcommand = %s, "stopped rc capture at subcommand");
            in_globals = false;
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

fn positional_override(arg: &str) -> Option<(String, String)> {
    let rest = arg.strip_prefix("rc.")?;
    rest.split_once('=')
        .or_else(|| rest.split_once(':'))
        .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
}
