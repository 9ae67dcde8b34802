use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::{TaskColor, TaskType};

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
    name = "tasklane",
    version,
    about = "Tasklane: colour-tagged to-do lists with deadline buckets and reminders"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Change an existing task. Saving re-opens a completed task.
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete a task and its pending reminder.
    Delete { id: String },

    /// Mark a task completed.
    Done { id: String },

    /// Mark a completed task as open again.
    Undone { id: String },

    /// Show one tab: Today, Upcoming, Failed or Completed.
    List { tab: Option<String> },

    /// Show every field of a task.
    Info { id: String },

    /// Deliver reminders whose time has come.
    Remind,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    #[arg(long)]
    pub color: Option<TaskColor>,

    #[arg(long = "type")]
    pub kind: Option<TaskType>,

    /// Deadline, e.g. `tomorrow`, `2024-06-20T09:00`, `+3d`.
    #[arg(long)]
    pub due: Option<String>,

    /// Turn the reminder on at this time, e.g. `8:30am`.
    #[arg(long)]
    pub remind: Option<String>,

    #[arg(long = "no-remind", conflicts_with = "remind")]
    pub no_remind: bool,

    /// Reminder notification body.
    #[arg(long)]
    pub note: Option<String>,
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

/// Pulls bare `rc.key=value` / `rc.key:value` tokens out of the argument
/// list so clap never sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn strips_positional_rc_overrides() {
        let pre = preprocess_args(&args(&[
            "tasklane",
            "rc.notifications=off",
            "list",
            "rc.default.tab:Failed",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["tasklane", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.notifications".to_string(), "off".to_string()),
                ("rc.default.tab".to_string(), "Failed".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_fields() {
        let cli = GlobalCli::parse_from([
            "tasklane", "add", "Pay", "rent", "--color", "red", "--type", "Urgent", "--remind",
            "8:30am",
        ]);
        let Some(Command::Add { title, fields }) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(title, vec!["Pay".to_string(), "rent".to_string()]);
        assert_eq!(fields.color, Some(TaskColor::Red));
        assert_eq!(fields.kind, Some(TaskType::Urgent));
        assert_eq!(fields.remind.as_deref(), Some("8:30am"));
    }

    #[test]
    fn remind_and_no_remind_conflict() {
        let parsed = GlobalCli::try_parse_from([
            "tasklane", "edit", "abcd", "--remind", "9:00", "--no-remind",
        ]);
        assert!(parsed.is_err());
    }
}
