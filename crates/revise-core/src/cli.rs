use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

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
    name = "revise",
    version,
    about = "Revise: dated review items with types, a month calendar and CSV exchange",
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
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "reviserc", global = true)]
    pub reviserc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Defaults to `list` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a review item
    Add(AddArgs),
    /// Change fields of an item
    Edit(EditArgs),
    /// Flip an item between done and pending
    Toggle { id: String },
    /// Delete one or more items
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Skip the confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Table of items matching filter terms such as `type:OKR事项 status:pending`
    List { terms: Vec<String> },
    /// Month grid
    Calendar {
        /// Month as YYYY-MM; the current month when omitted
        month: Option<String>,
        #[arg(long, default_value_t = 0)]
        prev: u32,
        #[arg(long, default_value_t = 0)]
        next: u32,
    },
    /// List or manage task types
    Types {
        #[command(subcommand)]
        action: Option<TypesAction>,
    },
    /// Show or set the colour theme
    Theme { name: Option<String> },
    /// Write all items as CSV
    Export {
        /// Target file, or `-` for stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory for the dated default file name
        #[arg(long, conflicts_with = "output")]
        dir: Option<PathBuf>,
    },
    /// Read items from a CSV file, or `-` for stdin
    Import {
        file: PathBuf,
        /// overwrite or append; asked when omitted
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    pub name: String,
    /// YYYY-MM-DD, today, tomorrow, +3d, -1w ...
    #[arg(short, long)]
    pub date: Option<String>,
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,
    #[arg(short, long)]
    pub priority: Option<String>,
    #[arg(short, long)]
    pub note: Option<String>,
    #[arg(long)]
    pub done: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct EditArgs {
    pub id: String,
    #[arg(short, long)]
    pub date: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,
    #[arg(short, long)]
    pub priority: Option<String>,
    #[arg(short, long)]
    pub note: Option<String>,
    #[arg(long, conflicts_with = "pending")]
    pub done: bool,
    #[arg(long)]
    pub pending: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TypesAction {
    Add { label: String },
    Remove {
        label: String,
        #[arg(short = 'y', long)]
        yes: bool,
    },
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

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
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
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
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

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_removed() {
        let pre = preprocess_args(&args(&["revise", "rc.color=off", "list", "rc.confirm:no"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["revise", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.confirm".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn bare_rc_prefix_is_kept() {
        let pre = preprocess_args(&args(&["revise", "add", "rc.notes"])).expect("preprocess");
        assert_eq!(pre.cleaned_args.len(), 3);
        assert!(pre.rc_overrides.is_empty());
    }

    #[test]
    fn parses_add_with_options() {
        let cli = GlobalCli::try_parse_from([
            "revise", "add", "线性代数", "--date", "+1d", "--type", "OKR事项", "-p", "high", "--done",
        ])
        .expect("parse");
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add, got {:?}", cli.command);
        };
        assert_eq!(add.name, "线性代数");
        assert_eq!(add.date.as_deref(), Some("+1d"));
        assert_eq!(add.task_type.as_deref(), Some("OKR事项"));
        assert!(add.done);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = GlobalCli::try_parse_from(["revise", "list", "type:OKR事项", "-vv", "--rc", "color=off"])
            .expect("parse");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides[0].key, "color");
        assert_eq!(
            cli.command,
            Some(Command::List {
                terms: vec!["type:OKR事项".to_string()]
            })
        );
    }

    #[test]
    fn edit_rejects_done_with_pending() {
        assert!(GlobalCli::try_parse_from(["revise", "edit", "abc", "--done", "--pending"]).is_err());
    }

    #[test]
    fn delete_needs_an_id() {
        assert!(GlobalCli::try_parse_from(["revise", "delete"]).is_err());
        let cli = GlobalCli::try_parse_from(["revise", "delete", "a", "b", "-y"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Delete {
                ids: vec!["a".to_string(), "b".to_string()],
                yes: true
            })
        );
    }

    #[test]
    fn no_command_is_allowed() {
        let cli = GlobalCli::try_parse_from(["revise"]).expect("parse");
        assert!(cli.command.is_none());
    }
}
