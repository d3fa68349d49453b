use crate::domain::StyleProfile;
use crate::infra::{ContentError, ContentRepository, Settings};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Serve(ServeOverrides),
    List(ServeOverrides),
}

/// Flag values that win over the config file and the environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServeOverrides {
    pub config_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub content_dir: Option<PathBuf>,
    pub theme: Option<StyleProfile>,
    pub max_sessions: Option<usize>,
}

impl ServeOverrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(bind) = &self.bind {
            settings.bind = bind.clone();
        }
        if let Some(content_dir) = &self.content_dir {
            settings.content_dir = content_dir.clone();
        }
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(max_sessions) = self.max_sessions {
            settings.max_sessions = max_sessions;
        }
    }
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut rest = args.iter().skip(1).peekable();
    let list = match rest.peek().map(|arg| arg.as_str()) {
        Some("serve") => {
            let _ = rest.next();
            false
        }
        Some("list") => {
            let _ = rest.next();
            true
        }
        Some(arg) if !arg.starts_with('-') => {
            return Err(CliParseError::UnknownSubcommand(arg.to_string()));
        }
        _ => false,
    };

    let mut overrides = ServeOverrides::default();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = flag_value(&mut rest, "--config")?;
                overrides.config_path = Some(PathBuf::from(value));
            }
            "--content-dir" | "-d" => {
                let value = flag_value(&mut rest, "--content-dir")?;
                overrides.content_dir = Some(PathBuf::from(value));
            }
            "--bind" | "-b" if !list => {
                let value = flag_value(&mut rest, "--bind")?;
                overrides.bind = Some(value.to_string());
            }
            "--theme" if !list => {
                let value = flag_value(&mut rest, "--theme")?;
                overrides.theme = Some(value.parse::<StyleProfile>().map_err(|_| {
                    CliParseError::InvalidFlagValue {
                        flag: "--theme".to_string(),
                        value: value.to_string(),
                    }
                })?);
            }
            "--max-sessions" if !list => {
                let value = flag_value(&mut rest, "--max-sessions")?;
                overrides.max_sessions = Some(parse_usize_flag("--max-sessions", value)?);
            }
            _ if arg.starts_with('-') => {
                return Err(CliParseError::UnknownFlag(arg.to_string()));
            }
            _ => {
                return Err(CliParseError::UnexpectedArgument(arg.to_string()));
            }
        }
    }

    if list {
        Ok(CliInvocation::List(overrides))
    } else {
        Ok(CliInvocation::Serve(overrides))
    }
}

fn flag_value<'a>(
    args: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<&'a str, CliParseError> {
    args.next()
        .map(String::as_str)
        .ok_or_else(|| CliParseError::MissingFlagValue(flag.to_string()))
}

fn parse_usize_flag(flag: &str, value: &str) -> Result<usize, CliParseError> {
    value
        .parse::<usize>()
        .map_err(|_| CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

/// Prints `id<TAB>title`, one document per line, in repository order.
pub fn run_list(repository: &dyn ContentRepository, out: &mut impl Write) -> Result<(), CliRunError> {
    for document in repository.list()? {
        writeln!(out, "{}\t{}", document.id, document.title)?;
    }
    Ok(())
}
