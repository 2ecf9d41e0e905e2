//! Command-line flags.
//!
//! Flags are the highest precedence overlay. Single-dash long flags
//! (`-log-level`) are accepted alongside the `--log-level` spelling.

use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::loader::ConfigError;
use crate::config::schema::Config;

#[derive(Debug, Default, Parser)]
#[command(name = "cluster-agent")]
#[command(about = "Runs a cluster agent", long_about = None, version)]
pub struct Flags {
    /// Log level of the agent.
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "")]
    pub log_level: String,

    /// Name of this node. Must be unique in the cluster.
    #[arg(long = "node", value_name = "NAME", default_value = "")]
    pub node: String,

    /// Address to bind server listeners to.
    #[arg(long = "bind", value_name = "ADDR", default_value = "")]
    pub bind: String,

    /// Datacenter of the agent.
    #[arg(long = "dc", value_name = "NAME", default_value = "")]
    pub datacenter: String,

    /// Address of an agent to join at start time. Can be repeated.
    #[arg(long = "join", value_name = "ADDR")]
    pub join: Vec<String>,

    /// Run the agent in server mode.
    #[arg(long = "server")]
    pub server: bool,

    /// Bootstrap a new cluster. Requires server mode.
    #[arg(long = "bootstrap")]
    pub bootstrap: bool,

    /// Path to a TOML config file. Can be repeated.
    #[arg(long = "config-file", value_name = "PATH")]
    pub config_files: Vec<PathBuf>,

    /// Directory of TOML config files read in lexical order. Can be repeated.
    #[arg(long = "config-dir", value_name = "DIR")]
    pub config_dirs: Vec<PathBuf>,
}

impl Flags {
    /// Parse flags from arguments that do not include the program name.
    pub fn parse_args(args: &[String]) -> Result<Self, clap::Error> {
        let normalized = normalize_args(args);
        Flags::try_parse_from(std::iter::once("cluster-agent".to_string()).chain(normalized))
    }

    /// Convert raw process arguments, rejecting any that are not valid UTF-8.
    pub fn collect_args<I>(args: I) -> Result<Vec<String>, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
    {
        args.into_iter()
            .map(|arg| {
                arg.into_string().map_err(|raw| {
                    ConfigError::Flags(format!(
                        "argument is not valid UTF-8: {}",
                        raw.to_string_lossy()
                    ))
                })
            })
            .collect()
    }

    /// The configuration overlay described by these flags.
    pub fn overlay(&self) -> Config {
        Config {
            log_level: self.log_level.clone(),
            node_name: self.node.clone(),
            bind_addr: self.bind.clone(),
            datacenter: self.datacenter.clone(),
            start_join: self.join.clone(),
            server: self.server,
            bootstrap: self.bootstrap,
            ..Default::default()
        }
    }
}

/// Rewrite `-name` / `-name=value` to `--name` for every known long flag.
///
/// The value following a flag that takes one is left alone, as is
/// everything after a `--` terminator.
fn normalize_args(args: &[String]) -> Vec<String> {
    let command = Flags::command();
    let longs: Vec<(&str, bool)> = command
        .get_arguments()
        .filter_map(|arg| Some((arg.get_long()?, arg.get_action().takes_values())))
        .chain([("help", false), ("version", false)])
        .collect();

    let mut normalized = Vec::with_capacity(args.len());
    let mut verbatim = false;
    let mut value_next = false;

    for arg in args {
        if verbatim || value_next {
            value_next = false;
            normalized.push(arg.clone());
            continue;
        }
        if arg == "--" {
            verbatim = true;
            normalized.push(arg.clone());
            continue;
        }

        let Some(rest) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
            normalized.push(arg.clone());
            continue;
        };
        let (name, inline_value) = match rest.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (rest, None),
        };
        match longs.iter().find(|(long, _)| *long == name) {
            Some((_, takes_value)) if name.len() > 1 => {
                value_next = *takes_value && inline_value.is_none();
                normalized.push(format!("--{}", rest));
            }
            _ => normalized.push(arg.clone()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_by_default() {
        let flags = Flags::parse_args(&[]).unwrap();
        assert_eq!(flags.overlay(), Config::default());
    }

    #[test]
    fn test_single_dash_long_flags() {
        let flags = Flags::parse_args(&args(&[
            "-log-level", "debug", "-node=alpha", "-bind", "10.0.0.1",
        ]))
        .unwrap();
        assert_eq!(flags.log_level, "debug");
        assert_eq!(flags.node, "alpha");
        assert_eq!(flags.bind, "10.0.0.1");
    }

    #[test]
    fn test_double_dash_and_repeats() {
        let flags = Flags::parse_args(&args(&[
            "--join", "10.0.0.1", "-join", "10.0.0.2", "--server", "-config-file", "a.toml",
        ]))
        .unwrap();
        let overlay = flags.overlay();
        assert_eq!(overlay.start_join, args(&["10.0.0.1", "10.0.0.2"]));
        assert!(overlay.server);
        assert_eq!(flags.config_files, vec![PathBuf::from("a.toml")]);
    }

    #[test]
    fn test_unknown_flag_fails() {
        let err = Flags::parse_args(&args(&["-nope"])).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_help_is_not_a_parse_failure() {
        let err = Flags::parse_args(&args(&["-help"])).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_flag_like_value_is_kept() {
        assert_eq!(
            normalize_args(&args(&["-node", "-join", "-dc=east"])),
            args(&["--node", "-join", "--dc=east"])
        );
        assert_eq!(
            normalize_args(&args(&["-node=-join", "-server", "-bootstrap"])),
            args(&["--node=-join", "--server", "--bootstrap"])
        );
    }

    #[test]
    fn test_nothing_rewritten_after_terminator() {
        assert_eq!(
            normalize_args(&args(&["-server", "--", "-join", "-node"])),
            args(&["--server", "--", "-join", "-node"])
        );
    }

    #[test]
    fn test_collect_args_accepts_utf8() {
        let raw = vec![OsString::from("-node"), OsString::from("alpha")];
        assert_eq!(Flags::collect_args(raw).unwrap(), args(&["-node", "alpha"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_args_rejects_invalid_utf8() {
        use std::os::unix::ffi::OsStringExt;

        let raw = vec![
            OsString::from("-node"),
            OsString::from_vec(vec![b'a', 0xff, b'b']),
        ];
        match Flags::collect_args(raw) {
            Err(ConfigError::Flags(msg)) => assert!(msg.contains("not valid UTF-8")),
            other => panic!("expected a flags error, got {:?}", other),
        }
    }
}
