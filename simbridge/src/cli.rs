//! Command-line argument parsing.
//!
//! Usage:
//!   simbridge serve [--host H] [--port P] [--prefix X] [--config F]
//!   simbridge run <script> [--host H] [--port P] [--prefix X] [--quiet] [--config F]

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

use crate::config::{self, Config, ConfigError};

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "simbridge", version, about = "Remote-call scripting bridge for a simulation namespace")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the dispatcher and serve drivers one at a time.
    Serve(Endpoint),
    /// Connect to a dispatcher and run a script.
    Run(RunArgs),
}

/// Connection settings shared by both subcommands.
///
/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Debug, Default, Clone, Args)]
pub struct Endpoint {
    /// Server address.
    #[arg(long)]
    pub host: Option<String>,
    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Namespace prefix marking remote procedure calls, e.g. `FUN.`.
    #[arg(long)]
    pub prefix: Option<String>,
    /// Config file to read instead of the platform default.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script file to execute.
    pub script: PathBuf,
    /// Only log warnings and errors.
    #[arg(long, short)]
    pub quiet: bool,
    #[command(flatten)]
    pub endpoint: Endpoint,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a full argument vector, program name first (exposed for testing).
pub fn parse_argv<I, S>(argv: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(argv)
}

impl Endpoint {
    /// Merge the config file with command-line overrides.
    ///
    /// An explicit `--config` that cannot be read is an error; a missing
    /// default file is not.  Non-fatal config problems are returned alongside.
    pub fn resolve(&self) -> anyhow::Result<(Config, Vec<ConfigError>)> {
        let (mut config, warnings) = match &self.config {
            Some(path) => Config::load_file(path)
                .with_context(|| format!("reading config file {}", path.display()))?,
            None => match config::default_path() {
                Some(path) if path.is_file() => Config::load_file(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?,
                _ => (Config::default(), Vec::new()),
            },
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(prefix) = &self.prefix {
            if let Err(msg) = config::validate_prefix(prefix) {
                bail!(msg);
            }
            config.prefix = prefix.clone();
        }
        Ok((config, warnings))
    }
}

impl Command {
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Command::Serve(endpoint) => endpoint,
            Command::Run(args) => &args.endpoint,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        parse_argv(std::iter::once("simbridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn serve_with_flags() {
        let cli = parse(&["serve", "--host", "0.0.0.0", "--port", "7000"]);
        let Command::Serve(ep) = cli.command else { panic!("expected serve") };
        assert_eq!(ep.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(ep.port, Some(7000));
        assert!(ep.prefix.is_none());
    }

    #[test]
    fn run_takes_script_and_quiet() {
        let cli = parse(&["run", "demo.sim", "--quiet", "--prefix", "sim."]);
        let Command::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.script, PathBuf::from("demo.sim"));
        assert!(args.quiet);
        assert_eq!(args.endpoint.prefix.as_deref(), Some("sim."));
    }

    #[test]
    fn missing_subcommand_or_script_is_an_error() {
        assert!(parse_argv(["simbridge"]).is_err());
        assert!(parse_argv(["simbridge", "run"]).is_err());
        assert!(parse_argv(["simbridge", "serve", "--port", "notaport"]).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = 10.1.1.1\nport = 5000\nprefix = sim.\nbogus = 1").unwrap();
        let ep = Endpoint {
            port: Some(6000),
            config: Some(file.path().to_path_buf()),
            ..Endpoint::default()
        };
        let (config, warnings) = ep.resolve().unwrap();
        assert_eq!(config.host, "10.1.1.1");
        assert_eq!(config.port, 6000);
        assert_eq!(config.prefix, "sim.");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, 4);
    }

    #[test]
    fn explicit_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ep = Endpoint {
            config: Some(dir.path().join("nope.conf")),
            ..Endpoint::default()
        };
        assert!(ep.resolve().is_err());
    }

    #[test]
    fn bad_prefix_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.conf");
        std::fs::write(&path, "").unwrap();
        let ep = Endpoint {
            prefix: Some("FUN".into()),
            config: Some(path),
            ..Endpoint::default()
        };
        assert!(ep.resolve().is_err());
    }
}
