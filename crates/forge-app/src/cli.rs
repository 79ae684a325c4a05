//! CLI argument definitions for the InsightForge application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use forge_core::ForgeConfig;

/// InsightForge - AI business intelligence dashboard over your own data.
#[derive(Parser, Debug)]
#[command(name = "insightforge", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Dashboard server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Data directory for uploads, samples and the vector store database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the dashboard API on localhost (default).
    Serve,
    /// Print the JSON profile and KPI cards of a data file.
    Profile {
        file: PathBuf,
    },
    /// Print the LLM context block built from a file.
    Context {
        file: PathBuf,
        /// Sample rows to include; defaults to analysis.max_context_rows.
        #[arg(long)]
        rows: Option<usize>,
    },
    /// Write the bundled sample datasets as CSV.
    Samples {
        /// Output directory; defaults to <data_dir>/samples.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ask one question about a file. Needs an OpenAI API key.
    Ask {
        file: PathBuf,
        question: String,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > INSIGHTFORGE_CONFIG env var > ~/.insightforge/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(std::env::var("INSIGHTFORGE_CONFIG").ok())
    }

    fn resolve_config_path_with(&self, env_value: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env_value.filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply --port and --data-dir on top of file and env settings.
    pub fn apply_overrides(&self, config: &mut ForgeConfig) {
        if let Some(port) = self.port {
            config.general.port = port;
        }
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".insightforge").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".insightforge").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("insightforge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_command_is_serve() {
        let args = parse(&[]);
        assert_eq!(args.command(), Command::Serve);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["profile", "sales.csv", "--port", "9000", "-l", "debug"]);
        assert_eq!(
            args.command(),
            Command::Profile {
                file: PathBuf::from("sales.csv")
            }
        );
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_ask_and_samples_arguments() {
        let args = parse(&["ask", "data.xlsx", "Which region grew fastest?"]);
        assert_eq!(
            args.command(),
            Command::Ask {
                file: PathBuf::from("data.xlsx"),
                question: "Which region grew fastest?".to_string()
            }
        );

        let args = parse(&["samples", "--out", "/tmp/samples"]);
        assert_eq!(
            args.command(),
            Command::Samples {
                out: Some(PathBuf::from("/tmp/samples"))
            }
        );
    }

    #[test]
    fn test_config_path_priority() {
        let args = parse(&["--config", "/etc/forge.toml"]);
        assert_eq!(
            args.resolve_config_path_with(Some("/env/forge.toml".into())),
            PathBuf::from("/etc/forge.toml")
        );

        let args = parse(&[]);
        assert_eq!(
            args.resolve_config_path_with(Some("/env/forge.toml".into())),
            PathBuf::from("/env/forge.toml")
        );
        assert!(args
            .resolve_config_path_with(None)
            .ends_with("config.toml"));
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = parse(&["--port", "8600", "--data-dir", "/srv/forge"]);
        let mut config = ForgeConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.port, 8600);
        assert_eq!(config.general.data_dir, "/srv/forge");
    }
}
