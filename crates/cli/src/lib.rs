use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "config/dicomweb-proxy.yaml";

#[derive(Parser, Debug)]
#[command(name = "dicomweb-proxy")]
#[command(about = "DICOMweb study metadata aggregation and bulk data URI rewriting proxy")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the proxy with the given configuration
    Start {
        /// Path to the configuration file
        #[arg(short, long, env = "DICOMWEB_PROXY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the HTTP listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the upstream DICOMweb base URL
        #[arg(short, long)]
        upstream: Option<String>,

        /// Override the log output format
        #[arg(long, value_enum)]
        log_format: Option<LogFormatArg>,
    },

    /// Validate configuration without starting the proxy
    Validate {
        /// Path to the configuration file
        #[arg(short, long, env = "DICOMWEB_PROXY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Write a configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "dicomweb-proxy.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

impl LogFormatArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormatArg::Pretty => "pretty",
            LogFormatArg::Json => "json",
            LogFormatArg::Compact => "compact",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_with_overrides() {
        let cli = Cli::try_parse_from([
            "dicomweb-proxy",
            "start",
            "--config",
            "proxy.yaml",
            "--port",
            "8181",
            "--upstream",
            "http://imaging:8090/dicom-web",
            "--log-format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Start {
                config,
                port,
                upstream,
                log_format,
            } => {
                assert_eq!(config, PathBuf::from("proxy.yaml"));
                assert_eq!(port, Some(8181));
                assert_eq!(upstream.as_deref(), Some("http://imaging:8090/dicom-web"));
                assert_eq!(log_format, Some(LogFormatArg::Json));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_init_defaults() {
        let cli = Cli::try_parse_from(["dicomweb-proxy", "init"]).unwrap();
        match cli.command {
            Commands::Init { output, force } => {
                assert_eq!(output, PathBuf::from("dicomweb-proxy.yaml"));
                assert!(!force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let result = Cli::try_parse_from(["dicomweb-proxy", "start", "--log-format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
