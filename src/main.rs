use clap::{Parser, Subcommand};
use console::style;
use doc_assistant::commands::{chat, ingest, serve};
use doc_assistant::config::{Config, run_interactive_config, show_config};
use doc_assistant::{AssistantError, Result};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "doc-assistant")]
#[command(about = "Ask questions about a PDF: ingest it into a vector index, serve answers, chat")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml; relative paths in the config resolve against it
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Split the document into chunks, embed them and write the vector index
    Ingest {
        /// PDF to ingest instead of the configured document path
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Serve POST /chat over HTTP until interrupted
    Serve {
        /// Address to listen on instead of the configured bind address, e.g. 0.0.0.0:8000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Chat with a running query service from the terminal
    Chat {
        /// Base URL of the query service instead of the configured one
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&cli.base_dir)?;
        } else {
            run_interactive_config(&cli.base_dir)?;
        }
        return Ok(());
    }

    let config =
        Config::load(&cli.base_dir).map_err(|e| AssistantError::Config(format!("{e:#}")))?;

    match cli.command {
        Commands::Ingest { document } => {
            ingest(&config, document).await?;
        }
        Commands::Serve { bind } => {
            serve(&config, bind).await?;
        }
        Commands::Chat { url } => {
            chat(&config, url).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ingest_command_defaults() {
        let cli = Cli::try_parse_from(["doc-assistant", "ingest"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.base_dir, PathBuf::from("."));
            assert!(matches!(parsed.command, Commands::Ingest { document: None }));
        }
    }

    #[test]
    fn ingest_command_with_document() {
        let cli = Cli::try_parse_from(["doc-assistant", "ingest", "--document", "manual.pdf"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { document } = parsed.command {
                assert_eq!(document, Some(PathBuf::from("manual.pdf")));
            }
        }
    }

    #[test]
    fn serve_command_with_bind() {
        let cli = Cli::try_parse_from(["doc-assistant", "serve", "--bind", "0.0.0.0:9000"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Serve { bind } = parsed.command {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
            }
        }
    }

    #[test]
    fn chat_command_with_url() {
        let cli = Cli::try_parse_from(["doc-assistant", "chat", "--url", "http://host:8000"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat { url } = parsed.command {
                assert_eq!(url.as_deref(), Some("http://host:8000"));
            }
        }
    }

    #[test]
    fn base_dir_is_global() {
        let cli = Cli::try_parse_from(["doc-assistant", "serve", "--base-dir", "/srv/assistant"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.base_dir, PathBuf::from("/srv/assistant"));
        }

        let cli = Cli::try_parse_from(["doc-assistant", "--base-dir", "/srv/assistant", "chat"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["doc-assistant", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["doc-assistant", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["doc-assistant", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
