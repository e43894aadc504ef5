use crate::app::render::{
    render_log_info, render_log_list, render_log_view, render_stats, render_summary_report,
};
use crate::app::services::Services;
use crate::auth::Actor;
use crate::cli::commands::{Cli, Commands, ConversationCommands, ConversationTarget, LogCommands};
use crate::config::Config;
use crate::conversation::{ConversationLogger, ConversationStore, Purpose};
use anyhow::{Context, Result, bail};

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            crate::gateway::run_gateway(&host, port, config).await
        }

        Commands::Logs { command } => run_logs(command, &ConversationLogger::new(config.log_dir())),

        Commands::Conversation { command } => run_conversation(command, &config).await,
    }
}

fn run_logs(command: LogCommands, logger: &ConversationLogger) -> Result<()> {
    match command {
        LogCommands::List => {
            println!("{}", render_log_list(&logger.list_logs()?));
        }
        LogCommands::Info(target) => {
            println!("{}", render_log_info(&logger.log_info(&target.purpose, target.song_id)));
        }
        LogCommands::View { target, tail } => {
            let path = logger.log_path(&target.purpose, target.song_id);
            let Some(content) = logger.read_log(&target.purpose, target.song_id)? else {
                bail!("log file does not exist: {}", path.display());
            };
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("{}", render_log_view(&name, &content, tail));
        }
        LogCommands::Cleanup { days } => {
            let removed = logger.cleanup_older_than(days)?;
            for path in &removed {
                println!("  removed {}", path.display());
            }
            println!("✓ Removed {} log files older than {days} days", removed.len());
        }
    }
    Ok(())
}

async fn run_conversation(command: ConversationCommands, config: &Config) -> Result<()> {
    let services = Services::open(config).await?;

    match command {
        ConversationCommands::Stats(target) => {
            let (actor, purpose) = resolve_target(&services, &target)?;
            let stats = services
                .conversations
                .get_stats(target.song, purpose, &actor.id)
                .await;
            println!("{}", render_stats(target.song, purpose.as_str(), &stats));
        }
        ConversationCommands::Cleanup(target) => {
            let (actor, purpose) = resolve_target(&services, &target)?;
            let removed = services
                .conversations
                .cleanup_incomplete(target.song, purpose, &actor.id)
                .await;
            println!(
                "✓ Removed {removed} incomplete messages from song {} / {}",
                target.song,
                purpose.as_str()
            );
        }
        ConversationCommands::Summarize(target) => {
            let (actor, purpose) = resolve_target(&services, &target)?;
            if !Purpose::SUMMARIZABLE.contains(&purpose) {
                bail!("purpose '{}' does not support summarization", purpose.as_str());
            }
            let report = services.summarizer.force(target.song, purpose, &actor).await;
            println!("{}", render_summary_report(&report));
        }
    }
    Ok(())
}

fn resolve_target(services: &Services, target: &ConversationTarget) -> Result<(Actor, Purpose)> {
    let actor = services
        .directory
        .find_by_id(&target.user)
        .with_context(|| format!("unknown user '{}'; add it under [[users]]", target.user))?;
    let purpose = target
        .purpose
        .parse::<Purpose>()
        .map_err(|_| anyhow::anyhow!("unknown conversation purpose '{}'", target.purpose))?;
    Ok((actor, purpose))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::LogTarget;
    use tempfile::TempDir;

    #[test]
    fn log_commands_work_on_an_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let logger = ConversationLogger::new(tmp.path().join("llm"));

        run_logs(LogCommands::List, &logger).unwrap();
        run_logs(LogCommands::Cleanup { days: 30 }, &logger).unwrap();
        let missing = run_logs(
            LogCommands::View {
                target: LogTarget {
                    purpose: "lyrics".into(),
                    song_id: Some(1),
                },
                tail: 1000,
            },
            &logger,
        );
        assert!(missing.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn view_reads_existing_logs() {
        let tmp = TempDir::new().unwrap();
        let logger = ConversationLogger::new(tmp.path());
        logger.log_conversation("names", None, "[USER]\nten names");

        run_logs(
            LogCommands::View {
                target: LogTarget {
                    purpose: "names".into(),
                    song_id: None,
                },
                tail: 10,
            },
            &logger,
        )
        .unwrap();
    }
}
