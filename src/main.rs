//! Taskmate relationship worker
//!
//! Consumes answered friend and team invitations from RabbitMQ and applies
//! them to the relationship store.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use taskmate_broker::{ConsumerSupervisor, Producer};
use taskmate_proto::{Action, Envelope};
use taskmate_relations::{
    friend_consumer, team_consumer, FriendService, InviteCodeGenerator, TeamService,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;

/// Taskmate relationship worker
#[derive(Parser, Debug)]
#[command(name = "taskmate")]
#[command(about = "Applies friend and team invitation answers from RabbitMQ")]
#[command(version)]
#[command(long_about = r#"
Taskmate consumes relationship envelopes from RabbitMQ and turns them into
friendship and team membership edges.

EXAMPLES:
  # Run the consumers
  taskmate --config config.yaml serve

  # Create or upgrade the database schema
  taskmate migrate

  # Publish a single envelope (accept friend request 7 from user 1 to user 2)
  taskmate publish --kind friend --action accept --relation-id 7 \
    --requester-id 1 --receiver-id 2

ENVIRONMENT VARIABLES:
  TASKMATE_CONFIG        Configuration file path
  TASKMATE_DATABASE_URL  Database URL
  TASKMATE_RABBITMQ_DSN  RabbitMQ URI
  TASKMATE_LOG_LEVEL     Log level (trace, debug, info, warn, error)
"#)]
struct Cli {
    /// Configuration file (YAML); `<name>.local.yaml` next to it overrides it
    #[arg(long, short = 'c', env = "TASKMATE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Database URL (overrides database.url)
    #[arg(long, env = "TASKMATE_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// RabbitMQ URI (overrides rabbitmq.dsn)
    #[arg(long, env = "TASKMATE_RABBITMQ_DSN", global = true)]
    rabbitmq_dsn: Option<String>,

    /// Log level (overrides log.level)
    #[arg(long, env = "TASKMATE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the friend and team consumers until SIGINT/SIGTERM
    Serve,

    /// Run database migrations and exit
    Migrate,

    /// Publish one relationship envelope
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
struct PublishArgs {
    #[arg(long, value_enum)]
    kind: KindArg,

    #[arg(long, value_enum)]
    action: ActionArg,

    /// Friend request edge id, or team task id
    #[arg(long)]
    relation_id: i32,

    #[arg(long)]
    requester_id: i32,

    #[arg(long)]
    receiver_id: i32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Friend,
    Team,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    Accept,
    Reject,
}

impl PublishArgs {
    fn envelope(&self) -> Envelope {
        let action = match self.action {
            ActionArg::Accept => Action::Accept,
            ActionArg::Reject => Action::Reject,
        };

        match self.kind {
            KindArg::Friend => Envelope::friend(
                action,
                self.relation_id,
                self.requester_id,
                self.receiver_id,
            ),
            KindArg::Team => Envelope::team(
                action,
                self.relation_id,
                self.requester_id,
                self.receiver_id,
            ),
        }
    }
}

/// Setup logging; RUST_LOG wins over the configured level
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("Invalid log level: {}", log_level))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Load the config file and apply CLI/environment overrides
fn build_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = config::load(&cli.config)?;

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(dsn) = &cli.rabbitmq_dsn {
        config.rabbitmq.dsn = dsn.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM (pkill/systemd)
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C)"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let db = taskmate_db::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    taskmate_db::migrate(&db)
        .await
        .context("Failed to run database migrations")?;

    let broker = taskmate_broker::connect(&config.rabbitmq.dsn);

    let friends = FriendService::new(db.clone());
    let teams = TeamService::new(
        db.clone(),
        InviteCodeGenerator::new(db.clone(), config.invite_code.retry_interval()),
    );

    let supervisor = ConsumerSupervisor::new();
    supervisor.register(Arc::new(
        friend_consumer(broker.clone(), &config.rabbitmq, friends)
            .context("Failed to build friend consumer")?,
    ));
    supervisor.register(Arc::new(
        team_consumer(broker, &config.rabbitmq, teams).context("Failed to build team consumer")?,
    ));

    let started = supervisor.start_all();
    info!(
        exchange = %config.rabbitmq.exchange,
        "Started {} consumer(s): {}",
        started,
        supervisor.running().join(", ")
    );

    wait_for_shutdown().await?;

    info!("Shutting down consumers...");
    supervisor.stop().await;

    if let Err(e) = db.close().await {
        warn!("Failed to close database connection: {}", e);
    }

    info!("Taskmate stopped");
    Ok(())
}

async fn migrate(config: AppConfig) -> Result<()> {
    let db = taskmate_db::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    taskmate_db::migrate(&db)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

async fn publish(config: AppConfig, args: &PublishArgs) -> Result<()> {
    if config.rabbitmq.dsn.starts_with("memory://") {
        anyhow::bail!("Publishing needs a RabbitMQ DSN, the in-process broker lives only inside `serve`");
    }

    let broker = taskmate_broker::connect(&config.rabbitmq.dsn);
    let producer = Producer::from_config(broker, &config.rabbitmq);

    let envelope = args.envelope();
    producer
        .publish(&envelope)
        .await
        .context("Failed to publish envelope")?;

    info!(
        kind = %envelope.message_kind,
        action = %envelope.action,
        relation_id = envelope.relation_id,
        "Envelope published"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = build_config(&cli).context("Failed to load configuration")?;
    setup_logging(&config.log.level)?;

    info!("Taskmate starting...");

    match &cli.command {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(config).await,
        Command::Publish(args) => publish(config, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmate_proto::MessageKind;

    #[test]
    fn test_parse_publish_command() {
        let cli = Cli::try_parse_from([
            "taskmate",
            "publish",
            "--kind",
            "friend",
            "--action",
            "accept",
            "--relation-id",
            "7",
            "--requester-id",
            "1",
            "--receiver-id",
            "2",
        ])
        .unwrap();

        let Command::Publish(args) = cli.command else {
            panic!("expected publish command");
        };
        let envelope = args.envelope();
        assert_eq!(envelope.message_kind, MessageKind::Friend);
        assert_eq!(envelope.action, Action::Accept);
        assert_eq!(envelope.relation_id, 7);
        assert_eq!(envelope.requester_id, 1);
        assert_eq!(envelope.receiver_id, 2);
    }

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "taskmate",
            "--config",
            "configs/prod.yaml",
            "serve",
            "--rabbitmq-dsn",
            "amqp://rabbit:5672/%2f",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Serve));
        assert_eq!(cli.config, PathBuf::from("configs/prod.yaml"));
        assert_eq!(cli.rabbitmq_dsn.as_deref(), Some("amqp://rabbit:5672/%2f"));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  url: \"sqlite::memory:\"\nrabbitmq:\n  dsn: \"memory://\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "taskmate",
            "--config",
            path.to_str().unwrap(),
            "--log-level",
            "debug",
            "migrate",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.rabbitmq.dsn, "memory://");
    }
}
