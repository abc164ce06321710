use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    botline_channels::{ChannelAdapter, MockAdapter},
    botline_config::{ChannelKind, Config, RuntimeKind, validate},
    botline_events::EventBus,
    botline_hub::{AgentRegistry, ChannelHub, Router},
    botline_runtime::{CliRuntime, CommandRunner, ProcessRunner, Runtime},
    botline_sessions::{NativeResumeSession, SessionManager, SessionRuntime, TranscriptSession},
    botline_telegram::TelegramAdapter,
};

#[derive(Parser)]
#[command(name = "botline", about = "Botline — chat-driven execution hub for CLI agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file path (overrides discovery).
    #[arg(long, global = true, env = "BOTLINE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub (default when no subcommand is provided).
    Run,
    /// Validate the configuration and report problems.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => botline_config::load_config(path)?,
        None => botline_config::discover_and_load(),
    };
    Ok(config)
}

/// Build one runtime per configured agent. Session-backed agents each get
/// their own manager, returned so shutdown can close their sessions.
fn build_runtimes(
    config: &Config,
) -> anyhow::Result<(AgentRegistry, Vec<Arc<SessionManager>>)> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let mut registry = AgentRegistry::new(config.default_agent.clone());
    let mut managers = Vec::new();

    for agent in &config.agents {
        let runtime: Arc<dyn Runtime> = match agent.runtime {
            RuntimeKind::Cli => {
                Arc::new(CliRuntime::new(agent.clone(), Arc::clone(&runner)))
            },
            RuntimeKind::SessionNative => {
                let agent_config = agent.clone();
                let factory_runner = Arc::clone(&runner);
                let manager = Arc::new(SessionManager::new(
                    Duration::from_millis(agent.session_timeout_ms),
                    Box::new(move |_channel_id, _chat_id, _agent_name| {
                        Arc::new(NativeResumeSession::new(
                            agent_config.clone(),
                            Arc::clone(&factory_runner),
                        )) as Arc<dyn botline_sessions::AgentSession>
                    }),
                ));
                managers.push(Arc::clone(&manager));
                Arc::new(SessionRuntime::new(agent.clone(), manager))
            },
            RuntimeKind::SessionTranscript => {
                let agent_config = agent.clone();
                let factory_runner = Arc::clone(&runner);
                let manager = Arc::new(SessionManager::new(
                    Duration::from_millis(agent.session_timeout_ms),
                    Box::new(move |channel_id, chat_id, _agent_name| {
                        Arc::new(TranscriptSession::new(
                            channel_id,
                            chat_id,
                            agent_config.clone(),
                            Arc::clone(&factory_runner),
                        )) as Arc<dyn botline_sessions::AgentSession>
                    }),
                ));
                managers.push(Arc::clone(&manager));
                Arc::new(SessionRuntime::new(agent.clone(), manager))
            },
        };
        registry.register(&agent.name, runtime)?;
    }

    Ok((registry, managers))
}

fn build_adapters(config: &Config) -> anyhow::Result<Vec<Arc<dyn ChannelAdapter>>> {
    let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
    for channel in &config.channels {
        match channel.kind {
            ChannelKind::Telegram => {
                let token = channel.token.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("telegram channel '{}' has no token", channel.id)
                })?;
                adapters.push(Arc::new(TelegramAdapter::new(&channel.id, token)?));
            },
            ChannelKind::Mock => {
                adapters.push(Arc::new(MockAdapter::new(&channel.id)));
            },
        }
    }
    Ok(adapters)
}

async fn run(config: Config) -> anyhow::Result<()> {
    validate(&config)?;

    let (registry, managers) = build_runtimes(&config)?;
    let channel_defaults: HashMap<String, String> = config
        .channels
        .iter()
        .filter_map(|c| c.default_agent.clone().map(|agent| (c.id.clone(), agent)))
        .collect();
    let router = Router::new(Arc::new(registry), channel_defaults);
    let adapters = build_adapters(&config)?;

    let hub = ChannelHub::new(
        adapters,
        router,
        EventBus::new(),
        config.ledger,
        config.throttle,
    )?;
    hub.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    hub.stop().await;
    for manager in managers {
        manager.close_all().await;
    }
    Ok(())
}

fn doctor(config: &Config) -> anyhow::Result<()> {
    let problems = validate::collect_problems(config);
    if problems.is_empty() {
        println!("Configuration OK.");
        println!(
            "  agents: {}, channels: {}",
            config.agents.len(),
            config.channels.len()
        );
        return Ok(());
    }
    for problem in &problems {
        println!("problem: {problem}");
    }
    anyhow::bail!("{} configuration problem(s) found", problems.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "botline starting");

    let config = load(&cli)?;
    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Doctor) => doctor(&config),
    }
}
