use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use echomind_core::security::ApiKey;
use echomind_engine::{
    ChatDeps, ChatOrchestrator, OrchestratorConfig, PromptAssembler, QuotaLedger, RateLimiter,
    SummaryPolicy,
};
use echomind_llm::{HttpClientConfig, HttpGenerationClient, ModelCatalog, SamplingParams};
use echomind_safety::{RuleSpec, SafetyClassifier, SafetyTier};
use echomind_server::{ServerConfig, StaticTokenVerifier};
use echomind_settings::{EchomindSettings, ExtraRuleTier, LoggingSettings};
use echomind_store::{
    ConversationStore, Database, MemoryConversationStore, MemoryQuotaStore, MemoryRateLimitStore,
    QuotaStore, SqliteConversationStore, SqliteQuotaStore,
};
use echomind_telemetry::{init_telemetry, parse_level, LogFormat, TelemetryConfig};

/// EchoMind chat gateway.
#[derive(Debug, Parser)]
#[command(name = "echomind", version)]
struct Cli {
    /// Settings file (default: ~/.echomind/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Keep usage and history in memory even if a database path is configured.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => echomind_settings::load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => echomind_settings::load_settings().context("loading settings")?,
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let telemetry = init_telemetry(&telemetry_config(&settings.logging))
        .context("initialising telemetry")?;
    tracing::info!(filter = telemetry.directives(), "starting echomind gateway");

    if settings.auth.tokens.is_empty() {
        tracing::warn!("no API tokens configured; every authenticated request will be rejected");
    }

    let orchestrator = Arc::new(build_orchestrator(&settings, cli.in_memory)?);
    let verifier = Arc::new(StaticTokenVerifier::new(settings.auth.tokens.clone()));

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        environment: settings.server.environment.clone(),
        max_body_bytes: settings.server.max_body_bytes,
        prune_interval: Duration::from_secs(settings.rate_limit.window_secs),
    };
    let handle = echomind_server::start(config, orchestrator, verifier)
        .await
        .context("starting server")?;
    tracing::info!(port = handle.port(), "echomind gateway ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}

fn telemetry_config(logging: &LoggingSettings) -> TelemetryConfig {
    let defaults = TelemetryConfig::default();
    TelemetryConfig {
        log_level: parse_level(&logging.level).unwrap_or(defaults.log_level),
        module_levels: logging
            .modules
            .iter()
            .filter_map(|(module, level)| parse_level(level).map(|l| (module.clone(), l)))
            .collect(),
        format: if logging.json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
    }
}

fn build_orchestrator(settings: &EchomindSettings, in_memory: bool) -> anyhow::Result<ChatOrchestrator> {
    let (quota, conversations) = build_stores(settings, in_memory)?;

    let extra_rules = settings
        .safety
        .extra_rules
        .iter()
        .map(|rule| {
            let tier = match rule.tier {
                ExtraRuleTier::Caution => SafetyTier::Caution,
                ExtraRuleTier::Crisis => SafetyTier::Crisis,
            };
            RuleSpec::new(&rule.id, tier, &rule.pattern, &rule.reason)
        })
        .collect();
    let classifier = SafetyClassifier::with_extra_rules(extra_rules)
        .context("compiling safety rules")?;
    tracing::info!(rules = classifier.rule_count(), "safety classifier ready");

    let generation = &settings.generation;
    let client = HttpGenerationClient::new(HttpClientConfig {
        base_url: generation.base_url.clone(),
        api_key: generation.api_key.as_deref().map(ApiKey::new),
        default_model: generation.default_model.clone(),
        sampling: SamplingParams {
            temperature: generation.temperature,
            top_p: generation.top_p,
            max_tokens: generation.max_tokens,
        },
    })
    .context("building generation client")?;

    let deps = ChatDeps {
        rate_limiter: RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            Duration::from_secs(settings.rate_limit.window_secs),
            settings.rate_limit.capacity,
        ),
        classifier: Arc::new(classifier),
        ledger: QuotaLedger::new(quota, settings.quota.default_limit),
        assembler: PromptAssembler::with_overrides(
            settings.prompt.standard_persona.clone(),
            settings.prompt.caution_persona.clone(),
        ),
        client: Arc::new(client),
        conversations,
        catalog: ModelCatalog::new(generation.allowed_models.clone()),
    };
    let config = OrchestratorConfig {
        max_message_chars: settings.server.max_message_chars,
        history_limit: settings.prompt.history_limit,
        generation_timeout: Duration::from_secs(generation.timeout_secs),
        summary: SummaryPolicy {
            every_turns: settings.prompt.summary_every_turns,
            window: settings.prompt.summary_window,
        },
    };
    Ok(ChatOrchestrator::new(deps, config))
}

type Stores = (Arc<dyn QuotaStore>, Arc<dyn ConversationStore>);

fn build_stores(settings: &EchomindSettings, in_memory: bool) -> anyhow::Result<Stores> {
    match settings.quota.db_path.as_deref() {
        Some(path) if !in_memory => {
            let db = Database::open(Path::new(path))
                .with_context(|| format!("opening database at {path}"))?;
            Ok((
                Arc::new(SqliteQuotaStore::new(db.clone())),
                Arc::new(SqliteConversationStore::new(db)),
            ))
        }
        _ => {
            tracing::info!("using in-memory stores; usage resets on restart");
            Ok((
                Arc::new(MemoryQuotaStore::new()),
                Arc::new(MemoryConversationStore::new()),
            ))
        }
    }
}
