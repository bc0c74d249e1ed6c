//! AppState construction and background-task spawning, extracted from
//! `main.rs` so both the HTTP server and any one-shot CLI command can boot
//! the full runtime.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use sa_domain::config::{Config, ConfigSeverity};
use sa_memory::{MemoryExtractor, MemorySearch, MemoryStorage};
use sa_providers::registry::ProviderRegistry;
use sa_sessions::compaction::Summarizer;
use sa_sessions::{EventLog, SessionCompactor, SessionQueue, SessionStore, StateCache};
use sa_tools::{ProcessManager, ToolPolicy, ToolRegistry};

use crate::connection::ConnectionManager;
use crate::permission::PermissionBridge;
use crate::state::{AppState, MemorySystem};

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`]. Shared boot path for the server and any CLI command that
/// needs the whole runtime rather than just `load_config`.
pub fn build_app_state(config: Config) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let config = Arc::new(config);

    // ── LLM providers ────────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if providers.is_empty() {
        tracing::info!("no LLM providers initialized — configure API keys to enable chat");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    // ── Session management ───────────────────────────────────────────
    let session_store =
        Arc::new(SessionStore::new(&config.data_dir).context("initializing session store")?);
    let state_cache = Arc::new(StateCache::new(config.data_dir.clone()).context("initializing state cache")?);
    let event_log = Arc::new(
        EventLog::new(config.sessions_dir(), config.sessions_archive_dir()).context("initializing event log")?,
    );
    let queue = Arc::new(SessionQueue::new());
    tracing::info!(data_dir = %config.data_dir.display(), "session management ready");

    // ── Long-term memory (optional: needs an embedding-capable provider) ──
    let memory = if config.memory.embeddings.enabled && !providers.is_empty() {
        match build_memory_system(&config, &providers) {
            Ok(m) => {
                tracing::info!("long-term memory ready");
                Some(Arc::new(m))
            }
            Err(e) => {
                tracing::warn!(error = %e, "long-term memory disabled: failed to initialize");
                None
            }
        }
    } else {
        tracing::info!("long-term memory disabled (no embedding provider configured)");
        None
    };

    // ── Compactor ────────────────────────────────────────────────────
    let compactor = Arc::new(build_compactor(&config, &providers, &memory)?);

    // ── Tools ────────────────────────────────────────────────────────
    let processes = Arc::new(ProcessManager::new(config.tools.exec.clone()));
    let policy = Arc::new(ToolPolicy::from_config(&config.policy));
    let workspace_root = config.data_dir.join("workspace");
    std::fs::create_dir_all(&workspace_root).context("creating tool workspace root")?;
    let tools = Arc::new(ToolRegistry::new(processes.clone(), workspace_root));
    tracing::info!("tool registry + policy ready");

    // ── Gateway runtime ──────────────────────────────────────────────
    let connections = Arc::new(ConnectionManager::new());
    let permissions = Arc::new(PermissionBridge::new());

    Ok(AppState {
        config,
        providers,
        memory,
        session_store,
        state_cache,
        event_log,
        compactor,
        queue,
        active_runs: Arc::new(Mutex::new(HashMap::new())),
        pending_runs: Arc::new(Mutex::new(HashMap::new())),
        tools,
        policy,
        processes,
        connections,
        permissions,
    })
}

fn build_memory_system(config: &Config, providers: &Arc<ProviderRegistry>) -> anyhow::Result<MemorySystem> {
    let embedding_spec = config
        .llm
        .embedding_model
        .as_deref()
        .context("memory.embeddings.enabled but llm.embedding_model is unset")?;
    let (embed_provider, embedding_model) =
        providers.resolve(embedding_spec).context("resolving embedding provider")?;

    let storage = Arc::new(
        MemoryStorage::open(config.memory_facts_dir(), config.memory_index_dir()).context("opening memory storage")?,
    );

    let (chat_provider, _) = providers
        .resolve(config.llm.model_name.as_deref().unwrap_or_default())
        .unwrap_or_else(|_| (embed_provider.clone(), embedding_model.clone()));
    let query_transform_model = config.llm.model_name.clone();
    let rerank_model = config.llm.model_name.clone();
    let search = Arc::new(MemorySearch::new(
        storage.clone(),
        chat_provider,
        query_transform_model,
        rerank_model,
        embedding_model,
    ));

    let extraction_spec = config.llm.memory_extraction_model.as_deref().or(config.llm.model_name.as_deref());
    let (extraction_provider, extraction_model) = match extraction_spec {
        Some(spec) => providers.resolve(spec).context("resolving memory-extraction provider")?,
        None => providers.resolve(embedding_spec)?,
    };
    let extractor = Arc::new(MemoryExtractor::new(extraction_provider, extraction_model, config.memory.min_importance));

    Ok(MemorySystem { storage, search, extractor })
}

fn build_compactor(
    config: &Config,
    providers: &Arc<ProviderRegistry>,
    memory: &Option<Arc<MemorySystem>>,
) -> anyhow::Result<SessionCompactor> {
    let summarization_spec = config.llm.summarization_model.as_deref().or(config.llm.model_name.as_deref());
    let (summarizer_provider, summarizer_model) = match summarization_spec {
        Some(spec) => providers.resolve(spec).context("resolving summarization provider")?,
        None => {
            let (_, provider) = providers.iter().next().context(
                "compaction needs at least one LLM provider configured (llm.summarization_model or llm.model_name)",
            )?;
            (provider.clone(), None)
        }
    };
    let summarizer = Summarizer::new(summarizer_provider, summarizer_model);

    let (embed_provider, embedding_model) = match config.llm.embedding_model.as_deref() {
        Some(spec) => {
            let (p, m) = providers.resolve(spec).context("resolving embedding provider for compaction")?;
            (Some(p), m)
        }
        None => (None, None),
    };

    Ok(SessionCompactor::new(
        config.compaction.clone(),
        summarizer,
        memory.as_ref().map(|m| m.extractor.clone()),
        memory.as_ref().map(|m| m.storage.clone()),
        embed_provider,
        embedding_model,
    ))
}

/// Spawn the supervisor's background maintenance tasks. Call after
/// [`build_app_state`], once the state is behind an `Arc`.
pub fn spawn_background_tasks(state: Arc<AppState>) {
    crate::supervisor::spawn(state);
    tracing::info!("background tasks spawned");
}
