//! Boot sequencing: config, then DB, then encryption, then the long-lived
//! subsystems, then the remote agent itself.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::budget::BudgetTracker;
use crate::chain::ChainTracker;
use crate::concurrency::ConcurrencyTracker;
use crate::config::{AppConfig, ConfigStore, ConfigStoreError};
use crate::database::{self, DbError, DbPool};
use crate::error::ConfigError;
use crate::event_bus::{EventBus, TokioBroadcastBus};
use crate::gateway::GatewayState;
use crate::health::{EscalationCallback, HealthChecker};
use crate::llm::audit::AuditLog;
use crate::llm::{Proxy, Router};
use crate::maintenance::Maintenance;
use crate::recovery::{Recovery, RecoveryConfig};
use crate::security::RootKey;
use crate::supervisor::{Supervisor, SupervisorConfig, SshAuth, SshConfig};
use crate::vram::{OllamaPsSource, VramTracker};

/// `KERNEL_ROOT_KEY` per the existing `KERNEL_*` override convention,
/// read from the environment.
const ROOT_KEY_ENV: &str = "KERNEL_ROOT_KEY";

/// Secret keys the Config Store's encrypted `secrets` table is expected
/// to hold, keyed off `AgentConfig::ssh_auth_method`.
const SECRET_SSH_PASSWORD: &str = "ssh_password";
const SECRET_SSH_KEY_PASSPHRASE: &str = "ssh_key_passphrase";

const GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Store(#[from] ConfigStoreError),
    #[error(transparent)]
    Supervisor(#[from] crate::error::SupervisorError),
    #[error("unknown ssh_auth_method `{0}`, expected \"password\" or \"key\"")]
    BadAuthMethod(String),
    #[error("failed to open audit log: {0}")]
    AuditLog(#[from] std::io::Error),
}

/// Everything that outlives boot: the gateway state handed to axum, plus
/// the long-lived task handles a graceful shutdown would join on.
pub struct KernelHandle {
    pub gateway_state: GatewayState,
    pub health_checker: Arc<HealthChecker>,
    pub maintenance: Arc<Maintenance>,
    pub vram: Arc<VramTracker>,
    pub chains: Arc<ChainTracker>,
    bootstrap_script_path: PathBuf,
    backup_dir: String,
    max_backup_mb: u64,
}

fn resolve_db_path(data_dir: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        data_dir.join(p)
    }
}

fn ssh_config_from(agent: &crate::config::schema::AgentConfig, store: &ConfigStore) -> Result<SshConfig, BootError> {
    let auth = match agent.ssh_auth_method.as_str() {
        "password" => SshAuth::Password {
            password: store.get_secret(SECRET_SSH_PASSWORD)?,
        },
        "key" => SshAuth::PrivateKey {
            key_path: PathBuf::from(&agent.ssh_key_path),
            passphrase: store.get_secret(SECRET_SSH_KEY_PASSPHRASE).ok(),
        },
        other => return Err(BootError::BadAuthMethod(other.to_string())),
    };
    Ok(SshConfig {
        host: agent.ssh_host.clone(),
        port: agent.ssh_port,
        username: agent.ssh_username.clone(),
        auth,
        local_port: agent.ssh_local_port,
    })
}

/// Step 1: load DB config, open the pool, migrate, open the encryptor.
/// Steps 3 (wire all subsystems) + the supervisor/proxy half of step 2
/// (setup mode still needs a Config Store to mutate). Step 4-6 (pre-boot
/// sanity, deploy+launch, grace, health checker) are deferred to
/// [`birth`] — invoked here immediately if setup was already completed
/// by a prior run, or later once the setup flag flips and the deferred
/// birth callback fires.
pub async fn boot(config: AppConfig, data_dir: &Path) -> Result<KernelHandle, BootError> {
    let root_key_b64 = env::var(ROOT_KEY_ENV).map_err(|_| ConfigError::BadRootKey("KERNEL_ROOT_KEY not set".to_string()))?;
    let root_key = RootKey::from_base64(&root_key_b64).map_err(|e| ConfigError::BadRootKey(e.to_string()))?;

    let db_path = resolve_db_path(data_dir, &config.database.path);
    let pool: DbPool = database::init(&db_path).map_err(|e| ConfigError::DbUnreachable(e.to_string()))?;

    let store = Arc::new(ConfigStore::new(pool.clone(), root_key));

    let ssh_config = ssh_config_from(&config.agent, &store)?;
    let connect_timeout = Duration::from_secs(config.ssh.connect_timeout_secs);
    let supervisor_config = SupervisorConfig {
        code_dir: config.agent.code_dir.clone(),
        kernel_url: config.agent.kernel_url.clone(),
        brain_path: config.agent.brain_path.clone(),
        seed_port: config.agent.seed_port,
        app_port: config.agent.app_port,
        agent_base_url: config.agent.agent_base_url.clone(),
        command_timeout: Duration::from_secs(config.ssh.command_timeout_secs),
        grace_period: GRACE_PERIOD,
    };
    let supervisor = Arc::new(Supervisor::new(ssh_config, connect_timeout, supervisor_config));

    let http_client = reqwest::Client::new();

    let concurrency = Arc::new(ConcurrencyTracker::new());
    let chains = Arc::new(ChainTracker::new());
    chains.spawn_sweeper();

    let local_provider = store.list_providers().ok().and_then(|providers| {
        providers.into_iter().find(|p| p.total_vram_bytes.is_some() && p.is_enabled())
    });
    let vram = match &local_provider {
        Some(p) => Arc::new(VramTracker::enabled(p.total_vram_bytes.expect("checked above"))),
        None => Arc::new(VramTracker::disabled()),
    };
    if let Some(p) = &local_provider {
        if let Some(base_url) = &p.base_url {
            let source = Arc::new(OllamaPsSource::new(http_client.clone(), base_url.clone()));
            vram.spawn_poller(source);
        }
    }

    let budget = Arc::new(BudgetTracker::new(pool.clone()));
    let router = Arc::new(Router::new(store.clone(), concurrency.clone(), vram.clone(), budget.clone()));

    let audit_log_path = data_dir.join("audit.jsonl");
    let audit = Arc::new(AuditLog::open(audit_log_path)?);

    let proxy = Arc::new(Proxy::new(
        store.clone(),
        router,
        budget,
        concurrency,
        vram.clone(),
        chains.clone(),
        audit,
        http_client.clone(),
    ));

    let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());

    let bootstrap_script_path = PathBuf::from(&config.agent.bootstrap_script_path);

    let recovery = Arc::new(Recovery::new(
        supervisor.clone(),
        pool.clone(),
        RecoveryConfig {
            bootstrap_script_path: bootstrap_script_path.clone(),
            backup_dir: config.agent.backup_dir.clone(),
            backup_max_mb: config.agent.max_backup_mb,
        },
    ));
    let on_failure: EscalationCallback = {
        let recovery = recovery.clone();
        Arc::new(move |fail_count: u32| {
            let recovery = recovery.clone();
            tokio::spawn(async move {
                recovery.handle_failure(fail_count).await;
            });
        })
    };

    let health_url = format!("{}/health", config.agent.agent_base_url);
    let health_checker = Arc::new(HealthChecker::new(
        health_url,
        Duration::from_secs(config.health.interval_secs),
        Duration::from_secs(config.health.probe_timeout_secs),
        pool.clone(),
        supervisor.clone(),
        on_failure,
    ));

    let maintenance = Arc::new(Maintenance::new(supervisor.clone(), pool.clone()));

    let gateway_state = GatewayState {
        proxy,
        supervisor,
        config: store.clone(),
        bus,
        pool,
        bootstrap_script_path: bootstrap_script_path.clone(),
        http_client,
    };

    let handle = KernelHandle {
        gateway_state,
        health_checker,
        maintenance,
        vram,
        chains,
        bootstrap_script_path,
        backup_dir: config.agent.backup_dir.clone(),
        max_backup_mb: config.agent.max_backup_mb,
    };

    if store.is_setup_complete()? {
        birth(&handle, &store).await?;
    } else {
        tracing::info!("setup not complete, entering setup mode — operational endpoints will 403 until flipped");
    }

    Ok(handle)
}

/// Steps 4-6: the one-shot subsystem birth, run either at the end of a
/// normal boot or later, once `setup_complete` flips from `false` to
/// `true`.
pub async fn birth(handle: &KernelHandle, store: &ConfigStore) -> Result<(), BootError> {
    let snapshot = handle.gateway_state.supervisor.snapshot();

    let shows_previous_life = snapshot.git_exists().await || snapshot.main_py_exists().await;
    let cycle_counter_present = snapshot.galla_file_exists().await;

    if shows_previous_life && !cycle_counter_present {
        tracing::warn!("previous agent life looks inconsistent, backing up and wiping");
        let backup = snapshot.backup_brain(handle.max_backup_mb, &handle.backup_dir).await;
        if let Err(e) = backup {
            tracing::warn!(error = %e, "backup before wipe failed, continuing with wipe");
        }
        if let Err(e) = snapshot.wipe_brain().await {
            tracing::error!(error = %e, "wipe_brain failed during pre-boot sanity check");
        }
        tracing::info!("rebirth event: inconsistent previous life wiped before deploy");
    } else {
        // Narrow stop: only the supervised process, leaving any
        // self-built apps the agent launched running.
        if let Err(e) = handle.gateway_state.supervisor.stop_seed().await {
            tracing::warn!(error = %e, "narrow stop_seed failed, continuing with deploy");
        }
    }

    if let Err(e) = snapshot.init().await {
        tracing::warn!(error = %e, "snapshot init failed, continuing with deploy");
    }

    let genesis = store.get_genesis()?;
    handle
        .gateway_state
        .supervisor
        .start_seed(&handle.bootstrap_script_path, &genesis.system_prompt)
        .await?;

    tokio::time::sleep(GRACE_PERIOD).await;

    handle.health_checker.clone().spawn();
    handle.maintenance.clone().spawn();

    Ok(())
}
