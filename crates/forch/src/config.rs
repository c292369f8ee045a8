//! CLI configuration: a thin wrapper around `forch_config` that applies
//! `GlobalOpts` overrides and builds a ready engine.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use forch_config::{ConfigError, Settings, load_dps};
use forch_core::{DpsConfig, Orchestrator, OrchestratorConfig, StateEngine};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Settings, runtime config and static Faucet config for one invocation.
#[derive(Debug)]
pub struct Session {
    pub settings: Settings,
    pub config: OrchestratorConfig,
    pub dps: DpsConfig,
}

impl Session {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let mut settings = Settings::load(global.config.as_deref())?;
        if let Some(path) = &global.faucet_config {
            if !path.is_file() {
                return Err(ConfigError::NotFound { path: path.clone() }.into());
            }
            settings.faucet_config.clone_from(path);
        }
        let config = settings.to_orchestrator_config()?;
        let dps = load_dps_or_empty(&settings.faucet_config)?;
        debug!(
            switches = dps.dps.len(),
            faucet_config = %settings.faucet_config.display(),
            "configuration loaded"
        );
        Ok(Self {
            settings,
            config,
            dps,
        })
    }

    /// A fresh engine seeded with the static Faucet config.
    pub fn engine(&self) -> Arc<StateEngine> {
        let engine = StateEngine::new(self.config.engine.clone());
        engine.process_dataplane_config_change(Utc::now(), self.dps.clone());
        Arc::new(engine)
    }

    pub fn orchestrator(&self, engine: Arc<StateEngine>) -> Orchestrator {
        Orchestrator::with_engine(self.config.clone(), engine)
    }

    /// One-shot restore from varz. Returns the engine and event horizon.
    pub async fn restore(&self) -> Result<(Arc<StateEngine>, u64), CliError> {
        let orchestrator = self.orchestrator(self.engine());
        let horizon = orchestrator
            .restore()
            .await
            .map_err(|source| CliError::VarzUnavailable {
                url: self.config.varz_url.to_string(),
                source,
            })?;
        Ok((Arc::clone(orchestrator.engine()), horizon))
    }

    pub async fn restored_engine(&self) -> Result<Arc<StateEngine>, CliError> {
        self.restore().await.map(|(engine, _)| engine)
    }
}

/// A missing default Faucet file is tolerated: paths then fall back to
/// reported state only.
fn load_dps_or_empty(path: &Path) -> Result<DpsConfig, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "Faucet config not found, running without static config");
        return Ok(DpsConfig::default());
    }
    load_dps(path)
}
