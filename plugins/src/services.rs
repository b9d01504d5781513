//! `ServicesFactory` implementation: builds the runner, host probe and log sinks from config.
use async_trait::async_trait;
use binrelay_core::api::{AppConfig, RunnerError, Services, ServicesFactory};

use crate::factory;

#[derive(Debug, Clone, Copy, Default)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, RunnerError> {
        let log_sink = factory::build_log_sink(cfg)
            .await
            .map_err(RunnerError::Plugin)?;
        Ok(Services {
            runner: factory::build_runner(cfg),
            probe: factory::build_probe(cfg),
            log_sink,
        })
    }
}
