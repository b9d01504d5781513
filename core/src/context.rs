use std::sync::Arc;

use crate::config::AppConfig;
use crate::coordinator::ExecutionCoordinator;
use crate::error::RunnerError;
use crate::platform::CapabilityProbe;
use crate::runner::RunnerPlugin;
use crate::sink::ExecutionLogSink;

#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn RunnerPlugin>,
    pub probe: Arc<dyn CapabilityProbe>,
    pub log_sink: Arc<dyn ExecutionLogSink>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, RunnerError>;
}

#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    services_factory: Option<Arc<dyn ServicesFactory>>,
}

impl AppContext {
    pub fn new(cfg: AppConfig, services_factory: Option<Arc<dyn ServicesFactory>>) -> Self {
        Self {
            cfg,
            services_factory,
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn with_config(&self, cfg: AppConfig) -> Self {
        Self {
            cfg,
            services_factory: self.services_factory.clone(),
        }
    }

    pub async fn build_services(&self) -> Result<Services, RunnerError> {
        let Some(factory) = self.services_factory.as_ref() else {
            return Err(RunnerError::Config(
                "services_factory missing (cannot build runner/sinks)".into(),
            ));
        };
        factory.build_services(&self.cfg).await
    }

    /// Validates the configuration, then wires a coordinator from the factory's services.
    pub async fn build_coordinator(&self) -> Result<ExecutionCoordinator, RunnerError> {
        self.cfg.validate()?;
        let services = self.build_services().await?;
        ExecutionCoordinator::new(&self.cfg, services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticProbe;
    use crate::runner::testing::{FakeBehavior, FakeRunner, FakeScript};
    use crate::sink::NullLogSink;

    struct FakeFactory;

    #[async_trait::async_trait]
    impl ServicesFactory for FakeFactory {
        async fn build_services(&self, _cfg: &AppConfig) -> Result<Services, RunnerError> {
            Ok(Services {
                runner: Arc::new(FakeRunner::new(FakeBehavior::ExitOnTerm(0), FakeScript::Idle)),
                probe: Arc::new(StaticProbe::new()),
                log_sink: Arc::new(NullLogSink),
            })
        }
    }

    #[tokio::test]
    async fn missing_factory_is_a_config_error() {
        let ctx = AppContext::new(AppConfig::default(), None);
        assert!(matches!(
            ctx.build_coordinator().await,
            Err(RunnerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn builds_coordinator_from_factory() {
        let ctx = AppContext::new(AppConfig::default(), Some(Arc::new(FakeFactory)));
        let coordinator = ctx.build_coordinator().await.unwrap();
        assert!(coordinator.list().is_empty());
    }
}
