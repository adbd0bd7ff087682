//! Startup wiring.
//!
//! [`App::run`] brings the runtime up in a fixed order:
//! 1. logging from the loaded settings
//! 2. orchestrator client
//! 3. front door listener (fixed port, or a random free one in the range)
//! 4. dispatcher and axum server
//! 5. registration with the orchestrator, retried until accepted
//! 6. serve until shutdown

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, warn};

use replay_client::{ClientConfig, ClientError, HttpOrchestratorClient};
use replay_core::OrchestratorClient;
use replay_core::logging::init_subscriber;
use replay_core::protocol::StartAppRequest;
use replay_runtime::{Dispatcher, NoopValidator, TaskRegistry, Validator};
use replay_server::{AppState, PortPolicy, ServerError, bind_listener, build_router, serve};
use replay_settings::{AppSettings, RuntimeSettings, SettingsError, load_settings};

/// Startup failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be loaded.
    #[error("settings: {0}")]
    Settings(#[from] SettingsError),
    /// The orchestrator client could not be built.
    #[error("orchestrator client: {0}")]
    Client(#[from] ClientError),
    /// The front door failed to bind or serve.
    #[error("server: {0}")]
    Server(#[from] ServerError),
    /// Reading the bound address failed.
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    /// The server task panicked or was cancelled.
    #[error("server task: {0}")]
    Join(#[from] JoinError),
}

/// Configures an [`App`].
#[derive(Default)]
pub struct AppBuilder {
    registry: Option<TaskRegistry>,
    api: Option<Router>,
    validator: Option<Arc<dyn Validator>>,
    settings: Option<RuntimeSettings>,
    client: Option<Arc<dyn OrchestratorClient>>,
}

impl AppBuilder {
    /// Tasks served by the app.
    #[must_use]
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Router for request/response-style attempts.
    #[must_use]
    pub fn api(mut self, router: Router) -> Self {
        self.api = Some(router);
        self
    }

    /// Input validator; defaults to accepting everything.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Settings; defaults to [`load_settings`].
    #[must_use]
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Orchestrator client; defaults to HTTP against `sidecar.base_url`.
    #[must_use]
    pub fn client(mut self, client: Arc<dyn OrchestratorClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Resolve defaults and build the app.
    pub fn build(self) -> Result<App, AppError> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => load_settings()?,
        };
        let client = match self.client {
            Some(client) => client,
            None => Arc::new(HttpOrchestratorClient::new(&ClientConfig::from(&settings.sidecar))?),
        };
        Ok(App {
            settings,
            registry: Arc::new(self.registry.unwrap_or_else(|| TaskRegistry::builder().build())),
            api: self.api,
            validator: self.validator.unwrap_or_else(|| Arc::new(NoopValidator)),
            client,
        })
    }
}

/// A configured runtime, ready to serve.
pub struct App {
    settings: RuntimeSettings,
    registry: Arc<TaskRegistry>,
    api: Option<Router>,
    validator: Arc<dyn Validator>,
    client: Arc<dyn OrchestratorClient>,
}

impl App {
    /// Start a builder.
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    /// Effective settings.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Initialise logging and serve until Ctrl-C.
    pub async fn run(self) -> Result<(), AppError> {
        init_subscriber(&self.settings.logging.level, self.settings.logging.json);
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<S>(self, shutdown: S) -> Result<(), AppError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = bind_listener(&port_policy(&self.settings.app))?;
        let port = listener.local_addr()?.port();

        let mut dispatcher = Dispatcher::new(self.client.clone(), self.registry.clone())
            .with_validator(self.validator);
        if let Some(api) = self.api {
            dispatcher = dispatcher.with_api(api);
        }
        let router = build_router(AppState {
            dispatcher: Arc::new(dispatcher),
        });
        let mut server = tokio::spawn(serve(listener, router, shutdown));

        let registration = StartAppRequest {
            app_name: self.settings.app.name.clone(),
            app_port: port,
            services: self.registry.descriptions(),
        };
        let delay = self.settings.sidecar.register_retry_delay();

        tokio::select! {
            attempts = register_until_accepted(self.client.as_ref(), &registration, delay) => {
                info!(app = %registration.app_name, port, attempts, tasks = self.registry.len(), "registered with orchestrator");
            }
            joined = &mut server => return Ok(joined??),
        }
        Ok(server.await??)
    }
}

/// Send the catalogue until the orchestrator accepts it. Returns the number
/// of attempts made.
pub async fn register_until_accepted(
    client: &dyn OrchestratorClient,
    registration: &StartAppRequest,
    delay: Duration,
) -> u32 {
    let mut attempt = 1;
    loop {
        match client.start_app(registration.clone()).await {
            Ok(()) => return attempt,
            Err(e) => {
                warn!(attempt, error = %e, "registration failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn port_policy(app: &AppSettings) -> PortPolicy {
    PortPolicy {
        host: app.host.clone(),
        fixed: app.port,
        range_start: app.port_range_start,
        range_end: app.port_range_end,
        attempts: app.port_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_client::{MockOrchestrator, MockReply};
    use replay_core::errors::TaskError;
    use replay_core::protocol::endpoints;
    use replay_runtime::{TaskContext, TaskDef};
    use serde_json::Value;
    use tokio::sync::oneshot;

    async fn noop(_ctx: TaskContext, input: Value) -> Result<Value, TaskError> {
        Ok(input)
    }

    fn local_settings() -> RuntimeSettings {
        let mut settings = RuntimeSettings::default();
        settings.app.name = "billing-app".into();
        settings.app.host = "127.0.0.1".into();
        settings.app.port = Some(0);
        settings.sidecar.register_retry_delay_ms = 1;
        settings
    }

    #[tokio::test]
    async fn registration_retries_until_accepted() {
        let mock = MockOrchestrator::new()
            .reply(endpoints::APP_START, MockReply::Transport("refused".into()))
            .reply(endpoints::APP_START, MockReply::Suspend);
        let attempts = register_until_accepted(&mock, &StartAppRequest::default(), Duration::from_millis(1)).await;
        assert_eq!(attempts, 3);
        assert_eq!(mock.calls_to(endpoints::APP_START).len(), 3);
    }

    #[tokio::test]
    async fn run_registers_catalogue_then_stops() {
        let mock = Arc::new(MockOrchestrator::new().reply(endpoints::APP_START, MockReply::Transport("not yet".into())));
        let mut builder = TaskRegistry::builder();
        let _ = builder.register("billing", "charge", TaskDef::handler(noop)).unwrap();
        let app = App::builder()
            .registry(builder.build())
            .settings(local_settings())
            .client(mock.clone())
            .build()
            .unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(app.run_until(async {
            let _ = stop_rx.await;
        }));

        while mock.calls_to(endpoints::APP_START).len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = stop_tx.send(());
        running.await.unwrap().unwrap();

        let calls = mock.calls_to(endpoints::APP_START);
        let payload = &calls[1].payload;
        assert_eq!(payload["appName"], "billing-app");
        assert_ne!(payload["appPort"], 0);
        assert_eq!(payload["services"][0]["name"], "billing");
        assert_eq!(payload["services"][0]["methods"][0]["name"], "charge");
        assert!(calls[1].session_id.is_none());
    }

    #[test]
    fn policy_follows_settings() {
        let policy = port_policy(&local_settings().app);
        assert_eq!(policy.host, "127.0.0.1");
        assert_eq!(policy.fixed, Some(0));
        assert_eq!((policy.range_start, policy.range_end, policy.attempts), (7001, 7999, 300));
    }
}
