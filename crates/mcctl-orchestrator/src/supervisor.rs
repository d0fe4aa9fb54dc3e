//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Supervisor-managed instances driven through the daemon's control API."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcctl_common::supervisor::{
    ErrorBody, ProcessDescription, ProcessState, SignalKind, SignalRequest,
};
use mcctl_common::{LifecycleConfig, SupervisorConfig};
use mcctl_persistence::BackendKind;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::error::ServiceError;
use crate::service::{ServiceManager, StopSignal};
use crate::status::LifecycleStatus;

/// Control operations offered by the supervisor daemon.
#[async_trait]
pub trait SupervisorClient: Send + Sync {
    /// Process table entry, `None` when the daemon does not know the name.
    async fn describe(&self, process: &str) -> Result<Option<ProcessDescription>, ServiceError>;

    /// Start a registered process.
    async fn start(&self, process: &str) -> Result<ProcessDescription, ServiceError>;

    /// Deliver a signal to a registered process.
    async fn signal(
        &self,
        process: &str,
        signal: SignalKind,
    ) -> Result<ProcessDescription, ServiceError>;
}

/// HTTP client for the daemon in `services/supervisor`.
#[derive(Debug, Clone)]
pub struct HttpSupervisorClient {
    client: Client,
    base: String,
    timeout: Duration,
}

impl HttpSupervisorClient {
    /// Client for `config.endpoint` with the configured request timeout.
    pub fn new(config: &SupervisorConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ServiceError::Unreachable(err.to_string()))?;
        Ok(Self {
            client,
            base: config.endpoint.trim_end_matches('/').to_owned(),
            timeout: config.request_timeout,
        })
    }

    fn url(&self, process: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/api/processes/{process}/{action}", self.base),
            None => format!("{}/api/processes/{process}", self.base),
        }
    }

    fn transport(&self, action: &str, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout {
                action: action.to_owned(),
                elapsed: self.timeout,
            }
        } else if err.is_connect() {
            ServiceError::Unreachable(format!("{}: {err}", self.base))
        } else {
            ServiceError::CommandFailed {
                action: action.to_owned(),
                detail: err.to_string(),
            }
        }
    }

    async fn decode(
        &self,
        process: &str,
        response: Response,
    ) -> Result<ProcessDescription, ServiceError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotRegistered(process.to_owned()));
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(ServiceError::Supervisor {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<ProcessDescription>()
            .await
            .map_err(|err| self.transport("decode", err))
    }
}

#[async_trait]
impl SupervisorClient for HttpSupervisorClient {
    async fn describe(&self, process: &str) -> Result<Option<ProcessDescription>, ServiceError> {
        let response = self
            .client
            .get(self.url(process, None))
            .send()
            .await
            .map_err(|err| self.transport("describe", err))?;
        match self.decode(process, response).await {
            Ok(description) => Ok(Some(description)),
            Err(ServiceError::NotRegistered(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn start(&self, process: &str) -> Result<ProcessDescription, ServiceError> {
        let response = self
            .client
            .post(self.url(process, Some("start")))
            .send()
            .await
            .map_err(|err| self.transport("start", err))?;
        self.decode(process, response).await
    }

    async fn signal(
        &self,
        process: &str,
        signal: SignalKind,
    ) -> Result<ProcessDescription, ServiceError> {
        let response = self
            .client
            .post(self.url(process, Some("signal")))
            .json(&SignalRequest { signal })
            .send()
            .await
            .map_err(|err| self.transport("signal", err))?;
        self.decode(process, response).await
    }
}

/// Map a daemon process state to the shared lifecycle vocabulary.
pub fn lifecycle_from_process(state: ProcessState) -> LifecycleStatus {
    match state {
        ProcessState::Running => LifecycleStatus::Running,
        ProcessState::Starting => LifecycleStatus::Starting,
        ProcessState::Stopping => LifecycleStatus::Stopping,
        ProcessState::Stopped => LifecycleStatus::Stopped,
        ProcessState::Errored => LifecycleStatus::Error,
    }
}

/// Drives instances registered with the supervisor as `<process_prefix><instance>`.
pub struct SupervisorServiceManager {
    client: Arc<dyn SupervisorClient>,
    prefix: String,
    timing: LifecycleConfig,
}

impl SupervisorServiceManager {
    /// Manager forwarding to `client`.
    pub fn new(
        client: Arc<dyn SupervisorClient>,
        prefix: impl Into<String>,
        timing: LifecycleConfig,
    ) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            timing,
        }
    }

    /// Process table name backing `instance`.
    pub fn process_name(&self, instance: &str) -> String {
        format!("{}{}", self.prefix, instance)
    }
}

#[async_trait]
impl ServiceManager for SupervisorServiceManager {
    fn kind(&self) -> BackendKind {
        BackendKind::SupervisorManaged
    }

    fn timing(&self) -> LifecycleConfig {
        self.timing
    }

    async fn status(&self, instance: &str) -> Result<LifecycleStatus, ServiceError> {
        let process = self.process_name(instance);
        match self.client.describe(&process).await? {
            Some(description) => Ok(lifecycle_from_process(description.state)),
            None => {
                debug!(%process, "process not registered, treating as stopped");
                Ok(LifecycleStatus::Stopped)
            }
        }
    }

    async fn launch(&self, instance: &str) -> Result<(), ServiceError> {
        let process = self.process_name(instance);
        let description = self.client.start(&process).await?;
        debug!(%process, state = ?description.state, pid = ?description.pid, "start forwarded");
        Ok(())
    }

    async fn signal(&self, instance: &str, signal: StopSignal) -> Result<(), ServiceError> {
        let process = self.process_name(instance);
        let kind = match signal {
            StopSignal::Terminate => SignalKind::Term,
            StopSignal::Kill => SignalKind::Kill,
        };
        match self.client.signal(&process, kind).await {
            Ok(_) => Ok(()),
            // nothing registered means nothing to stop
            Err(ServiceError::NotRegistered(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
