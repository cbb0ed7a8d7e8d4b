//! Canary state prober and waits

use async_trait::async_trait;
use nimbus_core::waiter::{Probe, StatusProber, WaitError, WaitSpec};

use super::{Canary, CanaryState, SyntheticsApi};
use crate::config::WaitSettings;

/// Reads the state of one canary
///
/// A missing canary is reported absent. A canary in `ERROR` fails the wait
/// with the state reason the service gave.
pub struct CanaryProber<'a> {
    api: &'a dyn SyntheticsApi,
    name: &'a str,
}

impl<'a> CanaryProber<'a> {
    pub fn new(api: &'a dyn SyntheticsApi, name: &'a str) -> Self {
        Self { api, name }
    }
}

#[async_trait]
impl StatusProber for CanaryProber<'_> {
    type Status = CanaryState;
    type Snapshot = Canary;

    async fn probe(&self) -> Result<Probe<Self::Snapshot, Self::Status>, WaitError> {
        let canary = match self.api.get_canary(self.name).await {
            Ok(canary) => canary,
            Err(e) if e.is_not_found() => return Ok(Probe::Absent),
            Err(e) => return Err(e.into()),
        };
        if canary.state == CanaryState::Error {
            return Err(WaitError::embedded_failure(
                &canary.state,
                canary.state_reason.as_deref(),
            ));
        }
        Ok(Probe::observed(canary.state.clone(), canary))
    }
}

pub fn ready_spec() -> WaitSpec<CanaryState> {
    use CanaryState::*;
    WaitSpec::until([Ready]).pending([Creating, Updating])
}

/// `READY` is pending as well: a freshly started canary may still report it
pub fn running_spec() -> WaitSpec<CanaryState> {
    use CanaryState::*;
    WaitSpec::until([Running]).pending([Starting, Updating, Ready])
}

pub fn stopped_spec() -> WaitSpec<CanaryState> {
    use CanaryState::*;
    WaitSpec::until([Stopped]).pending([Stopping, Updating, Running, Ready, Starting])
}

pub fn deleted_spec() -> WaitSpec<CanaryState> {
    WaitSpec::until_gone().pending([CanaryState::Deleting])
}

async fn wait(
    api: &dyn SyntheticsApi,
    name: &str,
    spec: WaitSpec<CanaryState>,
    waits: &WaitSettings,
) -> Result<Option<Canary>, WaitError> {
    waits
        .waiter(name, spec)
        .wait(&CanaryProber::new(api, name))
        .await
}

pub async fn wait_ready(
    api: &dyn SyntheticsApi,
    name: &str,
    waits: &WaitSettings,
) -> Result<Option<Canary>, WaitError> {
    wait(api, name, ready_spec(), waits).await
}

pub async fn wait_running(
    api: &dyn SyntheticsApi,
    name: &str,
    waits: &WaitSettings,
) -> Result<Option<Canary>, WaitError> {
    wait(api, name, running_spec(), waits).await
}

pub async fn wait_stopped(
    api: &dyn SyntheticsApi,
    name: &str,
    waits: &WaitSettings,
) -> Result<Option<Canary>, WaitError> {
    wait(api, name, stopped_spec(), waits).await
}

pub async fn wait_deleted(
    api: &dyn SyntheticsApi,
    name: &str,
    waits: &WaitSettings,
) -> Result<(), WaitError> {
    wait(api, name, deleted_spec(), waits).await.map(|_| ())
}
