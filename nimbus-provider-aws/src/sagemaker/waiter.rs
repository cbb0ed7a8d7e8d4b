//! Notebook instance status prober and waits

use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::waiter::{Probe, StatusProber, WaitError, WaitSpec};

use super::{NotebookInstance, NotebookInstanceStatus, SageMakerApi};
use crate::config::WaitSettings;

/// Reads the status of one notebook instance
///
/// A missing instance is reported absent. `Failed` fails the wait with the
/// `FailureReason` the service gave.
pub struct NotebookInstanceProber<'a> {
    api: &'a dyn SageMakerApi,
    name: &'a str,
}

impl<'a> NotebookInstanceProber<'a> {
    pub fn new(api: &'a dyn SageMakerApi, name: &'a str) -> Self {
        Self { api, name }
    }
}

#[async_trait]
impl StatusProber for NotebookInstanceProber<'_> {
    type Status = NotebookInstanceStatus;
    type Snapshot = NotebookInstance;

    async fn probe(&self) -> Result<Probe<Self::Snapshot, Self::Status>, WaitError> {
        let instance = match self.api.describe_notebook_instance(self.name).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(Probe::Absent),
            Err(e) => return Err(e.into()),
        };
        if instance.status == NotebookInstanceStatus::Failed {
            return Err(WaitError::embedded_failure(
                &instance.status,
                instance.failure_reason.as_deref(),
            ));
        }
        Ok(Probe::observed(instance.status.clone(), instance))
    }
}

/// Pause before the first describe after a start or update is accepted,
/// while the instance may still report its previous status
pub const SETTLE_DELAY: Duration = Duration::from_secs(10);

pub fn in_service_spec() -> WaitSpec<NotebookInstanceStatus> {
    WaitSpec::until([NotebookInstanceStatus::InService]).pending([NotebookInstanceStatus::Pending])
}

/// A started instance goes `Pending` and settles in service
pub fn started_spec() -> WaitSpec<NotebookInstanceStatus> {
    in_service_spec().delay(SETTLE_DELAY)
}

pub fn stopped_spec() -> WaitSpec<NotebookInstanceStatus> {
    WaitSpec::until([NotebookInstanceStatus::Stopped]).pending([NotebookInstanceStatus::Stopping])
}

/// An updated instance passes through `Updating` and settles stopped
pub fn updated_spec() -> WaitSpec<NotebookInstanceStatus> {
    WaitSpec::until([NotebookInstanceStatus::Stopped])
        .pending([NotebookInstanceStatus::Updating])
        .delay(SETTLE_DELAY)
}

pub fn deleted_spec() -> WaitSpec<NotebookInstanceStatus> {
    WaitSpec::until_gone().pending([NotebookInstanceStatus::Deleting])
}

pub async fn wait(
    api: &dyn SageMakerApi,
    name: &str,
    spec: WaitSpec<NotebookInstanceStatus>,
    waits: &WaitSettings,
) -> Result<Option<NotebookInstance>, WaitError> {
    waits
        .waiter(name, spec)
        .wait(&NotebookInstanceProber::new(api, name))
        .await
}
