//! Handle to one named pipeline held by the media daemon.
//!
//! A [`PipelineResource`] is a cache of intent: it remembers the last
//! lifecycle command that succeeded so the orchestrator can sequence
//! further commands, but the daemon remains the source of truth.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::control::ControlClient;
use crate::models::pipeline::{LifecycleState, PipelineGroup};
use crate::Result;

/// Property on inter-pipeline sources selecting the upstream sink.
pub const LISTEN_TO_PROPERTY: &str = "listen-to";

/// Property on file sinks holding the output path.
pub const LOCATION_PROPERTY: &str = "location";

/// Name of the file sink element inside pipeline `pipeline`.
#[must_use]
pub fn file_sink_name(pipeline: &str) -> String {
    format!("filesink_{pipeline}")
}

/// Stateful façade over the control client bound to one pipeline name.
#[derive(Debug)]
pub struct PipelineResource {
    name: String,
    descriptor: String,
    group: PipelineGroup,
    client: ControlClient,
    state: Mutex<LifecycleState>,
}

impl PipelineResource {
    /// Create the pipeline on the daemon and return its handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the create.
    pub async fn create(
        client: ControlClient,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        group: PipelineGroup,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        let descriptor = descriptor.into();
        client.create_pipeline(&name, &descriptor).await?;
        Ok(Arc::new(Self {
            name,
            descriptor,
            group,
            client,
            state: Mutex::new(LifecycleState::Created),
        }))
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor the pipeline was created from.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Owning collection.
    #[must_use]
    pub fn group(&self) -> PipelineGroup {
        self.group
    }

    /// Last lifecycle state acknowledged by the daemon.
    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Play the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn play(&self) -> Result<()> {
        self.client.play(&self.name).await?;
        self.mark(LifecycleState::Playing).await;
        Ok(())
    }

    /// Stop the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn stop(&self) -> Result<()> {
        self.client.stop(&self.name).await?;
        self.mark(LifecycleState::Stopped).await;
        Ok(())
    }

    /// Ask the pipeline to drain and finish pending work.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn send_end_of_stream(&self) -> Result<()> {
        self.client.send_end_of_stream(&self.name).await?;
        self.mark(LifecycleState::EndOfStream).await;
        Ok(())
    }

    /// Delete the pipeline from the daemon.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn delete(&self) -> Result<()> {
        self.client.delete(&self.name).await?;
        self.mark(LifecycleState::Deleted).await;
        Ok(())
    }

    /// Set a property on an element of this pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn set_property(&self, element: &str, property: &str, value: &str) -> Result<()> {
        self.client
            .set_property(&self.name, element, property, value)
            .await
    }

    /// Point this pipeline's file sink at `location`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn set_file_location(&self, location: &Path) -> Result<()> {
        let location = location.to_string_lossy();
        self.set_property(&file_sink_name(&self.name), LOCATION_PROPERTY, &location)
            .await
    }

    /// Switch `source_element` to listen to `upstream` instead.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` on rejection.
    pub async fn rebind(&self, source_element: &str, upstream: &str) -> Result<()> {
        self.set_property(source_element, LISTEN_TO_PROPERTY, upstream)
            .await
    }

    async fn mark(&self, next: LifecycleState) {
        *self.state.lock().await = next;
    }
}
