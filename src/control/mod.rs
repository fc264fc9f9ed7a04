//! Control channel to the media daemon.
//!
//! The wire transport is provided from outside through the
//! [`ControlChannel`] and [`Connector`] traits: a request/response
//! surface that either accepts a command or reports why it did not.
//! [`ControlClient`] layers the connection retry policy, command
//! logging and error normalization on top. It never retries individual
//! commands; that decision belongs to the caller.

pub mod memory;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Boxed future returned by the control-channel traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Host/port address of the daemon's control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Construct an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle or property operation understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a named pipeline from a descriptor.
    Create,
    /// Set a property on an element inside a pipeline.
    SetProperty,
    /// Transition a pipeline to playing.
    Play,
    /// Transition a pipeline to stopped.
    Stop,
    /// Inject an end-of-stream event.
    EndOfStream,
    /// Destroy a pipeline.
    Delete,
}

impl Operation {
    /// Short operation name used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::SetProperty => "set_property",
            Self::Play => "play",
            Self::Stop => "stop",
            Self::EndOfStream => "eos",
            Self::Delete => "delete",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One command sent over the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Create `name` from `descriptor`.
    Create {
        /// Pipeline name.
        name: String,
        /// Declarative topology string.
        descriptor: String,
    },
    /// Set `property` on `element` inside `pipeline`.
    SetProperty {
        /// Pipeline name.
        pipeline: String,
        /// Element name inside the pipeline.
        element: String,
        /// Property key.
        property: String,
        /// Property value, already rendered as text.
        value: String,
    },
    /// Play `name`.
    Play {
        /// Pipeline name.
        name: String,
    },
    /// Stop `name`.
    Stop {
        /// Pipeline name.
        name: String,
    },
    /// Send end-of-stream to `name`.
    EndOfStream {
        /// Pipeline name.
        name: String,
    },
    /// Delete `name`.
    Delete {
        /// Pipeline name.
        name: String,
    },
}

impl ControlRequest {
    /// Operation this request performs.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Create { .. } => Operation::Create,
            Self::SetProperty { .. } => Operation::SetProperty,
            Self::Play { .. } => Operation::Play,
            Self::Stop { .. } => Operation::Stop,
            Self::EndOfStream { .. } => Operation::EndOfStream,
            Self::Delete { .. } => Operation::Delete,
        }
    }

    /// Pipeline this request targets.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        match self {
            Self::Create { name, .. }
            | Self::Play { name }
            | Self::Stop { name }
            | Self::EndOfStream { name }
            | Self::Delete { name } => name,
            Self::SetProperty { pipeline, .. } => pipeline,
        }
    }
}

/// Request/response surface of a connected daemon.
///
/// Implementations report failure with a human-readable cause; the
/// [`ControlClient`] turns it into [`AppError::DaemonCommand`].
pub trait ControlChannel: Send + Sync {
    /// Execute one request.
    ///
    /// # Errors
    ///
    /// Returns the daemon's (or transport's) failure description.
    fn execute(&self, request: ControlRequest) -> BoxFuture<'_, std::result::Result<(), String>>;
}

/// Opens control channels to a daemon endpoint.
pub trait Connector: Send + Sync {
    /// Attempt a single connection.
    ///
    /// # Errors
    ///
    /// Returns the reason the connection attempt failed.
    fn connect<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, std::result::Result<Arc<dyn ControlChannel>, String>>;
}

/// Connected control-channel client.
///
/// Cheap to clone; all clones share the underlying channel.
#[derive(Clone)]
pub struct ControlClient {
    channel: Arc<dyn ControlChannel>,
    endpoint: Endpoint,
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ControlClient {
    /// Connect to `endpoint`, retrying up to `attempts` times with a fixed
    /// `delay` between attempts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonUnreachable` once every attempt failed.
    pub async fn connect(
        connector: &dyn Connector,
        endpoint: &Endpoint,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match connector.connect(endpoint).await {
                Ok(channel) => {
                    info!(%endpoint, attempt, "connected to daemon control channel");
                    return Ok(Self::from_channel(channel, endpoint.clone()));
                }
                Err(err) => {
                    warn!(%endpoint, attempt, attempts, %err, "control channel connection failed");
                    last_error = err;
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AppError::DaemonUnreachable(format!(
            "could not contact daemon at {endpoint} after {attempts} attempts: {last_error}"
        )))
    }

    /// Wrap an already connected channel.
    #[must_use]
    pub fn from_channel(channel: Arc<dyn ControlChannel>, endpoint: Endpoint) -> Self {
        Self { channel, endpoint }
    }

    /// Create a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the command.
    pub async fn create_pipeline(&self, name: &str, descriptor: &str) -> Result<()> {
        info!(pipeline = name, "creating pipeline");
        debug!(pipeline = name, descriptor, "pipeline descriptor");
        self.send(ControlRequest::Create {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        })
        .await
    }

    /// Set an element property inside a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the command.
    pub async fn set_property(
        &self,
        pipeline: &str,
        element: &str,
        property: &str,
        value: &str,
    ) -> Result<()> {
        info!(pipeline, element, property, value, "setting element property");
        self.send(ControlRequest::SetProperty {
            pipeline: pipeline.to_owned(),
            element: element.to_owned(),
            property: property.to_owned(),
            value: value.to_owned(),
        })
        .await
    }

    /// Play a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the command.
    pub async fn play(&self, name: &str) -> Result<()> {
        info!(pipeline = name, "playing pipeline");
        self.send(ControlRequest::Play {
            name: name.to_owned(),
        })
        .await
    }

    /// Stop a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the command.
    pub async fn stop(&self, name: &str) -> Result<()> {
        info!(pipeline = name, "stopping pipeline");
        self.send(ControlRequest::Stop {
            name: name.to_owned(),
        })
        .await
    }

    /// Send end-of-stream to a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the command.
    pub async fn send_end_of_stream(&self, name: &str) -> Result<()> {
        info!(pipeline = name, "sending end-of-stream");
        self.send(ControlRequest::EndOfStream {
            name: name.to_owned(),
        })
        .await
    }

    /// Delete a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DaemonCommand` if the daemon rejects the command.
    pub async fn delete(&self, name: &str) -> Result<()> {
        info!(pipeline = name, "deleting pipeline");
        self.send(ControlRequest::Delete {
            name: name.to_owned(),
        })
        .await
    }

    async fn send(&self, request: ControlRequest) -> Result<()> {
        let operation = request.operation();
        let pipeline = request.pipeline().to_owned();
        self.channel
            .execute(request)
            .await
            .map_err(|cause| AppError::daemon_command(pipeline, operation.as_str(), cause))
    }
}
