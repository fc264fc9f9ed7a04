//! Unit tests for the control client and the in-memory channel.

use std::sync::Arc;
use std::time::Duration;

use ingest_orchestrator::control::memory::{MemoryChannel, MemoryConnector};
use ingest_orchestrator::control::{ControlClient, ControlRequest, Endpoint, Operation};
use ingest_orchestrator::models::pipeline::{LifecycleState, PipelineGroup};
use ingest_orchestrator::pipeline::PipelineResource;
use ingest_orchestrator::AppError;

fn endpoint() -> Endpoint {
    Endpoint::new("127.0.0.1", 5000)
}

async fn connected(channel: &Arc<MemoryChannel>) -> ControlClient {
    let connector = MemoryConnector::new(Arc::clone(channel));
    ControlClient::connect(&connector, &endpoint(), 1, Duration::ZERO)
        .await
        .expect("connected")
}

#[tokio::test]
async fn connect_retries_until_success() {
    let channel = MemoryChannel::new();
    let connector = MemoryConnector::refusing(Arc::clone(&channel), 2);
    let client = ControlClient::connect(&connector, &endpoint(), 3, Duration::ZERO).await;
    assert!(client.is_ok());
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn connect_gives_up_after_configured_attempts() {
    let channel = MemoryChannel::new();
    let connector = MemoryConnector::refusing(Arc::clone(&channel), 5);
    let err = ControlClient::connect(&connector, &endpoint(), 3, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DaemonUnreachable(ref msg) if msg.contains("127.0.0.1:5000")));
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn rejected_command_becomes_daemon_command_error() {
    let channel = MemoryChannel::new();
    let client = connected(&channel).await;
    let err = client.play("ghost").await.unwrap_err();
    assert_eq!(
        err,
        AppError::DaemonCommand {
            pipeline: "ghost".into(),
            operation: "play".into(),
            cause: "pipeline 'ghost' does not exist".into(),
        }
    );
}

#[tokio::test]
async fn requests_are_recorded_in_order() {
    let channel = MemoryChannel::new();
    let client = connected(&channel).await;
    client.create_pipeline("p", "fakesrc ! fakesink").await.unwrap();
    client.set_property("p", "sink", "sync", "false").await.unwrap();
    client.play("p").await.unwrap();
    client.send_end_of_stream("p").await.unwrap();
    client.stop("p").await.unwrap();
    client.delete("p").await.unwrap();

    let ops: Vec<Operation> = channel.requests().iter().map(ControlRequest::operation).collect();
    assert_eq!(
        ops,
        [
            Operation::Create,
            Operation::SetProperty,
            Operation::Play,
            Operation::EndOfStream,
            Operation::Stop,
            Operation::Delete,
        ]
    );
    assert!(channel.pipelines().is_empty());
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let channel = MemoryChannel::new();
    let client = connected(&channel).await;
    client.create_pipeline("p", "d").await.unwrap();
    assert!(client.create_pipeline("p", "d").await.is_err());
}

#[tokio::test]
async fn resource_tracks_last_accepted_command() {
    let channel = MemoryChannel::new();
    let client = connected(&channel).await;
    let resource = PipelineResource::create(client, "camA", "d", PipelineGroup::Camera)
        .await
        .unwrap();
    assert_eq!(resource.state().await, LifecycleState::Created);

    resource.play().await.unwrap();
    assert_eq!(resource.state().await, LifecycleState::Playing);

    channel.fail_when(|r| r.operation() == Operation::Stop);
    assert!(resource.stop().await.is_err());
    assert_eq!(resource.state().await, LifecycleState::Playing);
}

#[tokio::test]
async fn rebind_and_file_location_target_named_elements() {
    let channel = MemoryChannel::new();
    let client = connected(&channel).await;
    let resource = PipelineResource::create(client, "snap_jpeg", "d", PipelineGroup::Snapshot)
        .await
        .unwrap();
    resource
        .set_file_location(std::path::Path::new("/tmp/a.jpeg"))
        .await
        .unwrap();
    resource.rebind("encode_jpeg_src", "camB").await.unwrap();

    let requests = channel.requests();
    assert_eq!(
        requests[1],
        ControlRequest::SetProperty {
            pipeline: "snap_jpeg".into(),
            element: "filesink_snap_jpeg".into(),
            property: "location".into(),
            value: "/tmp/a.jpeg".into(),
        }
    );
    assert_eq!(
        requests[2],
        ControlRequest::SetProperty {
            pipeline: "snap_jpeg".into(),
            element: "encode_jpeg_src".into(),
            property: "listen-to".into(),
            value: "camB".into(),
        }
    );
}
