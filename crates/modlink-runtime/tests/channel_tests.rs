//! Generic channel tests with a custom processor

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{init_tracing, test_directory, wait_until};
use modlink_runtime::{
    Channel, ChannelConfig, ChannelKind, ChannelProcessor, Envelope, MessageSink, ModuleId,
    ModuleState, Result, StateRequest, StateResponse, WireMessage,
};

/// Answers every request with the requested state, counts responses
#[derive(Default)]
struct Echo {
    requests: AtomicUsize,
    responses: AtomicUsize,
}

#[async_trait]
impl ChannelProcessor for Echo {
    type Request = StateRequest;
    type Response = StateResponse;

    async fn on_process(
        &self,
        msg: Envelope<StateRequest, StateResponse>,
        sink: &dyn MessageSink,
    ) -> Result<()> {
        match msg {
            Envelope::Request(request) => {
                self.requests.fetch_add(1, Ordering::SeqCst);
                let mut response = StateResponse::default();
                response.set_module_id(request.target_module_id());
                response.set_target_module_id(request.module_id());
                response.set_current_id(request.requested_id());
                sink.send_message(response.into()).await
            }
            Envelope::Response(_) => {
                self.responses.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

async fn echo_channel(
    module: u16,
    directory: &Arc<modlink_runtime::ModuleDirectory>,
    config: ChannelConfig,
) -> Channel<Echo> {
    Channel::new(
        ChannelKind::State,
        ModuleId::new(module),
        directory.clone(),
        config,
        Echo::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_request_and_reply_with_cached_addresses() {
    init_tracing();
    let directory = test_directory(&[1, 2]);
    let config = ChannelConfig::default()
        .with_task_period(Duration::from_millis(1))
        .with_recv_timeout(Some(Duration::from_millis(10)))
        .with_cache_peer_addresses(true);

    let mut left = echo_channel(1, &directory, config.clone()).await;
    let mut right = echo_channel(2, &directory, config).await;
    left.start().await.unwrap();
    right.start().await.unwrap();

    for _ in 0..5 {
        left.send(StateRequest::new(
            ModuleId::new(1),
            ModuleId::new(2),
            ModuleState::Setup,
        ))
        .await
        .unwrap();
    }

    assert!(wait_until(|| left.processor().responses.load(Ordering::SeqCst) == 5).await);
    assert_eq!(right.processor().requests.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_stopped_channel_refuses_traffic_until_restart() {
    init_tracing();
    let directory = test_directory(&[1, 2]);
    let mut left = echo_channel(1, &directory, ChannelConfig::default()).await;
    let mut right = echo_channel(2, &directory, ChannelConfig::default()).await;
    left.start().await.unwrap();
    right.start().await.unwrap();

    right.stop().await.unwrap();
    assert!(!right.is_running());
    assert!(right.start().await.is_ok());
    assert!(right.start().await.is_err());

    left.send(StateRequest::new(
        ModuleId::new(1),
        ModuleId::new(2),
        ModuleState::Running,
    ))
    .await
    .unwrap();
    assert!(wait_until(|| left.processor().responses.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_zero_buffer_multiplier_rejected() {
    let directory = test_directory(&[1]);
    let result = Channel::new(
        ChannelKind::State,
        ModuleId::new(1),
        directory,
        ChannelConfig::default().with_buffer_multiplier(0),
        Echo::default(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_input_port_in_use_fails_construction() {
    let directory = test_directory(&[1]);
    let _first = echo_channel(1, &directory, ChannelConfig::default()).await;
    let second = Channel::new(
        ChannelKind::State,
        ModuleId::new(1),
        directory.clone(),
        ChannelConfig::default(),
        Echo::default(),
    )
    .await;
    assert!(matches!(second, Err(modlink_runtime::ModlinkError::Io(_))));
}
