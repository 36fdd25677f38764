//! State channel: controller-to-module state requests
//!
//! A channel is either the client side (the module being controlled) or
//! the server side (the controller), fixed at construction. Clients answer
//! every request with their resulting state; servers observe responses.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use modlink_core::{
    ChannelConfig, ChannelKind, Envelope, IpcMessage, ModlinkError, ModuleDirectory, ModuleId,
    ModuleState, Result, StateRequest, StateResponse, TimeSource, WireMessage,
};

use super::{Channel, ChannelProcessor, MessageSink};

/// Callback taking a request and the response that will be, or was, sent
pub type StateHandler = Arc<dyn Fn(&StateRequest, &mut StateResponse) + Send + Sync>;

/// Side of the state protocol a channel plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRole {
    /// Receives requests and replies with its state
    Client,
    /// Issues requests and receives responses
    Server,
}

// ----------------------------------------------------------------------------
// State Processor
// ----------------------------------------------------------------------------

pub struct StateProcessor {
    role: StateRole,
    module: ModuleId,
    on_state_change: RwLock<Option<StateHandler>>,
    on_state_response: RwLock<Option<StateHandler>>,
}

impl StateProcessor {
    pub fn new(module: ModuleId, role: StateRole) -> Self {
        Self {
            role,
            module,
            on_state_change: RwLock::new(None),
            on_state_response: RwLock::new(None),
        }
    }

    pub fn role(&self) -> StateRole {
        self.role
    }

    /// Register the handler that applies requested state changes (client only)
    pub fn add_state_change_callback<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&StateRequest, &mut StateResponse) + Send + Sync + 'static,
    {
        if self.role != StateRole::Client {
            return Err(ModlinkError::bad_configuration(
                "state change callbacks are only valid on a client state channel",
            ));
        }
        *self
            .on_state_change
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
        Ok(())
    }

    /// Register the handler that observes client responses (server only)
    pub fn add_state_response_callback<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&StateRequest, &mut StateResponse) + Send + Sync + 'static,
    {
        if self.role != StateRole::Server {
            return Err(ModlinkError::bad_configuration(
                "state response callbacks are only valid on a server state channel",
            ));
        }
        *self
            .on_state_response
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
        Ok(())
    }

    fn handler(slot: &RwLock<Option<StateHandler>>) -> Option<StateHandler> {
        slot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn handle_request(&self, request: StateRequest, sink: &dyn MessageSink) -> Result<()> {
        let requester = request.module_id();
        let mut response = StateResponse::new(self.module, requester, ModuleState::Standby);

        match Self::handler(&self.on_state_change) {
            Some(handler) => handler(&request, &mut response),
            None => debug!(module = %self.module, "No state change callback registered"),
        }

        info!(
            module = %self.module,
            controller = %requester,
            requested = request.requested_id(),
            current = response.current_id(),
            "State request handled"
        );
        sink.send_message(response.into()).await
    }

    fn handle_response(&self, mut response: StateResponse) {
        match Self::handler(&self.on_state_response) {
            Some(handler) => handler(&StateRequest::default(), &mut response),
            None => debug!(
                module = %self.module,
                from = %response.module_id(),
                state = response.current_id(),
                "State response received"
            ),
        }
    }
}

#[async_trait]
impl ChannelProcessor for StateProcessor {
    type Request = StateRequest;
    type Response = StateResponse;

    async fn on_process(
        &self,
        msg: Envelope<StateRequest, StateResponse>,
        sink: &dyn MessageSink,
    ) -> Result<()> {
        match (self.role, msg) {
            (StateRole::Client, Envelope::Request(request)) => {
                self.handle_request(request, sink).await
            }
            (StateRole::Server, Envelope::Response(response)) => {
                self.handle_response(response);
                Ok(())
            }
            (StateRole::Client, Envelope::Response(response)) => {
                Err(ModlinkError::protocol_violation(format!(
                    "client state channel of module {} received a response from module {}",
                    self.module,
                    response.module_id()
                )))
            }
            (StateRole::Server, Envelope::Request(request)) => {
                Err(ModlinkError::protocol_violation(format!(
                    "server state channel of module {} received a request from module {}",
                    self.module,
                    request.module_id()
                )))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// State Channel
// ----------------------------------------------------------------------------

/// State channel of one module
pub struct StateChannel {
    channel: Channel<StateProcessor>,
}

impl StateChannel {
    pub async fn new(
        module: ModuleId,
        role: StateRole,
        directory: Arc<ModuleDirectory>,
        config: ChannelConfig,
    ) -> Result<Self> {
        let channel = Channel::new(
            ChannelKind::State,
            module,
            directory,
            config,
            StateProcessor::new(module, role),
        )
        .await?;
        Ok(Self { channel })
    }

    pub async fn with_time_source(
        module: ModuleId,
        role: StateRole,
        directory: Arc<ModuleDirectory>,
        config: ChannelConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let channel = Channel::with_time_source(
            ChannelKind::State,
            module,
            directory,
            config,
            StateProcessor::new(module, role),
            clock,
        )
        .await?;
        Ok(Self { channel })
    }

    pub fn add_state_change_callback<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&StateRequest, &mut StateResponse) + Send + Sync + 'static,
    {
        self.channel.processor().add_state_change_callback(handler)
    }

    pub fn add_state_response_callback<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&StateRequest, &mut StateResponse) + Send + Sync + 'static,
    {
        self.channel.processor().add_state_response_callback(handler)
    }

    /// Ask `target` to move to `state`
    pub async fn request_state(&self, target: ModuleId, state: ModuleState) -> Result<()> {
        let request = StateRequest::new(self.module_id(), target, state);
        self.channel.send(request).await
    }

    /// Send a prepared message on this channel
    pub async fn send(&self, msg: impl Into<IpcMessage> + Send) -> Result<()> {
        self.channel.send(msg).await
    }

    pub async fn start(&mut self) -> Result<()> {
        self.channel.start().await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.channel.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.channel.is_running()
    }

    pub fn role(&self) -> StateRole {
        self.channel.processor().role()
    }

    pub fn module_id(&self) -> ModuleId {
        self.channel.module_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<IpcMessage>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send_message(&self, msg: IpcMessage) -> Result<()> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    #[test]
    fn test_role_enforced_at_registration() {
        let client = StateProcessor::new(ModuleId::new(2), StateRole::Client);
        assert!(client.add_state_change_callback(|_, _| {}).is_ok());
        assert!(matches!(
            client.add_state_response_callback(|_, _| {}),
            Err(ModlinkError::BadConfiguration { .. })
        ));

        let server = StateProcessor::new(ModuleId::new(4), StateRole::Server);
        assert!(server.add_state_response_callback(|_, _| {}).is_ok());
        assert!(server.add_state_change_callback(|_, _| {}).is_err());
    }

    #[tokio::test]
    async fn test_client_replies_to_sender() {
        let client = StateProcessor::new(ModuleId::new(2), StateRole::Client);
        client
            .add_state_change_callback(|request, response| {
                response.set_current_id(request.requested_id());
            })
            .unwrap();

        let sink = RecordingSink::default();
        let request = StateRequest::new(ModuleId::new(4), ModuleId::new(2), ModuleState::Initializing);
        client
            .on_process(Envelope::Request(request), &sink)
            .await
            .unwrap();

        let sent = sink.sent.lock().unwrap();
        match sent.as_slice() {
            [IpcMessage::StateResponse(response)] => {
                assert_eq!(response.target_module_id(), ModuleId::new(4));
                assert_eq!(response.module_id(), ModuleId::new(2));
                assert_eq!(response.current_state(), Some(ModuleState::Initializing));
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_message_kind_is_fatal() {
        let sink = RecordingSink::default();

        let client = StateProcessor::new(ModuleId::new(2), StateRole::Client);
        let err = client
            .on_process(Envelope::Response(StateResponse::default()), &sink)
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        let server = StateProcessor::new(ModuleId::new(4), StateRole::Server);
        let err = server
            .on_process(Envelope::Request(StateRequest::default()), &sink)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_observes_responses() {
        let server = StateProcessor::new(ModuleId::new(4), StateRole::Server);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let log = observed.clone();
        server
            .add_state_response_callback(move |_, response| {
                log.lock()
                    .unwrap()
                    .push((response.module_id(), response.current_state()));
            })
            .unwrap();

        let response = StateResponse::new(ModuleId::new(2), ModuleId::new(4), ModuleState::Setup);
        let sink = RecordingSink::default();
        server
            .on_process(Envelope::Response(response), &sink)
            .await
            .unwrap();

        assert_eq!(
            *observed.lock().unwrap(),
            vec![(ModuleId::new(2), Some(ModuleState::Setup))]
        );
    }
}
