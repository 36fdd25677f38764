//! Event channel: subscribe, update and query
//!
//! Each module owns a set of events. Other modules subscribe to them, push
//! updates that run the owner's handler, or query which events the owner
//! supports. Every update is fanned out to all subscribers of the event.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use modlink_core::{
    ChannelConfig, ChannelFunction, ChannelKind, Envelope, EventId, EventRequest, EventResponse,
    IpcMessage, ModuleDirectory, ModuleId, Result, TimeSource, WireMessage,
};

use super::{Channel, ChannelProcessor, MessageSink};

/// Handler run for an event; fills in the response that goes out
pub type EventHandler = Arc<dyn Fn(&EventRequest, &mut EventResponse) + Send + Sync>;

// ----------------------------------------------------------------------------
// Event Processor
// ----------------------------------------------------------------------------

/// Event tables of one module and the dispatch logic over them
///
/// Tables can be changed while the channel runs. No lock is held while a
/// message is being sent.
pub struct EventProcessor {
    module: ModuleId,
    supported: RwLock<Vec<EventId>>,
    handlers: DashMap<EventId, EventHandler>,
    subscribers: DashMap<EventId, Vec<ModuleId>>,
}

impl EventProcessor {
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            supported: RwLock::new(Vec::new()),
            handlers: DashMap::new(),
            subscribers: DashMap::new(),
        }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    /// Register or replace the handler for `event`
    ///
    /// Request events are also advertised in query responses. Handlers for
    /// events owned by other modules are registered with
    /// `is_request_event = false` and run when a response for that event
    /// arrives.
    pub fn add_event_callback<F>(&self, event: EventId, handler: F, is_request_event: bool)
    where
        F: Fn(&EventRequest, &mut EventResponse) + Send + Sync + 'static,
    {
        if is_request_event {
            let mut supported = self
                .supported
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !supported.contains(&event) {
                supported.push(event);
            }
        }
        self.handlers.insert(event, Arc::new(handler));
        debug!(module = %self.module, event = %event, "Event callback registered");
    }

    /// Events advertised to queries, in registration order
    pub fn supported_events(&self) -> Vec<EventId> {
        self.supported
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribers(&self, event: EventId) -> Vec<ModuleId> {
        self.subscribers
            .get(&event)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// Add `module` to the subscribers of `event`; returns false if already present
    pub fn add_subscriber(&self, event: EventId, module: ModuleId) -> bool {
        let mut list = self.subscribers.entry(event).or_default();
        if list.contains(&module) {
            return false;
        }
        list.push(module);
        true
    }

    fn handler(&self, event: EventId) -> Option<EventHandler> {
        self.handlers
            .get(&event)
            .map(|handler| handler.value().clone())
    }

    async fn handle_request(&self, request: EventRequest, sink: &dyn MessageSink) -> Result<()> {
        let requester = request.module_id();
        match request.function() {
            Some(ChannelFunction::Subscribe) => {
                let event = request.event_id();
                if self.add_subscriber(event, requester) {
                    debug!(module = %self.module, event = %event, subscriber = %requester, "Subscriber added");
                }
                Ok(())
            }
            Some(ChannelFunction::Update) => self.handle_update(request, sink).await,
            Some(ChannelFunction::Query) => self.handle_query(requester, sink).await,
            None => {
                warn!(
                    module = %self.module,
                    function = request.function_id(),
                    from = %requester,
                    "Ignoring request with unknown function"
                );
                Ok(())
            }
        }
    }

    async fn handle_update(&self, request: EventRequest, sink: &dyn MessageSink) -> Result<()> {
        let event = request.event_id();
        let mut response = EventResponse::new(self.module, event);

        match self.handler(event) {
            Some(handler) => handler(&request, &mut response),
            None => trace!(module = %self.module, event = %event, "No handler for updated event"),
        }

        let subscribers = self.subscribers(event);
        for subscriber in &subscribers {
            let mut notification = response.clone();
            notification.set_target_module_id(*subscriber);
            if let Err(err) = sink.send_message(notification.into()).await {
                warn!(event = %event, subscriber = %subscriber, error = %err, "Failed to notify subscriber");
            }
        }

        // A subscribing requester already has this response
        let requester = request.module_id();
        if request.response_required() && !subscribers.contains(&requester) {
            response.set_target_module_id(requester);
            sink.send_message(response.into()).await?;
        }
        Ok(())
    }

    async fn handle_query(&self, requester: ModuleId, sink: &dyn MessageSink) -> Result<()> {
        let mut response = EventResponse::new(self.module, self.module.query_event());
        response.set_target_module_id(requester);

        let events = self.supported_events();
        if let Err(err) = response.set_event_ids(&events) {
            warn!(module = %self.module, count = events.len(), error = %err, "Supported events do not fit a query response");
        }
        sink.send_message(response.into()).await
    }

    fn handle_response(&self, mut response: EventResponse) {
        let event = response.event_id();
        match self.handler(event) {
            Some(handler) => handler(&EventRequest::default(), &mut response),
            None => debug!(module = %self.module, event = %event, from = %response.module_id(), "No callback for event response"),
        }
    }
}

#[async_trait]
impl ChannelProcessor for EventProcessor {
    type Request = EventRequest;
    type Response = EventResponse;

    async fn on_process(
        &self,
        msg: Envelope<EventRequest, EventResponse>,
        sink: &dyn MessageSink,
    ) -> Result<()> {
        match msg {
            Envelope::Request(request) => self.handle_request(request, sink).await,
            Envelope::Response(response) => {
                self.handle_response(response);
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Event Channel
// ----------------------------------------------------------------------------

/// Event channel of one module
pub struct EventChannel {
    channel: Channel<EventProcessor>,
}

impl EventChannel {
    pub async fn new(
        module: ModuleId,
        directory: Arc<ModuleDirectory>,
        config: ChannelConfig,
    ) -> Result<Self> {
        let channel = Channel::new(
            ChannelKind::Event,
            module,
            directory,
            config,
            EventProcessor::new(module),
        )
        .await?;
        Ok(Self { channel })
    }

    pub async fn with_time_source(
        module: ModuleId,
        directory: Arc<ModuleDirectory>,
        config: ChannelConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let channel = Channel::with_time_source(
            ChannelKind::Event,
            module,
            directory,
            config,
            EventProcessor::new(module),
            clock,
        )
        .await?;
        Ok(Self { channel })
    }

    /// See [`EventProcessor::add_event_callback`]
    pub fn add_event_callback<F>(&self, event: EventId, handler: F, is_request_event: bool)
    where
        F: Fn(&EventRequest, &mut EventResponse) + Send + Sync + 'static,
    {
        self.channel
            .processor()
            .add_event_callback(event, handler, is_request_event);
    }

    /// Ask the owner of `event` to notify this module of its updates
    pub async fn subscribe(&self, event: EventId) -> Result<()> {
        let request = EventRequest::new(self.module_id(), ChannelFunction::Subscribe, event);
        self.channel.send(request).await
    }

    /// Push an update for `event` to its owner
    pub async fn update(
        &self,
        event: EventId,
        payload: &[u8],
        response_required: bool,
    ) -> Result<()> {
        let request = EventRequest::new(self.module_id(), ChannelFunction::Update, event)
            .with_payload(payload)?
            .with_response_required(response_required);
        self.channel.send(request).await
    }

    /// Ask `module` which events it supports
    pub async fn query(&self, module: ModuleId) -> Result<()> {
        let request = EventRequest::new(self.module_id(), ChannelFunction::Query, module.query_event());
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

    pub fn module_id(&self) -> ModuleId {
        self.channel.module_id()
    }

    pub fn supported_events(&self) -> Vec<EventId> {
        self.channel.processor().supported_events()
    }

    pub fn subscribers(&self, event: EventId) -> Vec<ModuleId> {
        self.channel.processor().subscribers(event)
    }

    pub fn processor(&self) -> &Arc<EventProcessor> {
        self.channel.processor()
    }
}
