//! Generic request/response channel
//!
//! A [`Channel`] pairs an input socket, bound to this module's input port,
//! with an output socket used for every send. A periodic worker reads one
//! datagram per tick, decodes it by its leading discriminant and hands it to
//! a [`ChannelProcessor`]. Processors reply through a [`MessageSink`].

pub mod event;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, error, trace, warn};

use modlink_core::{
    ChannelConfig, ChannelKind, Envelope, IpcMessage, ModlinkError, ModuleDirectory, ModuleId,
    Result, SystemTimeSource, TimeSource, Timestamp, WireMessage,
};

use crate::socket::DatagramSocket;
use crate::task::{PeriodicTask, Runnable, StopSignal};

// ----------------------------------------------------------------------------
// Processor Interface
// ----------------------------------------------------------------------------

/// Outbound path available to processors
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send `msg` to the module named by its target
    async fn send_message(&self, msg: IpcMessage) -> Result<()>;
}

/// Channel-specific handling of decoded messages
#[async_trait]
pub trait ChannelProcessor: Send + Sync + 'static {
    type Request: WireMessage;
    type Response: WireMessage;

    /// Handle one inbound message
    ///
    /// Errors for which [`ModlinkError::is_fatal`] holds stop the channel;
    /// any other error is logged and the channel keeps running.
    async fn on_process(
        &self,
        msg: Envelope<Self::Request, Self::Response>,
        sink: &dyn MessageSink,
    ) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Sender
// ----------------------------------------------------------------------------

/// Outbound half of a channel, shared between the worker and callers
pub struct ChannelSender {
    kind: ChannelKind,
    module: ModuleId,
    socket: DatagramSocket,
    directory: Arc<ModuleDirectory>,
    clock: Arc<dyn TimeSource>,
    peer_cache: Option<DashMap<ModuleId, SocketAddr>>,
}

impl ChannelSender {
    fn new(
        kind: ChannelKind,
        module: ModuleId,
        socket: DatagramSocket,
        directory: Arc<ModuleDirectory>,
        clock: Arc<dyn TimeSource>,
        cache_peer_addresses: bool,
    ) -> Self {
        Self {
            kind,
            module,
            socket,
            directory,
            clock,
            peer_cache: cache_peer_addresses.then(DashMap::new),
        }
    }

    /// Stamp the send time and deliver to the target's input port
    pub async fn send(&self, msg: impl Into<IpcMessage> + Send) -> Result<()> {
        let mut msg = msg.into();
        let target = msg.target();
        let dest = self.resolve(target)?;
        msg.metadata_mut().time = self.clock.now();

        let size = msg.wire_size();
        let mut buf = vec![0u8; size];
        msg.encode_into(&mut buf)?;
        self.socket.send_to(&buf, size, dest).await?;
        trace!(
            channel = %self.kind,
            module = %self.module,
            target = %target,
            message = msg.type_name(),
            "Message sent"
        );
        Ok(())
    }

    fn resolve(&self, target: ModuleId) -> Result<SocketAddr> {
        if let Some(cache) = &self.peer_cache {
            if let Some(addr) = cache.get(&target) {
                return Ok(*addr);
            }
        }
        let addr = self.directory.lookup(target, self.kind)?.input_addr();
        if let Some(cache) = &self.peer_cache {
            cache.insert(target, addr);
        }
        Ok(addr)
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

#[async_trait]
impl MessageSink for ChannelSender {
    async fn send_message(&self, msg: IpcMessage) -> Result<()> {
        self.send(msg).await
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

/// Receive loop body; owns the input socket
pub struct ChannelWorker<P: ChannelProcessor> {
    kind: ChannelKind,
    module: ModuleId,
    socket: DatagramSocket,
    buffer: Vec<u8>,
    recv_timeout: Option<Duration>,
    processor: Arc<P>,
    sender: Arc<ChannelSender>,
}

impl<P: ChannelProcessor> ChannelWorker<P> {
    async fn read(&mut self) -> Result<Envelope<P::Request, P::Response>> {
        let (peeked, from) = self
            .socket
            .recv_peek(&mut self.buffer, self.recv_timeout)
            .await?;

        let expected = match peeked {
            0 => Err(ModlinkError::buffer_too_small(1, 0)),
            _ => Envelope::<P::Request, P::Response>::wire_size_for(self.buffer[0]),
        };
        let expected = match expected {
            Ok(size) => size,
            Err(err) => {
                // Drop the datagram so it does not block the queue
                let _ = self
                    .socket
                    .recv_from(&mut self.buffer, peeked, Some(Duration::ZERO))
                    .await;
                return Err(err);
            }
        };

        self.socket
            .recv_from(&mut self.buffer, expected, Some(Duration::ZERO))
            .await?;
        trace!(channel = %self.kind, from = %from, len = expected, "Datagram accepted");
        Envelope::decode(&self.buffer[..expected])
    }
}

#[async_trait]
impl<P: ChannelProcessor> Runnable for ChannelWorker<P> {
    async fn on_process(&mut self, stop: &mut StopSignal) -> Result<()> {
        let read = tokio::select! {
            _ = stop.stopped() => return Ok(()),
            read = self.read() => read,
        };

        let envelope = match read {
            Ok(envelope) => envelope,
            Err(ModlinkError::Timeout { .. }) => return Ok(()),
            Err(err) => {
                warn!(channel = %self.kind, module = %self.module, error = %err, "Failed to read message");
                return Ok(());
            }
        };

        match self
            .processor
            .on_process(envelope, self.sender.as_ref())
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => {
                error!(channel = %self.kind, module = %self.module, error = %err, "Channel terminated");
                Err(err)
            }
            Err(err) => {
                warn!(channel = %self.kind, module = %self.module, error = %err, "Message handling failed");
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Channel
// ----------------------------------------------------------------------------

/// Bidirectional channel of one module
pub struct Channel<P: ChannelProcessor> {
    kind: ChannelKind,
    module: ModuleId,
    config: ChannelConfig,
    processor: Arc<P>,
    sender: Arc<ChannelSender>,
    task: PeriodicTask<ChannelWorker<P>>,
}

impl<P: ChannelProcessor> Channel<P> {
    /// Open and bind the input socket and open the output socket
    pub async fn new(
        kind: ChannelKind,
        module: ModuleId,
        directory: Arc<ModuleDirectory>,
        config: ChannelConfig,
        processor: P,
    ) -> Result<Self> {
        Self::with_time_source(
            kind,
            module,
            directory,
            config,
            processor,
            Arc::new(SystemTimeSource),
        )
        .await
    }

    pub async fn with_time_source(
        kind: ChannelKind,
        module: ModuleId,
        directory: Arc<ModuleDirectory>,
        config: ChannelConfig,
        processor: P,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoint = directory.lookup(module, kind)?;

        let mut input = DatagramSocket::new(endpoint.input_addr());
        input.open()?;
        input.bind().await?;

        let mut output = DatagramSocket::new(endpoint.output_addr());
        output.open()?;

        let sender = Arc::new(ChannelSender::new(
            kind,
            module,
            output,
            directory,
            clock,
            config.cache_peer_addresses,
        ));
        let processor = Arc::new(processor);
        let worker = ChannelWorker {
            kind,
            module,
            socket: input,
            buffer: vec![0u8; P::Request::WIRE_SIZE * config.buffer_multiplier],
            recv_timeout: config.recv_timeout(),
            processor: processor.clone(),
            sender: sender.clone(),
        };

        debug!(channel = %kind, module = %module, input = %endpoint.input_addr(), "Channel created");
        Ok(Self {
            kind,
            module,
            task: PeriodicTask::new(format!("{} {}", kind, module), worker),
            config,
            processor,
            sender,
        })
    }

    /// Start the receive loop, reopening the input socket after a stop
    ///
    /// A loop that ended on a fatal processing error is reaped first, so the
    /// channel can be restarted without an explicit stop.
    pub async fn start(&mut self) -> Result<()> {
        if self.task.has_exited() {
            self.task.stop().await?;
        }
        if let Some(worker) = self.task.worker_mut() {
            if !worker.socket.is_open() {
                worker.socket.open()?;
                worker.socket.bind().await?;
            }
        }
        self.task.run_periodic(self.config.task_period())
    }

    /// Stop the receive loop and close the input socket
    pub async fn stop(&mut self) -> Result<()> {
        self.task.stop().await?;
        if let Some(worker) = self.task.worker_mut() {
            if worker.socket.is_open() {
                worker.socket.close()?;
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub async fn send(&self, msg: impl Into<IpcMessage> + Send) -> Result<()> {
        self.sender.send(msg).await
    }

    pub fn sender(&self) -> Arc<ChannelSender> {
        self.sender.clone()
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}
