//! modlink runtime
//!
//! tokio-based execution layer of the modlink framework:
//! - `PeriodicTask`: drives a worker once or on a fixed period
//! - `DatagramSocket`: UDP endpoint with explicit open / bind / close
//! - `Channel`: generic receive loop plus outbound sender
//! - `EventChannel` and `StateChannel`: the two protocols every module speaks
//! - `ModuleLifecycle`: state machine and hooks tying a module together
//!
//! Wire types, addressing and configuration come from `modlink-core` and
//! are re-exported here.

pub mod channel;
pub mod lifecycle;
pub mod socket;
pub mod task;

pub use channel::event::{EventChannel, EventHandler, EventProcessor};
pub use channel::state::{StateChannel, StateHandler, StateProcessor, StateRole};
pub use channel::{Channel, ChannelProcessor, ChannelSender, ChannelWorker, MessageSink};
pub use lifecycle::{
    ModuleHooks, ModuleLifecycle, StateMachine, HOOK_FAILURE_CODE, ILLEGAL_TRANSITION_CODE,
    UNKNOWN_STATE_CODE,
};
pub use socket::DatagramSocket;
pub use task::{PeriodicTask, RunMode, RunOnceHandle, Runnable, StopSignal};

// Re-export core types for convenience
pub use modlink_core::{
    events, ChannelConfig, ChannelFunction, ChannelKind, ChannelSocketParam, Envelope, ErrorKind,
    EventId, EventRequest, EventResponse, IpcMessage, LifecycleConfig, ModlinkConfig,
    ModlinkError, ModlinkResult, Module, ModuleDirectory, ModuleId, ModuleState, Result,
    StateRequest, StateResponse, SystemTimeSource, TimeSource, Timestamp, WireMessage,
};
