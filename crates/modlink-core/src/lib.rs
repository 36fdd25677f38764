//! modlink core
//!
//! Runtime-free building blocks of the modlink inter-module messaging
//! framework: fixed-layout wire messages, module and event identifiers, the
//! module directory that maps modules to UDP endpoints, and configuration.
//! The async execution layer lives in `modlink-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod directory;
pub mod errors;
pub mod events;
pub mod protocol;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChannelConfig, LifecycleConfig, ModlinkConfig};
pub use directory::{ChannelKind, ChannelSocketParam, ModuleConfig, ModuleDirectory};
pub use errors::{ErrorKind, ModlinkError, ModlinkResult, Result};
pub use protocol::{
    Envelope, EventEnvelope, EventRequest, EventResponse, IpcMessage, MessageKind, Metadata,
    StateEnvelope, StateRequest, StateResponse, WireMessage,
};
pub use types::{
    ChannelFunction, ErrorCode, EventId, Module, ModuleId, ModuleState, StateId, SystemTimeSource,
    TimeSource, Timestamp,
};
