//! Wire protocol: fixed-layout messages and the codec behind them

pub mod codec;
pub mod envelope;
pub mod message;

pub use codec::{fill_fixed, fixed_str, set_fixed_str, WireReader, WireWriter};
pub use envelope::{Envelope, EventEnvelope, IpcMessage, StateEnvelope};
pub use message::{
    EventRequest, EventResponse, MessageKind, Metadata, StateRequest, StateResponse, WireMessage,
    ERROR_MESSAGE_SIZE, EVENT_REQUEST_DATA_SIZE, EVENT_RESPONSE_DATA_SIZE, METADATA_SIZE,
};
