//! Message definitions and their fixed-size wire layout
//!
//! Every message starts with the same metadata block. Byte 0 is the
//! request/response discriminant; all integers are big-endian.
//!
//! ```text
//! metadata (13 bytes)
//! ┌──────┬──────────────┬───────────┬───────────┐
//! │ kind │ time (i64)   │ sender    │ target    │
//! │ u8   │ ms, BE       │ u16, BE   │ u16, BE   │
//! └──────┴──────────────┴───────────┴───────────┘
//!
//! event request  = metadata | function u16 | event u16 | data[256] | response_required u8
//! event response = metadata | event u16 | data[64] | error_code u16 | error_message[64]
//! state request  = metadata | requested_state u16
//! state response = metadata | current_state u16 | error_code u16 | error_message[64]
//! ```

use core::fmt;

use super::codec::{fill_fixed, fixed_str, set_fixed_str, WireReader, WireWriter};
use super::envelope::IpcMessage;
use crate::types::{
    ChannelFunction, ErrorCode, EventId, ModuleId, ModuleState, StateId, Timestamp,
};
use crate::{ModlinkError, Result};

// ----------------------------------------------------------------------------
// Protocol Constants
// ----------------------------------------------------------------------------

/// Opaque payload carried by an event request
pub const EVENT_REQUEST_DATA_SIZE: usize = 256;

/// Opaque payload carried by an event response
pub const EVENT_RESPONSE_DATA_SIZE: usize = 64;

/// Fixed error text field in responses
pub const ERROR_MESSAGE_SIZE: usize = 64;

/// Size of the metadata block that prefixes every message
pub const METADATA_SIZE: usize = 1 + 8 + 2 + 2;

// ----------------------------------------------------------------------------
// Message Kind
// ----------------------------------------------------------------------------

/// Leading discriminant of every datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Request = 0,
    Response = 1,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Response),
            other => Err(ModlinkError::UnknownMessageKind(other)),
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

// ----------------------------------------------------------------------------
// Metadata
// ----------------------------------------------------------------------------

/// Header common to every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub kind: MessageKind,
    /// Send time, stamped by the channel when the message goes out
    pub time: Timestamp,
    pub module: ModuleId,
    pub target: ModuleId,
}

impl Metadata {
    pub const fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            time: Timestamp::new(0),
            module: ModuleId::new(0),
            target: ModuleId::new(0),
        }
    }

    fn encode(&self, writer: &mut WireWriter<'_>) {
        writer.put_u8(self.kind.as_u8());
        writer.put_i64(self.time.as_millis());
        writer.put_u16(self.module.as_u16());
        writer.put_u16(self.target.as_u16());
    }

    fn decode(reader: &mut WireReader<'_>, expected: MessageKind) -> Result<Self> {
        let kind = MessageKind::from_u8(reader.u8())?;
        if kind != expected {
            return Err(ModlinkError::invalid_state(format!(
                "expected {:?} message, found {:?}",
                expected, kind
            )));
        }
        Ok(Self {
            kind,
            time: Timestamp::new(reader.i64()),
            module: ModuleId::new(reader.u16()),
            target: ModuleId::new(reader.u16()),
        })
    }
}

// ----------------------------------------------------------------------------
// Wire Message Trait
// ----------------------------------------------------------------------------

/// A fixed-size message that can be written to and read from a datagram
pub trait WireMessage: Clone + fmt::Debug + Send + Sync + Sized + Into<IpcMessage> + 'static {
    /// Discriminant written in byte 0
    const KIND: MessageKind;

    /// Exact encoded size in bytes
    const WIRE_SIZE: usize;

    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Encode into `buf`, returning the number of bytes written
    ///
    /// Fails without touching `buf` when it is shorter than [`Self::WIRE_SIZE`].
    fn encode_into(&self, buf: &mut [u8]) -> Result<usize>;

    /// Decode from `buf`, which must hold at least [`Self::WIRE_SIZE`] bytes
    fn decode(buf: &[u8]) -> Result<Self>;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; Self::WIRE_SIZE];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    fn module_id(&self) -> ModuleId {
        self.metadata().module
    }

    fn target_module_id(&self) -> ModuleId {
        self.metadata().target
    }

    fn time(&self) -> Timestamp {
        self.metadata().time
    }

    fn set_module_id(&mut self, module: ModuleId) {
        self.metadata_mut().module = module;
    }

    fn set_target_module_id(&mut self, target: ModuleId) {
        self.metadata_mut().target = target;
    }

    fn set_time(&mut self, time: Timestamp) {
        self.metadata_mut().time = time;
    }
}

// ----------------------------------------------------------------------------
// Event Request
// ----------------------------------------------------------------------------

/// Subscribe / update / query request on the event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    metadata: Metadata,
    function: u16,
    event: EventId,
    data: [u8; EVENT_REQUEST_DATA_SIZE],
    response_required: bool,
}

impl Default for EventRequest {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(MessageKind::Request),
            function: 0,
            event: EventId::default(),
            data: [0u8; EVENT_REQUEST_DATA_SIZE],
            response_required: false,
        }
    }
}

impl EventRequest {
    /// Create a request from `sender`, addressed to the module owning `event`
    pub fn new(sender: ModuleId, function: ChannelFunction, event: EventId) -> Self {
        let mut request = Self::default();
        request.set_module_id(sender);
        request.set_function(function);
        request.set_event_id(event);
        request
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Result<Self> {
        self.set_payload(payload)?;
        Ok(self)
    }

    pub fn with_response_required(mut self, required: bool) -> Self {
        self.response_required = required;
        self
    }

    pub fn with_target(mut self, target: ModuleId) -> Self {
        self.set_target_module_id(target);
        self
    }

    /// Decoded function, if the raw value is a known one
    pub fn function(&self) -> Option<ChannelFunction> {
        ChannelFunction::from_u16(self.function)
    }

    pub fn function_id(&self) -> u16 {
        self.function
    }

    pub fn set_function(&mut self, function: ChannelFunction) {
        self.function = function.as_u16();
    }

    pub fn set_function_id(&mut self, function: u16) {
        self.function = function;
    }

    pub fn event_id(&self) -> EventId {
        self.event
    }

    /// Set the event and retarget the request at the module owning it
    pub fn set_event_id(&mut self, event: EventId) {
        self.event = event;
        self.metadata.target = event.module();
    }

    pub fn payload(&self) -> &[u8; EVENT_REQUEST_DATA_SIZE] {
        &self.data
    }

    pub fn payload_mut(&mut self) -> &mut [u8; EVENT_REQUEST_DATA_SIZE] {
        &mut self.data
    }

    /// Replace the payload, zero-filling the remainder
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        fill_fixed(&mut self.data, payload)
    }

    pub fn response_required(&self) -> bool {
        self.response_required
    }

    pub fn set_response_required(&mut self, required: bool) {
        self.response_required = required;
    }
}

impl WireMessage for EventRequest {
    const KIND: MessageKind = MessageKind::Request;
    const WIRE_SIZE: usize = METADATA_SIZE + 2 + 2 + EVENT_REQUEST_DATA_SIZE + 1;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = WireWriter::new(buf, Self::WIRE_SIZE)?;
        self.metadata.encode(&mut writer);
        writer.put_u16(self.function);
        writer.put_u16(self.event.as_u16());
        writer.put_bytes(&self.data);
        writer.put_bool(self.response_required);
        Ok(writer.position())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            metadata: Metadata::decode(&mut reader, Self::KIND)?,
            function: reader.u16(),
            event: EventId::new(reader.u16()),
            data: reader.array(),
            response_required: reader.bool(),
        })
    }
}

// ----------------------------------------------------------------------------
// Event Response
// ----------------------------------------------------------------------------

/// Result of an event update or query, also used for subscriber fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResponse {
    metadata: Metadata,
    event: EventId,
    data: [u8; EVENT_RESPONSE_DATA_SIZE],
    error_code: ErrorCode,
    error_message: [u8; ERROR_MESSAGE_SIZE],
}

impl Default for EventResponse {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(MessageKind::Response),
            event: EventId::default(),
            data: [0u8; EVENT_RESPONSE_DATA_SIZE],
            error_code: 0,
            error_message: [0u8; ERROR_MESSAGE_SIZE],
        }
    }
}

impl EventResponse {
    /// Create a response for `event`, sent by `sender`
    pub fn new(sender: ModuleId, event: EventId) -> Self {
        let mut response = Self::default();
        response.set_event_id(event);
        response.set_module_id(sender);
        response
    }

    pub fn event_id(&self) -> EventId {
        self.event
    }

    /// Set the event and retarget the response at the module owning it
    pub fn set_event_id(&mut self, event: EventId) {
        self.event = event;
        self.metadata.target = event.module();
    }

    pub fn payload(&self) -> &[u8; EVENT_RESPONSE_DATA_SIZE] {
        &self.data
    }

    pub fn payload_mut(&mut self) -> &mut [u8; EVENT_RESPONSE_DATA_SIZE] {
        &mut self.data
    }

    /// Replace the payload, zero-filling the remainder
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        fill_fixed(&mut self.data, payload)
    }

    /// Payload read as NUL-terminated text
    pub fn payload_text(&self) -> String {
        fixed_str(&self.data)
    }

    /// Copy as much of the request payload as fits into this response
    pub fn copy_payload_from(&mut self, request: &EventRequest) {
        let len = EVENT_RESPONSE_DATA_SIZE.min(EVENT_REQUEST_DATA_SIZE);
        self.data[..len].copy_from_slice(&request.payload()[..len]);
    }

    /// Pack a list of event numbers into the payload
    pub fn set_event_ids(&mut self, events: &[EventId]) -> Result<()> {
        let needed = events.len() * 2;
        if needed > EVENT_RESPONSE_DATA_SIZE {
            return Err(ModlinkError::buffer_too_small(
                needed,
                EVENT_RESPONSE_DATA_SIZE,
            ));
        }
        self.data.fill(0);
        for (slot, event) in self.data.chunks_exact_mut(2).zip(events) {
            slot.copy_from_slice(&event.as_u16().to_be_bytes());
        }
        Ok(())
    }

    /// Unpack event numbers from a query payload; a zero entry ends the list
    ///
    /// Event id 0 is reserved as the terminator and is never reported.
    pub fn event_ids(&self) -> Vec<EventId> {
        self.data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .take_while(|&id| id != 0)
            .map(EventId::new)
            .collect()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn error_message(&self) -> String {
        fixed_str(&self.error_message)
    }

    pub fn set_error(&mut self, code: ErrorCode, message: &str) {
        self.error_code = code;
        set_fixed_str(&mut self.error_message, message);
    }
}

impl WireMessage for EventResponse {
    const KIND: MessageKind = MessageKind::Response;
    const WIRE_SIZE: usize =
        METADATA_SIZE + 2 + EVENT_RESPONSE_DATA_SIZE + 2 + ERROR_MESSAGE_SIZE;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = WireWriter::new(buf, Self::WIRE_SIZE)?;
        self.metadata.encode(&mut writer);
        writer.put_u16(self.event.as_u16());
        writer.put_bytes(&self.data);
        writer.put_u16(self.error_code);
        writer.put_bytes(&self.error_message);
        Ok(writer.position())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            metadata: Metadata::decode(&mut reader, Self::KIND)?,
            event: EventId::new(reader.u16()),
            data: reader.array(),
            error_code: reader.u16(),
            error_message: reader.array(),
        })
    }
}

// ----------------------------------------------------------------------------
// State Request
// ----------------------------------------------------------------------------

/// Request from a controller asking a module to change state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRequest {
    metadata: Metadata,
    requested: StateId,
}

impl Default for StateRequest {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(MessageKind::Request),
            requested: ModuleState::Standby.id(),
        }
    }
}

impl StateRequest {
    pub fn new(sender: ModuleId, target: ModuleId, state: ModuleState) -> Self {
        let mut request = Self::default();
        request.set_module_id(sender);
        request.set_target_module_id(target);
        request.requested = state.id();
        request
    }

    pub fn requested_state(&self) -> Option<ModuleState> {
        ModuleState::from_id(self.requested)
    }

    pub fn requested_id(&self) -> StateId {
        self.requested
    }

    pub fn set_requested_id(&mut self, state: StateId) {
        self.requested = state;
    }
}

impl WireMessage for StateRequest {
    const KIND: MessageKind = MessageKind::Request;
    const WIRE_SIZE: usize = METADATA_SIZE + 2;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = WireWriter::new(buf, Self::WIRE_SIZE)?;
        self.metadata.encode(&mut writer);
        writer.put_u16(self.requested);
        Ok(writer.position())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            metadata: Metadata::decode(&mut reader, Self::KIND)?,
            requested: reader.u16(),
        })
    }
}

// ----------------------------------------------------------------------------
// State Response
// ----------------------------------------------------------------------------

/// A module's authoritative state after handling a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateResponse {
    metadata: Metadata,
    current: StateId,
    error_code: ErrorCode,
    error_message: [u8; ERROR_MESSAGE_SIZE],
}

impl Default for StateResponse {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(MessageKind::Response),
            current: ModuleState::Standby.id(),
            error_code: 0,
            error_message: [0u8; ERROR_MESSAGE_SIZE],
        }
    }
}

impl StateResponse {
    pub fn new(sender: ModuleId, target: ModuleId, state: ModuleState) -> Self {
        let mut response = Self::default();
        response.set_module_id(sender);
        response.set_target_module_id(target);
        response.current = state.id();
        response
    }

    pub fn current_state(&self) -> Option<ModuleState> {
        ModuleState::from_id(self.current)
    }

    pub fn current_id(&self) -> StateId {
        self.current
    }

    pub fn set_current_state(&mut self, state: ModuleState) {
        self.current = state.id();
    }

    pub fn set_current_id(&mut self, state: StateId) {
        self.current = state;
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn error_message(&self) -> String {
        fixed_str(&self.error_message)
    }

    pub fn set_error(&mut self, code: ErrorCode, message: &str) {
        self.error_code = code;
        set_fixed_str(&mut self.error_message, message);
    }

    pub fn clear_error(&mut self) {
        self.error_code = 0;
        self.error_message.fill(0);
    }
}

impl WireMessage for StateResponse {
    const KIND: MessageKind = MessageKind::Response;
    const WIRE_SIZE: usize = METADATA_SIZE + 2 + 2 + ERROR_MESSAGE_SIZE;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = WireWriter::new(buf, Self::WIRE_SIZE)?;
        self.metadata.encode(&mut writer);
        writer.put_u16(self.current);
        writer.put_u16(self.error_code);
        writer.put_bytes(&self.error_message);
        Ok(writer.position())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            metadata: Metadata::decode(&mut reader, Self::KIND)?,
            current: reader.u16(),
            error_code: reader.u16(),
            error_message: reader.array(),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
