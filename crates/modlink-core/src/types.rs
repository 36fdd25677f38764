//! Core identifier and time types
//!
//! Identifiers are 16-bit on the wire. Newtypes keep module and event
//! numbers from being mixed up in signatures.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Raw state identifier as carried on the wire
pub type StateId = u16;

/// Application-level error code carried in responses
pub type ErrorCode = u16;

/// Number of event slots reserved for each module
pub const EVENTS_PER_MODULE: u16 = 100;

// ----------------------------------------------------------------------------
// Module Identifier
// ----------------------------------------------------------------------------

/// Identifier of one addressable module
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModuleId(u16);

impl ModuleId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Event number `offset` within this module's namespace
    pub const fn event(self, offset: u16) -> EventId {
        EventId(self.0.wrapping_mul(EVENTS_PER_MODULE).wrapping_add(offset))
    }

    /// The reserved "query events" event of this module
    pub const fn query_event(self) -> EventId {
        self.event(0)
    }
}

impl From<u16> for ModuleId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Well-Known Modules
// ----------------------------------------------------------------------------

/// Modules of the ultrasound control system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Module {
    SonolinkInterface = 1,
    MotionControl = 2,
    InputDevice = 3,
    SystemController = 4,
    SafetyMonitor = 5,
    VideoService = 6,
    AudioService = 7,
    SonostationGui = 8,
    UltrasoundInput = 9,
}

impl Module {
    pub const ALL: [Module; 9] = [
        Module::SonolinkInterface,
        Module::MotionControl,
        Module::InputDevice,
        Module::SystemController,
        Module::SafetyMonitor,
        Module::VideoService,
        Module::AudioService,
        Module::SonostationGui,
        Module::UltrasoundInput,
    ];

    pub const fn id(self) -> ModuleId {
        ModuleId(self as u16)
    }

    pub fn from_id(id: ModuleId) -> Option<Self> {
        Self::ALL.iter().copied().find(|module| module.id() == id)
    }
}

impl From<Module> for ModuleId {
    fn from(module: Module) -> Self {
        module.id()
    }
}

// ----------------------------------------------------------------------------
// Event Identifier
// ----------------------------------------------------------------------------

/// Event number, namespaced as `module * 100 + offset`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(u16);

impl EventId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Module that owns this event
    pub const fn module(self) -> ModuleId {
        ModuleId(self.0 / EVENTS_PER_MODULE)
    }

    /// Offset of this event inside its module's namespace
    pub const fn offset(self) -> u16 {
        self.0 % EVENTS_PER_MODULE
    }
}

impl From<u16> for EventId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Event Channel Functions
// ----------------------------------------------------------------------------

/// Operation requested by an event request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ChannelFunction {
    Subscribe = 1,
    Update = 2,
    Query = 3,
}

impl ChannelFunction {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ChannelFunction::Subscribe),
            2 => Some(ChannelFunction::Update),
            3 => Some(ChannelFunction::Query),
            _ => None,
        }
    }

    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// ----------------------------------------------------------------------------
// Module Lifecycle State
// ----------------------------------------------------------------------------

/// Lifecycle state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum ModuleState {
    #[default]
    Standby = 0,
    Initializing = 1,
    Setup = 2,
    Running = 3,
    Error = 4,
    Shutdown = 5,
}

impl ModuleState {
    pub fn from_id(id: StateId) -> Option<Self> {
        match id {
            0 => Some(ModuleState::Standby),
            1 => Some(ModuleState::Initializing),
            2 => Some(ModuleState::Setup),
            3 => Some(ModuleState::Running),
            4 => Some(ModuleState::Error),
            5 => Some(ModuleState::Shutdown),
            _ => None,
        }
    }

    pub const fn id(self) -> StateId {
        self as StateId
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleState::Standby => "Standby",
            ModuleState::Initializing => "Initializing",
            ModuleState::Setup => "Setup",
            ModuleState::Running => "Running",
            ModuleState::Error => "Error",
            ModuleState::Shutdown => "Shutdown",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Time
// ----------------------------------------------------------------------------

/// Milliseconds since the UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

/// Source of send timestamps
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
        )
    }
}
