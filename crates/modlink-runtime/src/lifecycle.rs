//! Module lifecycle
//!
//! Every module moves through Standby, Initializing, Setup and Running,
//! with Error and Shutdown reachable from anywhere. The controller drives
//! transitions over the state channel; the module's hooks do the actual
//! work and a transition only takes effect when its hook succeeds.
//!
//! | requested    | legal from                     |
//! |--------------|--------------------------------|
//! | Initializing | Standby                        |
//! | Setup        | Initializing, Error, Shutdown  |
//! | Running      | Setup                          |
//! | Error        | any                            |
//! | Shutdown     | any                            |

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use modlink_core::{
    ErrorCode, ModlinkConfig, ModlinkError, ModuleDirectory, ModuleId, ModuleState, Result,
    StateId, StateResponse,
};

use crate::channel::event::EventChannel;
use crate::channel::state::{StateChannel, StateRole};

/// Error code base for a transition that is not legal from the current state
pub const ILLEGAL_TRANSITION_CODE: ErrorCode = 0x0100;

/// Error code base for a transition whose hook failed
pub const HOOK_FAILURE_CODE: ErrorCode = 0x0200;

/// Error code for a request naming no known state
pub const UNKNOWN_STATE_CODE: ErrorCode = 0x0300;

// ----------------------------------------------------------------------------
// Hooks
// ----------------------------------------------------------------------------

/// Module-specific work performed on each state transition
///
/// Hooks run on the state channel's receive loop and should return promptly.
pub trait ModuleHooks: Send + Sync + 'static {
    /// Module-independent checks: hardware confirmation, diagnostics
    fn state_init(&self) -> Result<()>;

    /// Connect to other modules and external hardware
    fn state_setup(&self) -> Result<()>;

    /// Begin normal operation
    fn state_running(&self) -> Result<()>;

    /// Reduce functionality after a fault
    fn state_error(&self) -> Result<()>;

    fn state_shutdown(&self) -> Result<()>;

    /// Called on controller modules for every client state response
    fn on_state_response(&self, _response: &StateResponse) {}
}

// ----------------------------------------------------------------------------
// State Machine
// ----------------------------------------------------------------------------

/// Current lifecycle state and the transition rules
#[derive(Debug)]
pub struct StateMachine {
    state: AtomicU16,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicU16::new(ModuleState::Standby.id()),
        }
    }

    pub fn current(&self) -> ModuleState {
        ModuleState::from_id(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Whether `to` may be requested while in `from`
    pub fn is_legal(from: ModuleState, to: ModuleState) -> bool {
        use ModuleState::*;
        match to {
            Initializing => from == Standby,
            Setup => matches!(from, Initializing | Error | Shutdown),
            Running => from == Setup,
            Error | Shutdown => true,
            Standby => false,
        }
    }

    /// Apply a state request and describe the outcome in `response`
    ///
    /// The response always carries the state the module is in afterwards.
    /// Rejected and failed transitions leave the state unchanged and set a
    /// non-zero error code.
    pub fn handle_request<H>(&self, requested: StateId, hooks: &H, response: &mut StateResponse)
    where
        H: ModuleHooks + ?Sized,
    {
        response.clear_error();
        let current = self.current();

        match ModuleState::from_id(requested) {
            None => {
                warn!(requested, current = %current, "Unknown state requested");
                response.set_error(
                    UNKNOWN_STATE_CODE,
                    &format!("Unknown state requested: {}", requested),
                );
            }
            Some(target) if !Self::is_legal(current, target) => {
                warn!(from = %current, to = %target, "Illegal state transition rejected");
                response.set_error(
                    ILLEGAL_TRANSITION_CODE | requested,
                    &format!("Not in the right state to transition to {}: {}", target, current),
                );
            }
            Some(target) => match Self::run_hook(hooks, target) {
                Ok(()) => {
                    self.state.store(target.id(), Ordering::Release);
                    info!(from = %current, to = %target, "State transition");
                }
                Err(err) => {
                    // The code already marks a hook failure; the message field
                    // keeps only the hook's own reason.
                    let reason = err.to_string();
                    let logged = ModlinkError::hook(target.name(), reason.clone());
                    warn!(from = %current, to = %target, error = %logged, "State hook failed");
                    response.set_error(HOOK_FAILURE_CODE | requested, &reason);
                }
            },
        }

        response.set_current_state(self.current());
    }

    fn run_hook<H: ModuleHooks + ?Sized>(hooks: &H, target: ModuleState) -> Result<()> {
        match target {
            ModuleState::Standby => Ok(()),
            ModuleState::Initializing => hooks.state_init(),
            ModuleState::Setup => hooks.state_setup(),
            ModuleState::Running => hooks.state_running(),
            ModuleState::Error => hooks.state_error(),
            ModuleState::Shutdown => hooks.state_shutdown(),
        }
    }
}

// ----------------------------------------------------------------------------
// Module Lifecycle
// ----------------------------------------------------------------------------

/// A module process: its two channels, its state and its hooks
pub struct ModuleLifecycle<H: ModuleHooks> {
    module: ModuleId,
    hooks: Arc<H>,
    machine: Arc<StateMachine>,
    event_channel: EventChannel,
    state_channel: StateChannel,
}

impl<H: ModuleHooks> ModuleLifecycle<H> {
    /// Create both channels and start serving state requests
    ///
    /// A client announces its initial state to the configured controller.
    /// The event channel stays stopped until [`Self::start`].
    pub async fn new(
        module: ModuleId,
        role: StateRole,
        hooks: Arc<H>,
        directory: Arc<ModuleDirectory>,
        config: &ModlinkConfig,
    ) -> Result<Self> {
        config.validate()?;
        let event_channel =
            EventChannel::new(module, directory.clone(), config.event_channel.clone()).await?;
        let mut state_channel =
            StateChannel::new(module, role, directory, config.state_channel.clone()).await?;
        let machine = Arc::new(StateMachine::new());

        match role {
            StateRole::Client => {
                let machine = machine.clone();
                let hooks = hooks.clone();
                state_channel.add_state_change_callback(move |request, response| {
                    machine.handle_request(request.requested_id(), hooks.as_ref(), response);
                })?;
            }
            StateRole::Server => {
                let hooks = hooks.clone();
                state_channel.add_state_response_callback(move |_, response| {
                    hooks.on_state_response(response);
                })?;
            }
        }
        state_channel.start().await?;

        if role == StateRole::Client && config.lifecycle.announce_on_start {
            let controller = config.lifecycle.controller;
            let announce = StateResponse::new(module, controller, machine.current());
            if let Err(err) = state_channel.send(announce).await {
                warn!(module = %module, controller = %controller, error = %err, "Failed to announce initial state");
            }
        }

        info!(module = %module, role = ?role, "Module lifecycle ready");
        Ok(Self {
            module,
            hooks,
            machine,
            event_channel,
            state_channel,
        })
    }

    /// Start the event channel
    pub async fn start(&mut self) -> Result<()> {
        self.event_channel.start().await
    }

    /// Stop the event channel
    pub async fn stop(&mut self) -> Result<()> {
        self.event_channel.stop().await
    }

    /// Stop both channels
    pub async fn shutdown(&mut self) -> Result<()> {
        let event = self.event_channel.stop().await;
        let state = self.state_channel.stop().await;
        info!(module = %self.module, "Module lifecycle shut down");
        event.and(state)
    }

    pub fn current_state(&self) -> ModuleState {
        self.machine.current()
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    pub fn event_channel(&self) -> &EventChannel {
        &self.event_channel
    }

    pub fn event_channel_mut(&mut self) -> &mut EventChannel {
        &mut self.event_channel
    }

    pub fn state_channel(&self) -> &StateChannel {
        &self.state_channel
    }
}
