//! Scheduler and tick state definitions.

use std::fmt;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, loop not spawned yet.
    Starting,
    /// Loop is running and ticking.
    Running,
    /// Shutdown requested, waiting for the loop to exit.
    ShuttingDown,
    /// Loop has exited.
    Stopped,
}

impl SchedulerState {
    /// Check if scheduled ticks are being fired.
    pub fn is_running(&self) -> bool {
        matches!(self, SchedulerState::Running)
    }

    /// Check if the scheduler is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerState::Stopped)
    }
}

/// Phase of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    /// Refreshing the rate from the providers.
    Fetching,
    /// Running the variant and order cascades.
    Cascading,
    Done,
    /// Rate refresh failed, nothing was cascaded.
    Error,
}

impl TickState {
    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TickState] {
        match self {
            TickState::Idle => &[TickState::Fetching, TickState::Cascading],
            TickState::Fetching => &[TickState::Cascading, TickState::Done, TickState::Error],
            TickState::Cascading => &[TickState::Done],
            TickState::Done => &[],
            TickState::Error => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TickState) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TickState::Done | TickState::Error)
    }
}

impl fmt::Display for TickState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TickState::Idle => "idle",
            TickState::Fetching => "fetching",
            TickState::Cascading => "cascading",
            TickState::Done => "done",
            TickState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Rejected tick state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid tick transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: TickState,
    pub to: TickState,
}

/// Tracks one tick through its phases.
#[derive(Debug)]
pub struct TickMachine {
    state: TickState,
}

impl TickMachine {
    pub fn new() -> Self {
        Self {
            state: TickState::Idle,
        }
    }

    pub fn state(&self) -> TickState {
        self.state
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, next: TickState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

impl Default for TickMachine {
    fn default() -> Self {
        Self::new()
    }
}
