//! Release state machine
//!
//! Tracks the phase of a single `deploy` call. Blue/green releases walk
//! `Staging -> HealthChecking -> Activating -> (Draining ->) Completed`;
//! standard releases walk `Replacing -> Verifying -> Completed`. Any active
//! phase may fail.

use serde::{Deserialize, Serialize};

/// Release strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Stop the active unit, then start its replacement
    Standard,
    /// Start a staging unit, health-gate it, then swap names
    BlueGreen,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Standard => f.write_str("standard"),
            Strategy::BlueGreen => f.write_str("blue/green"),
        }
    }
}

/// Release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    /// Nothing has happened yet
    Pending,

    /// Creating the staging unit
    Staging,

    /// Waiting for the staging unit to become healthy
    HealthChecking,

    /// Moving the staging unit into the active slot
    Activating,

    /// Letting the displaced unit drain before removal
    Draining,

    /// Stopping the active unit and starting its replacement
    Replacing,

    /// Checking the replacement is running
    Verifying,

    /// Release finished
    Completed,

    /// Release aborted
    Failed,
}

/// Release event
#[derive(Debug, Clone)]
pub enum ReleaseEvent {
    /// Start a release with the given strategy
    Begin(Strategy),

    /// Staging unit created
    StagingStarted,

    /// Staging unit passed its health gate
    HealthPassed,

    /// Staging unit took the active name with no previous unit to displace
    FirstActivation,

    /// Previous active unit renamed aside, staging unit is now active
    Swapped,

    /// Displaced unit removed
    Drained,

    /// Replacement unit created
    Started,

    /// Replacement unit confirmed running
    Verified,

    /// The current phase failed
    Fail(String),

    /// Back to pending
    Reset,
}

/// Release FSM
#[derive(Debug, Clone)]
pub struct ReleaseFsm {
    state: ReleaseState,
    strategy: Option<Strategy>,
    error: Option<String>,
    history: Vec<ReleaseState>,
}

impl ReleaseFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: ReleaseState::Pending,
            strategy: None,
            error: None,
            history: vec![ReleaseState::Pending],
        }
    }

    /// Get current state
    pub fn state(&self) -> ReleaseState {
        self.state
    }

    /// Strategy of the current or last release
    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[ReleaseState] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ReleaseState::Completed | ReleaseState::Failed)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReleaseEvent) -> Result<(), String> {
        use ReleaseState::*;

        let new_state = match (self.state, &event) {
            (Pending, ReleaseEvent::Begin(strategy)) => {
                self.strategy = Some(*strategy);
                self.error = None;
                match strategy {
                    Strategy::BlueGreen => Staging,
                    Strategy::Standard => Replacing,
                }
            }

            // Blue/green
            (Staging, ReleaseEvent::StagingStarted) => HealthChecking,
            (HealthChecking, ReleaseEvent::HealthPassed) => Activating,
            (Activating, ReleaseEvent::FirstActivation) => Completed,
            (Activating, ReleaseEvent::Swapped) => Draining,
            (Draining, ReleaseEvent::Drained) => Completed,

            // Standard
            (Replacing, ReleaseEvent::Started) => Verifying,
            (Verifying, ReleaseEvent::Verified) => Completed,

            (Staging | HealthChecking | Activating | Replacing | Verifying, ReleaseEvent::Fail(err)) => {
                self.error = Some(err.clone());
                Failed
            }

            (Completed | Failed, ReleaseEvent::Reset) => {
                self.error = None;
                self.strategy = None;
                Pending
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(())
    }
}

impl Default for ReleaseFsm {
    fn default() -> Self {
        Self::new()
    }
}
