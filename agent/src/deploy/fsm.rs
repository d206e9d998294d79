//! Finite state machine for deployment state transitions

use api_models::models::DeploymentState;

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Begin starting (also used for updates)
    Start,

    /// Begin stopping
    Stop,

    /// The in-flight executor call returned successfully
    Succeeded,

    /// The in-flight executor call failed
    Failed(String),
}

/// Deployment FSM
///
/// Mirrors the remote state for the lifetime of one action. The initial
/// state is whatever the control plane reported, possibly nothing this
/// agent recognises.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: Option<DeploymentState>,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create an FSM starting from the remote state
    pub fn new(initial: Option<DeploymentState>) -> Self {
        Self {
            state: initial,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> Option<DeploymentState> {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and return the state to publish
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentState, String> {
        let new_state = match (self.state, &event) {
            // Begin from anywhere
            (_, DeploymentEvent::Start) => {
                self.error = None;
                DeploymentState::Starting
            }
            (_, DeploymentEvent::Stop) => {
                self.error = None;
                DeploymentState::Stopping
            }

            // From Starting
            (Some(DeploymentState::Starting), DeploymentEvent::Succeeded) => DeploymentState::Started,

            // From Stopping
            (Some(DeploymentState::Stopping), DeploymentEvent::Succeeded) => DeploymentState::Stopped,

            // Failures while in flight
            (
                Some(DeploymentState::Starting | DeploymentState::Stopping),
                DeploymentEvent::Failed(err),
            ) => {
                self.error = Some(err.clone());
                DeploymentState::Error
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = Some(new_state);
        Ok(new_state)
    }

    /// Whether an executor call is in flight
    pub fn in_progress(&self) -> bool {
        matches!(
            self.state,
            Some(DeploymentState::Starting | DeploymentState::Stopping)
        )
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new(None)
    }
}
