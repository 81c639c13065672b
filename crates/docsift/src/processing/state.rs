//! Run state machine
//!
//! Every control request is checked against [`transition`] before anything is
//! mutated. The table is also what drives [`allowed_actions`], so a UI can
//! enable exactly the buttons that will succeed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Overall batch state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Pause requested, waiting for the next checkpoint
    Pausing,
    Paused,
    /// Stop requested, waiting for the next checkpoint
    Stopping,
    Stopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Pausing => "pausing",
            RunState::Paused => "paused",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Stop,
    Retry,
}

impl ControlAction {
    pub const ALL: [ControlAction; 5] = [
        ControlAction::Start,
        ControlAction::Pause,
        ControlAction::Resume,
        ControlAction::Stop,
        ControlAction::Retry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Stop => "stop",
            ControlAction::Retry => "retry",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == value)
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect of an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to a new state
    To(RunState),
    /// Accepted without a state change
    NoOp,
    /// Reset failed items, then start a batch
    ResetAndStart,
    /// Reset failed items only; the live batch picks them up
    ResetOnly,
}

/// Resolve `action` in state `from`. Never mutates anything.
pub fn transition(from: RunState, action: ControlAction) -> Result<Transition> {
    use ControlAction::*;
    use RunState::*;

    let result = match (from, action) {
        (Idle | Stopped, Start) => Transition::To(Running),
        (Idle | Stopped, Retry) => Transition::ResetAndStart,
        (_, Retry) => Transition::ResetOnly,

        (Running, Pause) => Transition::To(Pausing),
        (Pausing | Paused, Pause) => Transition::NoOp,

        (Paused, Resume) => Transition::To(Running),

        (Running | Pausing | Paused, Stop) => Transition::To(Stopping),
        (Stopping, Stop) => Transition::NoOp,

        (state, action) => return Err(Error::InvalidTransition { state, action }),
    };

    Ok(result)
}

/// Actions [`transition`] accepts in `state`
pub fn allowed_actions(state: RunState) -> Vec<ControlAction> {
    ControlAction::ALL
        .into_iter()
        .filter(|a| transition(state, *a).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControlAction::*;

    #[test]
    fn test_allowed_actions_table() {
        assert_eq!(allowed_actions(RunState::Idle), vec![Start, Retry]);
        assert_eq!(allowed_actions(RunState::Running), vec![Pause, Stop, Retry]);
        assert_eq!(allowed_actions(RunState::Pausing), vec![Pause, Stop, Retry]);
        assert_eq!(allowed_actions(RunState::Paused), vec![Pause, Resume, Stop, Retry]);
        assert_eq!(allowed_actions(RunState::Stopping), vec![Stop, Retry]);
        assert_eq!(allowed_actions(RunState::Stopped), vec![Start, Retry]);
    }

    #[test]
    fn test_transitions() {
        assert_eq!(
            transition(RunState::Running, Pause).unwrap(),
            Transition::To(RunState::Pausing)
        );
        assert_eq!(
            transition(RunState::Paused, Resume).unwrap(),
            Transition::To(RunState::Running)
        );
        assert_eq!(transition(RunState::Stopping, Stop).unwrap(), Transition::NoOp);
        assert_eq!(
            transition(RunState::Stopped, Retry).unwrap(),
            Transition::ResetAndStart
        );
        assert_eq!(transition(RunState::Running, Retry).unwrap(), Transition::ResetOnly);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        for (state, action) in [
            (RunState::Idle, Pause),
            (RunState::Idle, Resume),
            (RunState::Idle, Stop),
            (RunState::Running, Start),
            (RunState::Running, Resume),
            (RunState::Pausing, Resume),
            (RunState::Stopping, Pause),
            (RunState::Stopped, Stop),
        ] {
            assert!(matches!(
                transition(state, action),
                Err(Error::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(ControlAction::parse("resume"), Some(Resume));
        assert_eq!(ControlAction::parse("explode"), None);
    }
}
