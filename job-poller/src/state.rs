use serde::Serialize;
use state_machines::state_machine;

use crate::error::PollerError;

/// Phase of a client session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Upload,
    Loading,
    Viewer,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Upload => "upload",
            SessionState::Loading => "loading",
            SessionState::Viewer => "viewer",
            SessionState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SessionTransition {
    Start,
    Complete,
    Fail,
    Reset,
}

impl SessionTransition {
    fn as_str(&self) -> &'static str {
        match self {
            SessionTransition::Start => "start",
            SessionTransition::Complete => "complete",
            SessionTransition::Fail => "fail",
            SessionTransition::Reset => "reset",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: SessionLifecycleMachine,
        initial: Upload,
        states: [Upload, Loading, Viewer, Errored],
        events {
            start {
                transition: { from: Upload, to: Loading }
            }
            complete {
                transition: { from: Loading, to: Viewer }
            }
            fail {
                transition: { from: Loading, to: Errored }
            }
            reset {
                transition: { from: Loading, to: Upload }
                transition: { from: Viewer, to: Upload }
                transition: { from: Errored, to: Upload }
            }
        }
    }

    pub(super) fn upload() -> SessionLifecycleMachine<(), Upload> {
        SessionLifecycleMachine::new(())
    }
}

fn invalid_transition(state: SessionState, event: SessionTransition) -> PollerError {
    PollerError::InvalidTransition(format!("{} -> {}", state.as_str(), event.as_str()))
}

/// Validates `event` against the session lifecycle and returns the next state.
pub(crate) fn compute_next_state(
    state: SessionState,
    event: SessionTransition,
) -> Result<SessionState, PollerError> {
    use lifecycle::upload;
    let invalid = || invalid_transition(state, event);

    match (state, event) {
        (SessionState::Upload, SessionTransition::Start) => upload()
            .start()
            .map(|_| SessionState::Loading)
            .map_err(|_| invalid()),
        (SessionState::Loading, SessionTransition::Complete) => upload()
            .start()
            .map_err(|_| invalid())?
            .complete()
            .map(|_| SessionState::Viewer)
            .map_err(|_| invalid()),
        (SessionState::Loading, SessionTransition::Fail) => upload()
            .start()
            .map_err(|_| invalid())?
            .fail()
            .map(|_| SessionState::Error)
            .map_err(|_| invalid()),
        (SessionState::Loading, SessionTransition::Reset) => upload()
            .start()
            .map_err(|_| invalid())?
            .reset()
            .map(|_| SessionState::Upload)
            .map_err(|_| invalid()),
        (SessionState::Viewer, SessionTransition::Reset) => upload()
            .start()
            .map_err(|_| invalid())?
            .complete()
            .map_err(|_| invalid())?
            .reset()
            .map(|_| SessionState::Upload)
            .map_err(|_| invalid()),
        (SessionState::Error, SessionTransition::Reset) => upload()
            .start()
            .map_err(|_| invalid())?
            .fail()
            .map_err(|_| invalid())?
            .reset()
            .map(|_| SessionState::Upload)
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
