//! Playback state machine.
//!
//! Which transport operations touch the engine, which change the state, and
//! which event they emit is decided here by table lookup. Commands that are
//! not valid in the current state still emit their nominal event, so hosts
//! that fire commands blindly see the same stream they always did.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

use super::EventState;

/// Lifecycle state of the playback session.
///
/// `Idle → Loading → Playing ⇄ Paused → Stopped | Completed`. A new `start`
/// re-enters `Loading` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Completed,
}

/// Transport operations subject to the state guard.
///
/// `start` is absent: it is accepted in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Pause,
    Resume,
    Seek,
    Stop,
    Next,
    Previous,
    /// The engine reached the end of the track.
    Complete,
    /// The engine failed asynchronously.
    Fail,
}

/// Outcome of applying a [`Transport`] operation to a [`PlaybackState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// New state, if the operation changes it.
    pub next: Option<PlaybackState>,
    /// Whether the live engine session must be driven.
    pub drives_engine: bool,
    /// Event to emit afterwards.
    pub emits: Option<EventState>,
}

impl Transition {
    const fn to(next: PlaybackState, emits: EventState) -> Self {
        Self {
            next: Some(next),
            drives_engine: true,
            emits: Some(emits),
        }
    }

    const fn drive(emits: EventState) -> Self {
        Self {
            next: None,
            drives_engine: true,
            emits: Some(emits),
        }
    }

    const fn emit(emits: EventState) -> Self {
        Self {
            next: None,
            drives_engine: false,
            emits: Some(emits),
        }
    }

    const fn ignore() -> Self {
        Self {
            next: None,
            drives_engine: false,
            emits: None,
        }
    }
}

impl PlaybackState {
    /// Look up what `op` does in this state.
    pub const fn on(self, op: Transport) -> Transition {
        use EventState as E;
        use PlaybackState as S;
        use Transport as T;

        match (self, op) {
            (_, T::Next) => Transition::emit(E::Next),
            (_, T::Previous) => Transition::emit(E::Previous),

            (S::Playing, T::Pause) => Transition::to(S::Paused, E::Paused),
            (S::Playing, T::Resume) => Transition::emit(E::Playing),
            (S::Playing, T::Seek) => Transition::drive(E::Playing),
            (S::Playing, T::Stop) => Transition::to(S::Stopped, E::Stopped),
            (S::Playing, T::Complete) => Transition::to(S::Completed, E::Completed),
            (S::Playing | S::Paused, T::Fail) => Transition::to(S::Stopped, E::Stopped),

            (S::Paused, T::Pause) => Transition::emit(E::Paused),
            (S::Paused, T::Resume) => Transition::to(S::Playing, E::Playing),
            (S::Paused, T::Seek) => Transition::drive(E::Paused),
            (S::Paused, T::Stop) => Transition::to(S::Stopped, E::Stopped),

            // No live engine: tolerate the call and emit its nominal event.
            (_, T::Pause | T::Seek) => Transition::emit(E::Paused),
            (_, T::Resume) => Transition::emit(E::Playing),
            (_, T::Stop) => Transition::emit(E::Stopped),
            (_, T::Complete | T::Fail) => Transition::ignore(),
        }
    }

    /// Whether a live engine session backs this state.
    pub const fn has_engine(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    /// Wire name of this state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_STATES: [PlaybackState; 6] = [
        PlaybackState::Idle,
        PlaybackState::Loading,
        PlaybackState::Playing,
        PlaybackState::Paused,
        PlaybackState::Stopped,
        PlaybackState::Completed,
    ];

    fn apply(state: PlaybackState, op: Transport) -> PlaybackState {
        state.on(op).next.unwrap_or(state)
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
    }

    #[test]
    fn test_pause_resume_edges() {
        let paused = PlaybackState::Playing.on(Transport::Pause);
        assert_eq!(paused.next, Some(PlaybackState::Paused));
        assert!(paused.drives_engine);
        assert_eq!(paused.emits, Some(EventState::Paused));

        let resumed = PlaybackState::Paused.on(Transport::Resume);
        assert_eq!(resumed.next, Some(PlaybackState::Playing));
        assert_eq!(resumed.emits, Some(EventState::Playing));
    }

    #[test]
    fn test_pause_when_paused_still_emits() {
        let t = PlaybackState::Paused.on(Transport::Pause);
        assert_eq!(t.next, None);
        assert!(!t.drives_engine);
        assert_eq!(t.emits, Some(EventState::Paused));
    }

    #[test]
    fn test_idle_commands_are_noops_with_events() {
        for op in [Transport::Pause, Transport::Resume, Transport::Seek, Transport::Stop] {
            let t = PlaybackState::Idle.on(op);
            assert_eq!(t.next, None, "{op:?}");
            assert!(!t.drives_engine, "{op:?}");
            assert!(t.emits.is_some(), "{op:?}");
        }
    }

    #[test]
    fn test_completion_only_from_playing() {
        assert_eq!(
            PlaybackState::Playing.on(Transport::Complete).next,
            Some(PlaybackState::Completed)
        );
        assert_eq!(PlaybackState::Paused.on(Transport::Complete), Transition::ignore());
        assert_eq!(PlaybackState::Idle.on(Transport::Complete), Transition::ignore());
    }

    #[test]
    fn test_stop_from_live_states() {
        for state in [PlaybackState::Playing, PlaybackState::Paused] {
            let t = state.on(Transport::Stop);
            assert_eq!(t.next, Some(PlaybackState::Stopped));
            assert!(t.drives_engine);
            assert_eq!(t.emits, Some(EventState::Stopped));
        }
    }

    #[test]
    fn test_next_previous_never_change_state() {
        for state in ALL_STATES {
            assert_eq!(state.on(Transport::Next).next, None);
            assert_eq!(state.on(Transport::Previous).next, None);
            assert_eq!(state.on(Transport::Next).emits, Some(EventState::Next));
        }
    }

    #[test]
    fn test_has_engine() {
        assert!(PlaybackState::Playing.has_engine());
        assert!(PlaybackState::Paused.has_engine());
        assert!(!PlaybackState::Stopped.has_engine());
        assert!(!PlaybackState::Idle.has_engine());
    }

    fn state_strategy() -> impl Strategy<Value = PlaybackState> {
        proptest::sample::select(ALL_STATES.to_vec())
    }

    proptest! {
        #[test]
        fn prop_seek_never_changes_state(state in state_strategy()) {
            prop_assert_eq!(state.on(Transport::Seek).next, None);
        }

        #[test]
        fn prop_seek_emits_matching_state(state in state_strategy()) {
            let emitted = state.on(Transport::Seek).emits;
            let expected = if state == PlaybackState::Playing {
                EventState::Playing
            } else {
                EventState::Paused
            };
            prop_assert_eq!(emitted, Some(expected));
        }

        #[test]
        fn prop_pause_resume_alternates(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut state = PlaybackState::Playing;
            for pause in ops {
                let op = if pause { Transport::Pause } else { Transport::Resume };
                state = apply(state, op);
                let expected = if pause { PlaybackState::Paused } else { PlaybackState::Playing };
                prop_assert_eq!(state, expected);
            }
        }
    }
}
