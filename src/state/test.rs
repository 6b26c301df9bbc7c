use std::sync::Arc;
use std::thread;

use super::{ProfilingState, ProfilingStateMachine};
use crate::error::Error;

#[test]
fn test_initial_state() {
    let sm = ProfilingStateMachine::new();
    assert_eq!(sm.current_state(), ProfilingState::Uninitialised);
}

#[test]
fn test_legal_walk() {
    let sm = ProfilingStateMachine::new();
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    assert_eq!(sm.current_state(), ProfilingState::NotConnected);
    sm.transition_to(ProfilingState::WaitingForAck).unwrap();
    assert_eq!(sm.current_state(), ProfilingState::WaitingForAck);
    sm.transition_to(ProfilingState::Active).unwrap();
    assert_eq!(sm.current_state(), ProfilingState::Active);
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    assert_eq!(sm.current_state(), ProfilingState::NotConnected);
}

#[test]
fn test_self_transitions() {
    let sm = ProfilingStateMachine::new();
    sm.transition_to(ProfilingState::Uninitialised).unwrap();
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    sm.transition_to(ProfilingState::WaitingForAck).unwrap();
    sm.transition_to(ProfilingState::WaitingForAck).unwrap();
    sm.transition_to(ProfilingState::Active).unwrap();
    sm.transition_to(ProfilingState::Active).unwrap();
}

#[test]
fn test_illegal_transitions() {
    let sm = ProfilingStateMachine::new();

    // Uninitialised cannot jump past NotConnected.
    for target in [ProfilingState::WaitingForAck, ProfilingState::Active] {
        let err = sm.transition_to(target).unwrap_err();
        match err {
            Error::InvalidTransition { from, to } => {
                assert_eq!(from, ProfilingState::Uninitialised);
                assert_eq!(to, target);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(sm.current_state(), ProfilingState::Uninitialised);

    // Once initialized there is no way back to Uninitialised except reset.
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    assert!(sm.transition_to(ProfilingState::Uninitialised).is_err());

    // Active is only reachable from WaitingForAck.
    assert!(sm.transition_to(ProfilingState::Active).is_err());
    assert_eq!(sm.current_state(), ProfilingState::NotConnected);
}

#[test]
fn test_failed_transition_leaves_state() {
    let sm = ProfilingStateMachine::new();
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    sm.transition_to(ProfilingState::WaitingForAck).unwrap();

    // WaitingForAck -> NotConnected is not in the table.
    assert!(sm.transition_to(ProfilingState::NotConnected).is_err());
    assert_eq!(sm.current_state(), ProfilingState::WaitingForAck);
}

#[test]
fn test_reset() {
    let sm = ProfilingStateMachine::new();
    sm.transition_to(ProfilingState::NotConnected).unwrap();
    sm.reset();
    assert_eq!(sm.current_state(), ProfilingState::Uninitialised);
}

#[test]
fn test_concurrent_same_target() {
    // Many threads racing to the same target must all succeed.
    let sm = Arc::new(ProfilingStateMachine::new());
    sm.transition_to(ProfilingState::NotConnected).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sm = Arc::clone(&sm);
            thread::spawn(move || sm.transition_to(ProfilingState::WaitingForAck))
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(sm.current_state(), ProfilingState::WaitingForAck);
}
