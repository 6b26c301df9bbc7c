//! Lifecycle state of the profiling pipeline.
//!
//! The pipeline moves through four states: it starts [`Uninitialised`],
//! becomes [`NotConnected`] once initialized, enters [`WaitingForAck`] when a
//! connection to the monitor has been obtained, and [`Active`] once the
//! monitor acknowledges the stream. Teardown returns it to [`NotConnected`].
//!
//! [`Uninitialised`]: ProfilingState::Uninitialised
//! [`NotConnected`]: ProfilingState::NotConnected
//! [`WaitingForAck`]: ProfilingState::WaitingForAck
//! [`Active`]: ProfilingState::Active

#[cfg(test)]
mod test;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ProfilingState {
    /// Initial state, nothing has been set up yet.
    Uninitialised = 0,

    /// Initialized but without a connection to the monitor.
    NotConnected = 1,

    /// A connection is open, the stream-metadata packet is on its way out and
    /// the pipeline waits for the monitor's acknowledgement.
    WaitingForAck = 2,

    /// Handshake complete, commands are dispatched and packets flow.
    Active = 3,
}

impl ProfilingState {
    pub fn name(self) -> &'static str {
        match self {
            ProfilingState::Uninitialised => "Uninitialised",
            ProfilingState::NotConnected => "NotConnected",
            ProfilingState::WaitingForAck => "WaitingForAck",
            ProfilingState::Active => "Active",
        }
    }

    fn from_u32(raw: u32) -> ProfilingState {
        match raw {
            0 => ProfilingState::Uninitialised,
            1 => ProfilingState::NotConnected,
            2 => ProfilingState::WaitingForAck,
            _ => ProfilingState::Active,
        }
    }

    /// States a transition to `self` is permitted from.
    fn permitted_predecessors(self) -> &'static [ProfilingState] {
        match self {
            ProfilingState::Uninitialised => &[ProfilingState::Uninitialised],
            ProfilingState::NotConnected => &[
                ProfilingState::Uninitialised,
                ProfilingState::NotConnected,
                ProfilingState::Active,
            ],
            ProfilingState::WaitingForAck => {
                &[ProfilingState::NotConnected, ProfilingState::WaitingForAck]
            }
            ProfilingState::Active => &[ProfilingState::WaitingForAck, ProfilingState::Active],
        }
    }
}

impl fmt::Display for ProfilingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic lifecycle state with a legal-transition guard.
///
/// The state is a single [`AtomicU32`]; transitions are one compare-and-swap
/// per attempt, retried when another thread moves the state under us. A
/// concurrent transition to the *same* target is accepted, a transition to an
/// illegal target fails with [`Error::InvalidTransition`].
pub struct ProfilingStateMachine {
    state: AtomicU32,
}

impl ProfilingStateMachine {
    pub fn new() -> ProfilingStateMachine {
        ProfilingStateMachine {
            state: AtomicU32::new(ProfilingState::Uninitialised as u32),
        }
    }

    pub fn current_state(&self) -> ProfilingState {
        ProfilingState::from_u32(self.state.load(Ordering::Acquire))
    }

    /// Moves the state machine to `target`.
    ///
    /// Succeeds only when the observed state is a permitted predecessor of
    /// `target` per the transition table. The release ordering on success
    /// makes everything the caller wrote before publishing a state visible to
    /// readers that observe it.
    pub fn transition_to(&self, target: ProfilingState) -> Result<()> {
        let mut observed = self.current_state();
        loop {
            if !target.permitted_predecessors().contains(&observed) {
                return Err(Error::InvalidTransition {
                    from: observed,
                    to: target,
                });
            }
            match self.state.compare_exchange(
                observed as u32,
                target as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                // Raced with another thread, re-validate against what it set.
                Err(raw) => observed = ProfilingState::from_u32(raw),
            }
        }
    }

    /// Forces the state back to [`ProfilingState::Uninitialised`].
    ///
    /// Only valid from a quiescent configuration, with no worker threads
    /// running; the service enforces that before calling.
    pub fn reset(&self) {
        self.state
            .store(ProfilingState::Uninitialised as u32, Ordering::Release);
    }
}

impl Default for ProfilingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
