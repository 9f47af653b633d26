//! Stage ledger and bootstrap state machine
//!
//! The ledger tracks one outcome per stage and only ever moves forward:
//! `NotStarted -> InProgress -> {Succeeded | Failed}`. The state machine is the
//! coarse view of the whole sequence:
//!
//! ```text
//! Idle -> NetworkReady -> ClockSynced -> SecurityReady -> Provisioned
//!      -> SessionActive -> Draining -> Released
//! ```
//!
//! `Failed` is reachable from any non-terminal state and leads only to
//! `Released`.

use crate::error::BootstrapError;

/// The ordered bootstrap stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    AcquireNetwork,
    SynchronizeClock,
    InitializeSecurity,
    ProvisionIdentity,
    EstablishSession,
    SteadyState,
    Release,
}

impl Stage {
    pub const COUNT: usize = 7;

    pub const ALL: [Stage; Self::COUNT] = [
        Stage::AcquireNetwork,
        Stage::SynchronizeClock,
        Stage::InitializeSecurity,
        Stage::ProvisionIdentity,
        Stage::EstablishSession,
        Stage::SteadyState,
        Stage::Release,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AcquireNetwork => "acquire-network",
            Self::SynchronizeClock => "synchronize-clock",
            Self::InitializeSecurity => "initialize-security-context",
            Self::ProvisionIdentity => "provision-identity",
            Self::EstablishSession => "establish-telemetry-session",
            Self::SteadyState => "run-steady-state-loop",
            Self::Release => "release-all",
        }
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StageOutcome {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl StageOutcome {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-stage outcomes for one run of the sequence
#[derive(Debug, Clone, Default)]
pub struct StageLedger {
    outcomes: [StageOutcome; Stage::COUNT],
}

impl StageLedger {
    pub const fn new() -> Self {
        Self {
            outcomes: [StageOutcome::NotStarted; Stage::COUNT],
        }
    }

    pub fn outcome(&self, stage: Stage) -> StageOutcome {
        self.outcomes[stage.index()]
    }

    /// Mark a stage in progress. Fails if it was ever started before.
    pub fn begin(&mut self, stage: Stage) -> Result<(), BootstrapError> {
        let slot = &mut self.outcomes[stage.index()];
        if *slot != StageOutcome::NotStarted {
            return Err(BootstrapError::StageReentered(stage));
        }
        *slot = StageOutcome::InProgress;
        Ok(())
    }

    /// Record the terminal outcome of a stage that is in progress
    pub fn finish(&mut self, stage: Stage, succeeded: bool) -> Result<(), BootstrapError> {
        let slot = &mut self.outcomes[stage.index()];
        if *slot != StageOutcome::InProgress {
            return Err(BootstrapError::InvalidTransition);
        }
        *slot = if succeeded {
            StageOutcome::Succeeded
        } else {
            StageOutcome::Failed
        };
        Ok(())
    }

    /// Stages that were started but never finished (aborted mid-stage)
    pub fn in_progress(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL
            .into_iter()
            .filter(|s| self.outcome(*s) == StageOutcome::InProgress)
    }
}

/// Coarse state of the bootstrap sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootstrapState {
    #[default]
    Idle,
    NetworkReady,
    ClockSynced,
    SecurityReady,
    Provisioned,
    SessionActive,
    Draining,
    Released,
    Failed,
}

impl BootstrapState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released)
    }

    /// Whether `self -> to` is an edge of the state machine
    pub fn can_transition(self, to: BootstrapState) -> bool {
        use BootstrapState::*;
        match (self, to) {
            (Released, _) => false,
            (Failed, Released) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle, NetworkReady)
            | (NetworkReady, ClockSynced)
            | (ClockSynced, SecurityReady)
            | (SecurityReady, Provisioned)
            | (Provisioned, SessionActive)
            | (SessionActive, Draining)
            | (Draining, Released) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, to: BootstrapState) -> Result<(), BootstrapError> {
        if !self.can_transition(to) {
            return Err(BootstrapError::InvalidTransition);
        }
        *self = to;
        Ok(())
    }
}
