//! Veto / retry state machine.
//!
//! ```text
//! Evaluating -> Accepted
//! Evaluating -> Vetoed -> Retrying -> Evaluating   (bounded)
//!                      -> Exhausted
//! ```

use pathfinder_core::RiskAssessment;
use std::fmt;
use tracing::info;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VetoState {
    Evaluating,
    Accepted,
    Vetoed,
    Retrying,
    /// Retry budget spent; the best surviving candidates are returned
    Exhausted,
}

impl VetoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evaluating => "evaluating",
            Self::Accepted => "accepted",
            Self::Vetoed => "vetoed",
            Self::Retrying => "retrying",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted)
    }
}

impl fmt::Display for VetoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct VetoStateMachine;

impl VetoStateMachine {
    pub fn validate_transition(from: &VetoState, to: &VetoState) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &VetoState) -> Vec<VetoState> {
        match from {
            VetoState::Evaluating => vec![VetoState::Accepted, VetoState::Vetoed],
            VetoState::Vetoed => vec![VetoState::Retrying, VetoState::Exhausted],
            VetoState::Retrying => vec![VetoState::Evaluating],
            VetoState::Accepted | VetoState::Exhausted => vec![],
        }
    }

    pub fn can_transition(from: &VetoState, to: &VetoState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}

/// Decide whether the risk pass vetoes the current ranking.
///
/// `top` is the assessment of the top-ranked candidate, `viable` the number of
/// candidates left after risk filtering.
pub fn veto_reason(top: Option<&RiskAssessment>, viable: usize, floor: usize) -> Option<String> {
    if let Some(assessment) = top.filter(|a| a.is_dealbreaker()) {
        return Some(format!(
            "top-ranked venue has a dealbreaker: {}",
            assessment.warning()
        ));
    }
    if viable < floor {
        return Some(format!(
            "only {} viable venue(s) left, need at least {}",
            viable, floor
        ));
    }
    None
}

/// Tracks evaluation attempts and the veto state for one request.
#[derive(Debug, Clone)]
pub struct RetryController {
    state: VetoState,
    /// Evaluation attempts started, including the first
    attempts: u32,
    retries: u32,
    max_retries: u32,
    reason: Option<String>,
}

impl RetryController {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: VetoState::Evaluating,
            attempts: 1,
            retries: 0,
            max_retries,
            reason: None,
        }
    }

    pub fn state(&self) -> VetoState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Reason of the most recent veto.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == VetoState::Exhausted
    }

    fn transition(&mut self, to: VetoState) -> Result<()> {
        VetoStateMachine::validate_transition(&self.state, &to)?;
        info!(
            from = %self.state,
            to = %to,
            attempt = self.attempts,
            "Veto state transition"
        );
        self.state = to;
        Ok(())
    }

    pub fn accept(&mut self) -> Result<()> {
        self.transition(VetoState::Accepted)
    }

    pub fn veto(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(VetoState::Vetoed)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Leave `Vetoed`: retry while budget and time remain, else exhaust.
    pub fn resolve_veto(&mut self, has_time: bool) -> Result<VetoState> {
        if self.retries < self.max_retries && has_time {
            self.transition(VetoState::Retrying)?;
            self.retries += 1;
        } else {
            self.transition(VetoState::Exhausted)?;
        }
        Ok(self.state)
    }

    /// Start the next evaluation attempt after `Retrying`.
    pub fn begin_attempt(&mut self) -> Result<u32> {
        if self.retries > self.max_retries {
            return Err(OrchestratorError::RetryBoundExceeded {
                max: self.max_retries,
            });
        }
        self.transition(VetoState::Evaluating)?;
        self.attempts += 1;
        Ok(self.attempts)
    }
}
