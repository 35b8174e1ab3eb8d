//! Proposed side-effecting action. Nothing is ever performed here; the stage
//! only describes the action and asks the consent provider about it.

use async_trait::async_trait;
use pathfinder_core::{ActionStatus, PendingAction, StageId};
use std::time::Duration;

use crate::adapters::{invoke, ConsentRequest};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::state::{ExecutionState, StageUpdate, StateKey};

/// Permission scopes an action kind needs.
pub fn scopes_for(kind: &str) -> Vec<String> {
    match kind {
        "send_email" => vec!["email.send".to_string()],
        "calendar_invite" => vec!["calendar.events.write".to_string()],
        other => vec![format!("{}.execute", other)],
    }
}

fn describe(state: &ExecutionState, kind: &str, status: ActionStatus) -> PendingAction {
    let activity = state.intent.activity.as_deref().unwrap_or("the outing");
    let justification = match state.ranked.first() {
        Some(top) => format!(
            "Share {} and {} other option(s) for {} with the group",
            top.name,
            state.ranked.len() - 1,
            activity
        ),
        None => format!("Tell the group no venue was found for {}", activity),
    };
    PendingAction {
        kind: kind.to_string(),
        justification,
        scopes: scopes_for(kind),
        draft: state.draft.clone(),
        status,
    }
}

pub struct ActionStage {
    timeout: Duration,
}

impl ActionStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for ActionStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Action, Granularity::PerRun, self.timeout)
            .reads(&[StateKey::Intent, StateKey::Synthesis])
            .writes(&[StateKey::Action])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let state = input.state;
        let Some(kind) = state.intent.requested_action.as_deref() else {
            return Ok(StageOutput::completed(StageUpdate::Action(None)));
        };
        let mut action = describe(state, kind, ActionStatus::AwaitingConsent);
        let Some(user_id) = state.request.user_id.clone() else {
            return Ok(StageOutput::completed(StageUpdate::Action(Some(action))));
        };

        let request = ConsentRequest {
            user_id,
            action: action.kind.clone(),
            scopes: action.scopes.clone(),
        };
        let decision = invoke(input.capabilities.consent.as_ref(), &request, input.call_timeout()).await?;
        if decision.authorized {
            action.status = ActionStatus::Authorized;
        }
        Ok(StageOutput::completed(StageUpdate::Action(Some(action))))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        let state = input.state;
        StageUpdate::Action(
            state
                .intent
                .requested_action
                .as_deref()
                .map(|kind| describe(state, kind, ActionStatus::AwaitingConsent)),
        )
    }
}
