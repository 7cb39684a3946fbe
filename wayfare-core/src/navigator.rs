use crate::draft::{BookingDraft, FormFields};
use crate::listeners::{Listener, Listeners, SubscriptionId};
use crate::step::{StepDefinition, StepRegistry, ValidationResult};
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wayfare_shared::WizardEvent;

/// Position of a wizard in its flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "index", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardState {
    Step(usize),
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("Cannot open step {requested}: step '{missing}' is not completed")]
    OutOfOrder { requested: usize, missing: String },

    #[error("Step index {requested} is out of range ({step_count} steps)")]
    OutOfRange { requested: usize, step_count: usize },

    #[error("Submission is only allowed from the last step")]
    NotOnLastStep,

    #[error("Draft {0} has already been submitted")]
    AlreadySubmitted(Uuid),

    #[error("A submission is already in progress")]
    SubmissionPending,

    #[error("Wizard session has been closed")]
    SessionClosed,
}

impl NavigationError {
    /// Message safe to show to the guest
    pub fn user_message(&self) -> &'static str {
        match self {
            NavigationError::OutOfOrder { .. } | NavigationError::OutOfRange { .. } => {
                "Please complete the previous steps first."
            }
            NavigationError::NotOnLastStep => "Please review all steps before submitting.",
            NavigationError::AlreadySubmitted(_) => "This booking has already been submitted.",
            NavigationError::SubmissionPending => "Your booking is being submitted, please wait.",
            NavigationError::SessionClosed => "This booking session has ended.",
        }
    }
}

/// Step-by-step controller over one [`BookingDraft`].
///
/// Owns the draft and all transitions: forward moves are gated by the current
/// step's validation, backward moves never are, and jumps require every
/// earlier step to have been completed. Every mutation is reported to the
/// subscribed listeners.
pub struct StepNavigator {
    registry: Arc<StepRegistry>,
    draft: BookingDraft,
    submitted: bool,
    listeners: Listeners,
}

impl StepNavigator {
    pub fn new(registry: Arc<StepRegistry>, draft: BookingDraft) -> CoreResult<Self> {
        if draft.current_step_index >= registry.len() {
            return Err(CoreError::InvalidDraft(format!(
                "step index {} outside of {} steps",
                draft.current_step_index,
                registry.len()
            )));
        }
        if let Some(unknown) = draft
            .completed_steps
            .iter()
            .find(|id| registry.index_of(id).is_none())
        {
            return Err(CoreError::InvalidDraft(format!("unknown completed step '{unknown}'")));
        }

        Ok(Self {
            registry,
            draft,
            submitted: false,
            listeners: Listeners::new(),
        })
    }

    /// Start a fresh draft at the first step
    pub fn start(registry: Arc<StepRegistry>, flow: &str, defaults: FormFields) -> Self {
        Self {
            registry,
            draft: BookingDraft::with_defaults(flow, defaults),
            submitted: false,
            listeners: Listeners::new(),
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    pub fn draft_id(&self) -> Uuid {
        self.draft.id
    }

    pub fn fields(&self) -> &FormFields {
        &self.draft.fields
    }

    pub fn state(&self) -> WizardState {
        if self.submitted {
            WizardState::Submitted
        } else {
            WizardState::Step(self.draft.current_step_index)
        }
    }

    pub fn current_index(&self) -> usize {
        self.draft.current_step_index
    }

    pub fn current_step(&self) -> &StepDefinition {
        // The index is kept within bounds by every transition
        &self.registry.steps()[self.draft.current_step_index]
    }

    pub fn step_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_last_step(&self) -> bool {
        self.draft.current_step_index == self.registry.last_index()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Forward an externally produced event (price previews, submission
    /// progress) to this navigator's listeners
    pub fn notify(&self, event: &WizardEvent) {
        self.listeners.emit(event);
    }

    /// Set one field. Returns whether the stored value changed.
    pub fn set_field(&mut self, key: &str, value: Value) -> Result<bool, NavigationError> {
        self.ensure_open()?;
        let changed = self.draft.fields.insert(key, value);
        if changed {
            self.draft.touch();
            self.notify(&WizardEvent::FieldChanged {
                draft_id: self.draft.id,
                key: key.to_string(),
            });
        }
        Ok(changed)
    }

    pub fn clear_field(&mut self, key: &str) -> Result<bool, NavigationError> {
        self.set_field(key, Value::Null)
    }

    /// Merge a batch of edits, returning the keys that changed
    pub fn merge_fields(&mut self, patch: FormFields) -> Result<Vec<String>, NavigationError> {
        self.ensure_open()?;
        let changed = self.draft.fields.merge(patch);
        if !changed.is_empty() {
            self.draft.touch();
        }
        for key in &changed {
            self.notify(&WizardEvent::FieldChanged {
                draft_id: self.draft.id,
                key: key.clone(),
            });
        }
        Ok(changed)
    }

    pub fn validate_current(&self) -> ValidationResult {
        self.current_step().validate(&self.draft.fields)
    }

    /// First step (by index) whose validation currently fails
    pub fn first_invalid_step(&self) -> Option<(usize, ValidationResult)> {
        self.registry
            .steps()
            .iter()
            .enumerate()
            .map(|(index, step)| (index, step.validate(&self.draft.fields)))
            .find(|(_, result)| !result.is_valid())
    }

    /// Validate the current step and advance if it passes.
    ///
    /// On the last step a passing validation only marks the step completed.
    pub fn go_next(&mut self) -> Result<ValidationResult, NavigationError> {
        self.ensure_open()?;
        let step = self.current_step().clone();
        let result = step.validate(&self.draft.fields);

        if !result.is_valid() {
            debug!(
                draft_id = %self.draft.id,
                step = %step.id,
                errors = result.field_errors.len(),
                "Step validation failed"
            );
            self.notify(&WizardEvent::ValidationFailed {
                draft_id: self.draft.id,
                step_id: step.id.clone(),
                field_errors: result.field_errors.clone(),
            });
            return Ok(result);
        }

        self.draft.completed_steps.insert(step.id.clone());
        if !self.is_last_step() {
            let from = self.draft.current_step_index;
            self.move_to(from + 1);
        } else {
            self.draft.touch();
        }
        Ok(result)
    }

    /// Step back one page; never validates
    pub fn go_back(&mut self) -> Result<usize, NavigationError> {
        self.ensure_open()?;
        let index = self.draft.current_step_index;
        if index > 0 {
            self.move_to(index - 1);
        }
        Ok(self.draft.current_step_index)
    }

    /// Jump to any step whose predecessors are all completed
    pub fn go_to_step(&mut self, index: usize) -> Result<usize, NavigationError> {
        self.ensure_open()?;

        if index >= self.registry.len() {
            let err = NavigationError::OutOfRange {
                requested: index,
                step_count: self.registry.len(),
            };
            warn!(draft_id = %self.draft.id, "Rejected navigation: {}", err);
            return Err(err);
        }

        if let Some(missing) = self.registry.steps()[..index]
            .iter()
            .find(|step| !self.draft.is_completed(&step.id))
        {
            let err = NavigationError::OutOfOrder {
                requested: index,
                missing: missing.id.clone(),
            };
            warn!(draft_id = %self.draft.id, "Rejected navigation: {}", err);
            return Err(err);
        }

        if index != self.draft.current_step_index {
            self.move_to(index);
        }
        Ok(index)
    }

    /// Enter the terminal state. Only valid from the last step.
    pub fn mark_submitted(
        &mut self,
        confirmation_id: Option<String>,
    ) -> Result<(), NavigationError> {
        self.ensure_open()?;
        if !self.is_last_step() {
            return Err(NavigationError::NotOnLastStep);
        }

        let last = self.current_step().id.clone();
        self.draft.completed_steps.insert(last);
        self.draft.touch();
        self.submitted = true;

        info!(draft_id = %self.draft.id, flow = %self.draft.flow, "Draft submitted");
        self.notify(&WizardEvent::Submitted {
            draft_id: self.draft.id,
            confirmation_id,
        });
        Ok(())
    }

    fn move_to(&mut self, index: usize) {
        let from = self.draft.current_step_index;
        self.draft.current_step_index = index;
        self.draft.touch();

        let step_id = self.current_step().id.clone();
        debug!(draft_id = %self.draft.id, from, to = index, step = %step_id, "Step changed");
        self.notify(&WizardEvent::StepChanged {
            draft_id: self.draft.id,
            from_index: from,
            to_index: index,
            step_id,
        });
    }

    fn ensure_open(&self) -> Result<(), NavigationError> {
        if self.submitted {
            return Err(NavigationError::AlreadySubmitted(self.draft.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{FieldRule, REQUIRED_MESSAGE};
    use serde_json::json;
    use std::sync::Mutex;

    fn registry() -> Arc<StepRegistry> {
        Arc::new(
            StepRegistry::new(vec![
                StepDefinition::new("trip", 1).require("trip.destination"),
                StepDefinition::new("contactInfo", 2)
                    .require("contactInfo.email")
                    .rule(FieldRule::email("contactInfo.email")),
                StepDefinition::new("review", 3).rule(FieldRule::accepted("review.acceptTerms")),
            ])
            .unwrap(),
        )
    }

    fn navigator() -> StepNavigator {
        StepNavigator::start(registry(), "tour", FormFields::new())
    }

    #[test]
    fn test_next_blocked_by_missing_required_fields() {
        let mut nav = navigator();
        let result = nav.go_next().unwrap();

        assert!(!result.is_valid());
        assert_eq!(result.error_for("trip.destination"), Some(REQUIRED_MESSAGE));
        assert_eq!(nav.current_index(), 0);
        assert!(nav.draft().completed_steps.is_empty());
    }

    #[test]
    fn test_full_walkthrough() {
        let mut nav = navigator();

        nav.set_field("trip.destination", json!("Lisbon")).unwrap();
        assert!(nav.go_next().unwrap().is_valid());
        assert_eq!(nav.state(), WizardState::Step(1));

        nav.set_field("contactInfo.email", json!("ada@example.com")).unwrap();
        assert!(nav.go_next().unwrap().is_valid());
        assert_eq!(nav.current_index(), 2);

        nav.set_field("review.acceptTerms", json!(true)).unwrap();
        assert!(nav.go_next().unwrap().is_valid());
        // Clamped at the last step
        assert_eq!(nav.current_index(), 2);
        assert!(nav.draft().is_completed("review"));

        nav.mark_submitted(Some("BK-1".to_string())).unwrap();
        assert_eq!(nav.state(), WizardState::Submitted);
        assert_eq!(
            nav.go_back(),
            Err(NavigationError::AlreadySubmitted(nav.draft_id()))
        );
        assert!(nav.set_field("trip.destination", json!("Porto")).is_err());
    }

    #[test]
    fn test_back_from_first_step_is_noop() {
        let mut nav = navigator();
        assert_eq!(nav.go_back().unwrap(), 0);
        assert_eq!(nav.current_index(), 0);
    }

    #[test]
    fn test_back_never_validates() {
        let mut nav = navigator();
        nav.set_field("trip.destination", json!("Lisbon")).unwrap();
        nav.go_next().unwrap();
        nav.clear_field("trip.destination").unwrap();
        nav.go_next().unwrap();
        assert_eq!(nav.current_index(), 1);
        assert_eq!(nav.go_back().unwrap(), 0);
    }

    #[test]
    fn test_goto_requires_all_previous_steps_completed() {
        let mut nav = navigator();
        nav.set_field("trip.destination", json!("Lisbon")).unwrap();
        nav.go_next().unwrap();
        assert!(nav.draft().is_completed("trip"));

        let err = nav.go_to_step(2).unwrap_err();
        assert_eq!(
            err,
            NavigationError::OutOfOrder {
                requested: 2,
                missing: "contactInfo".to_string()
            }
        );
        assert_eq!(err.user_message(), "Please complete the previous steps first.");
        assert_eq!(nav.current_index(), 1);

        assert_eq!(nav.go_to_step(0).unwrap(), 0);
        assert_eq!(nav.go_to_step(1).unwrap(), 1);
        assert!(matches!(nav.go_to_step(3), Err(NavigationError::OutOfRange { .. })));
    }

    #[test]
    fn test_submit_only_from_last_step() {
        let mut nav = navigator();
        assert_eq!(nav.mark_submitted(None), Err(NavigationError::NotOnLastStep));
        assert!(!nav.is_submitted());
    }

    #[test]
    fn test_first_invalid_step_catches_edits_after_completion() {
        let mut nav = navigator();
        nav.set_field("trip.destination", json!("Lisbon")).unwrap();
        nav.go_next().unwrap();
        nav.clear_field("trip.destination").unwrap();

        let (index, result) = nav.first_invalid_step().unwrap();
        assert_eq!(index, 0);
        assert!(result.error_for("trip.destination").is_some());
    }

    #[test]
    fn test_listeners_see_field_and_step_changes() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut nav = navigator();
        let sink = events.clone();
        nav.subscribe(Arc::new(move |event: &WizardEvent| {
            sink.lock().unwrap().push(event.name());
        }));

        nav.go_next().unwrap();
        nav.set_field("trip.destination", json!("Lisbon")).unwrap();
        nav.set_field("trip.destination", json!("Lisbon")).unwrap();
        nav.go_next().unwrap();
        nav.go_back().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["validation_failed", "field_changed", "step_changed", "step_changed"]
        );
    }

    #[test]
    fn test_merge_fields_emits_per_changed_key() {
        let events = Arc::new(Mutex::new(0usize));
        let mut nav = navigator();
        let sink = events.clone();
        nav.subscribe(Arc::new(move |_: &WizardEvent| {
            *sink.lock().unwrap() += 1;
        }));

        let changed = nav
            .merge_fields(FormFields::from([
                ("trip.destination", json!("Lisbon")),
                ("contactInfo.email", json!("ada@example.com")),
            ]))
            .unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(*events.lock().unwrap(), 2);
    }

    #[test]
    fn test_resume_rejects_inconsistent_draft() {
        let mut draft = BookingDraft::new("tour");
        draft.current_step_index = 5;
        assert!(StepNavigator::new(registry(), draft).is_err());

        let mut draft = BookingDraft::new("tour");
        draft.completed_steps.insert("payment".to_string());
        assert!(StepNavigator::new(registry(), draft).is_err());

        let mut draft = BookingDraft::new("tour");
        draft.current_step_index = 1;
        draft.completed_steps.insert("trip".to_string());
        let nav = StepNavigator::new(registry(), draft).unwrap();
        assert_eq!(nav.current_step().id, "contactInfo");
    }
}
