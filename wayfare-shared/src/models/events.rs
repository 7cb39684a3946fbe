use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Change notification emitted by a wizard session.
///
/// Serialized with a `type` tag so a presentation layer can dispatch on it
/// (e.g. when the events are forwarded over SSE).
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardEvent {
    FieldChanged {
        draft_id: Uuid,
        key: String,
    },
    StepChanged {
        draft_id: Uuid,
        from_index: usize,
        to_index: usize,
        step_id: String,
    },
    ValidationFailed {
        draft_id: Uuid,
        step_id: String,
        field_errors: BTreeMap<String, String>,
    },
    PriceChanged {
        draft_id: Uuid,
        daily_total: Decimal,
        weekly_total: Decimal,
        monthly_total: Decimal,
    },
    SubmissionStarted {
        draft_id: Uuid,
    },
    Submitted {
        draft_id: Uuid,
        confirmation_id: Option<String>,
    },
    SubmissionFailed {
        draft_id: Uuid,
        error_message: String,
    },
    Closed {
        draft_id: Uuid,
    },
}

impl WizardEvent {
    pub fn draft_id(&self) -> Uuid {
        match self {
            WizardEvent::FieldChanged { draft_id, .. }
            | WizardEvent::StepChanged { draft_id, .. }
            | WizardEvent::ValidationFailed { draft_id, .. }
            | WizardEvent::PriceChanged { draft_id, .. }
            | WizardEvent::SubmissionStarted { draft_id }
            | WizardEvent::Submitted { draft_id, .. }
            | WizardEvent::SubmissionFailed { draft_id, .. }
            | WizardEvent::Closed { draft_id } => *draft_id,
        }
    }

    /// Event name as used on the wire (`field_changed`, `submitted`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            WizardEvent::FieldChanged { .. } => "field_changed",
            WizardEvent::StepChanged { .. } => "step_changed",
            WizardEvent::ValidationFailed { .. } => "validation_failed",
            WizardEvent::PriceChanged { .. } => "price_changed",
            WizardEvent::SubmissionStarted { .. } => "submission_started",
            WizardEvent::Submitted { .. } => "submitted",
            WizardEvent::SubmissionFailed { .. } => "submission_failed",
            WizardEvent::Closed { .. } => "closed",
        }
    }

    /// Nothing follows a terminal event for the same draft; event streams
    /// stop after forwarding one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WizardEvent::Submitted { .. } | WizardEvent::Closed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_on_the_wire() {
        let draft_id = Uuid::new_v4();
        let event = WizardEvent::StepChanged {
            draft_id,
            from_index: 0,
            to_index: 1,
            step_id: "contactInfo".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "STEP_CHANGED");
        assert_eq!(json["to_index"], 1);
        assert_eq!(event.draft_id(), draft_id);
        assert_eq!(event.name(), "step_changed");
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_submitted_and_closed_are_terminal() {
        let draft_id = Uuid::new_v4();
        assert!(WizardEvent::Closed { draft_id }.is_terminal());
        assert!(!WizardEvent::SubmissionStarted { draft_id }.is_terminal());
    }
}
