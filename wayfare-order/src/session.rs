use crate::flows::FlowTemplate;
use crate::models::SubmissionResult;
use crate::submission::{InFlightFlag, SubmissionHandler};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use wayfare_catalog::{PriceCalculator, PricePreview, PriceQuote};
use wayfare_core::{
    BookingDraft, BookingRequest, CoreResult, FormFields, Listener, NavigationError, StepNavigator,
    SubscriptionId, ValidationResult, WizardState,
};
use wayfare_shared::WizardEvent;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("Step '{step_id}' has invalid fields")]
    Invalid {
        step_index: usize,
        step_id: String,
        result: ValidationResult,
    },
}

/// Point-in-time view of a session for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub draft: BookingDraft,
    pub state: WizardState,
    pub current_step: String,
    pub step_count: usize,
    pub submitting: bool,
    pub price_preview: Option<PricePreview>,
}

/// One user's run through a flow.
///
/// All navigator access is serialized through a mutex that is never held
/// across the gateway call, so the session stays readable while a
/// submission is outstanding. Edits and navigation are refused until it
/// resolves.
pub struct WizardSession {
    id: Uuid,
    flow: Arc<FlowTemplate>,
    navigator: Mutex<StepNavigator>,
    handler: Arc<SubmissionHandler>,
    calculator: PriceCalculator,
    in_flight: InFlightFlag,
    closed: AtomicBool,
    last_activity: StdMutex<Instant>,
}

impl WizardSession {
    pub fn new(flow: Arc<FlowTemplate>, handler: Arc<SubmissionHandler>) -> Self {
        let navigator =
            StepNavigator::start(flow.registry.clone(), &flow.id, flow.defaults.clone());
        Self::with_navigator(flow, handler, navigator)
    }

    /// Continue from a previously captured draft
    pub fn resume(
        flow: Arc<FlowTemplate>,
        handler: Arc<SubmissionHandler>,
        draft: BookingDraft,
    ) -> CoreResult<Self> {
        let navigator = StepNavigator::new(flow.registry.clone(), draft)?;
        Ok(Self::with_navigator(flow, handler, navigator))
    }

    fn with_navigator(
        flow: Arc<FlowTemplate>,
        handler: Arc<SubmissionHandler>,
        navigator: StepNavigator,
    ) -> Self {
        Self {
            id: navigator.draft_id(),
            flow,
            navigator: Mutex::new(navigator),
            handler,
            calculator: PriceCalculator::default(),
            in_flight: InFlightFlag::default(),
            closed: AtomicBool::new(false),
            last_activity: StdMutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn flow(&self) -> &FlowTemplate {
        &self.flow
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_set()
    }

    /// Time since the guest last read or changed the session
    pub fn idle_for(&self) -> Duration {
        let last = *self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed()
    }

    pub async fn subscribe(&self, listener: Listener) -> Result<SubscriptionId, NavigationError> {
        self.ensure_open()?;
        Ok(self.navigator.lock().await.subscribe(listener))
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.navigator.lock().await.unsubscribe(id)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.touch();
        let nav = self.navigator.lock().await;
        SessionSnapshot {
            draft: nav.draft().clone(),
            state: nav.state(),
            current_step: nav.current_step().id.clone(),
            step_count: nav.step_count(),
            submitting: self.is_submitting(),
            price_preview: self.preview_for(nav.fields()),
        }
    }

    pub async fn set_field(&self, key: &str, value: Value) -> Result<bool, NavigationError> {
        let mut nav = self.navigator.lock().await;
        self.ensure_editable()?;
        self.touch();
        let changed = nav.set_field(key, value)?;
        if changed && self.watches(key) {
            self.emit_price(&nav);
        }
        Ok(changed)
    }

    pub async fn merge_fields(&self, patch: FormFields) -> Result<Vec<String>, NavigationError> {
        let mut nav = self.navigator.lock().await;
        self.ensure_editable()?;
        self.touch();
        let changed = nav.merge_fields(patch)?;
        if changed.iter().any(|key| self.watches(key)) {
            self.emit_price(&nav);
        }
        Ok(changed)
    }

    pub async fn go_next(&self) -> Result<ValidationResult, NavigationError> {
        let mut nav = self.navigator.lock().await;
        self.ensure_editable()?;
        self.touch();
        nav.go_next()
    }

    pub async fn go_back(&self) -> Result<usize, NavigationError> {
        let mut nav = self.navigator.lock().await;
        self.ensure_editable()?;
        self.touch();
        nav.go_back()
    }

    pub async fn go_to_step(&self, index: usize) -> Result<usize, NavigationError> {
        let mut nav = self.navigator.lock().await;
        self.ensure_editable()?;
        self.touch();
        nav.go_to_step(index)
    }

    pub async fn price_preview(&self) -> Option<PricePreview> {
        let nav = self.navigator.lock().await;
        self.preview_for(nav.fields())
    }

    /// Quote the bound rate for `days`, or for the period between the flow's
    /// date fields when `days` is `None` (one day if those are unset).
    /// `None` for flows without pricing.
    pub async fn quote(&self, days: Option<u32>) -> Option<PriceQuote> {
        let binding = self.flow.pricing.as_ref()?;
        let nav = self.navigator.lock().await;
        let fields = nav.fields();

        let Some(base_rate) = binding.base_rate(fields) else {
            return Some(PriceQuote::zero());
        };
        let days = days.or_else(|| binding.period_days(fields)).unwrap_or(1);
        let tiers = binding.tiers(fields);
        Some(self.calculator.quote_tiered(base_rate, days, &tiers, &binding.fees(fields)))
    }

    /// Package the draft and send it to the booking gateway.
    ///
    /// Only one submission per session can be outstanding; a concurrent call
    /// fails with [`NavigationError::SubmissionPending`] without reaching the
    /// gateway. On failure the draft is left untouched for a retry.
    pub async fn submit(&self) -> Result<SubmissionResult, SubmitError> {
        self.ensure_open()?;
        self.touch();
        let Some(_guard) = self.in_flight.try_acquire() else {
            return Err(NavigationError::SubmissionPending.into());
        };

        let request = {
            let nav = self.navigator.lock().await;
            self.ensure_open()?;
            if nav.is_submitted() {
                return Err(NavigationError::AlreadySubmitted(self.id).into());
            }
            if !nav.is_last_step() {
                return Err(NavigationError::NotOnLastStep.into());
            }
            if let Some((step_index, result)) = nav.first_invalid_step() {
                let step_id = nav.registry().steps()[step_index].id.clone();
                nav.notify(&WizardEvent::ValidationFailed {
                    draft_id: self.id,
                    step_id: step_id.clone(),
                    field_errors: result.field_errors.clone(),
                });
                return Err(SubmitError::Invalid {
                    step_index,
                    step_id,
                    result,
                });
            }

            nav.notify(&WizardEvent::SubmissionStarted { draft_id: self.id });
            BookingRequest::from_draft(nav.draft())
        };

        let result = self.handler.submit(&request).await;

        let mut nav = self.navigator.lock().await;
        if self.is_closed() {
            info!(draft_id = %self.id, "Session closed while submitting; discarding outcome");
            return Ok(result);
        }

        if result.is_success() {
            if let Err(e) = nav.mark_submitted(result.confirmation_id.clone()) {
                warn!(draft_id = %self.id, "Confirmed booking could not finish the wizard: {}", e);
            }
        } else {
            nav.notify(&WizardEvent::SubmissionFailed {
                draft_id: self.id,
                error_message: result.error_message.clone().unwrap_or_default(),
            });
        }
        Ok(result)
    }

    /// Tear the session down. Listeners are dropped and a submission still
    /// in flight no longer affects the session when it completes.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut nav = self.navigator.lock().await;
        nav.notify(&WizardEvent::Closed { draft_id: self.id });
        nav.clear_listeners();
        info!(draft_id = %self.id, flow = %self.flow.id, "Wizard session closed");
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn watches(&self, key: &str) -> bool {
        self.flow.pricing.as_ref().is_some_and(|b| b.watches(key))
    }

    fn preview_for(&self, fields: &FormFields) -> Option<PricePreview> {
        let binding = self.flow.pricing.as_ref()?;
        let base_rate = binding.base_rate(fields).unwrap_or_default();
        Some(self.calculator.preview(base_rate, &binding.tiers(fields)))
    }

    fn emit_price(&self, nav: &StepNavigator) {
        if let Some(preview) = self.preview_for(nav.fields()) {
            nav.notify(&WizardEvent::PriceChanged {
                draft_id: self.id,
                daily_total: preview.daily_total,
                weekly_total: preview.weekly_total,
                monthly_total: preview.monthly_total,
            });
        }
    }

    fn ensure_open(&self) -> Result<(), NavigationError> {
        if self.is_closed() {
            return Err(NavigationError::SessionClosed);
        }
        Ok(())
    }

    /// Checked while holding the navigator lock so an edit cannot slip in
    /// between a submission snapshotting the draft and its completion
    fn ensure_editable(&self) -> Result<(), NavigationError> {
        self.ensure_open()?;
        if self.in_flight.is_set() {
            return Err(NavigationError::SubmissionPending);
        }
        Ok(())
    }
}
