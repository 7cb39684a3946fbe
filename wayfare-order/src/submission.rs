use crate::models::SubmissionResult;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use wayfare_core::{BookingGateway, BookingRequest, GatewayError, GatewayResponse};

pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends packaged drafts to the booking gateway.
///
/// The only component that performs I/O. Gateway errors, rejections and
/// timeouts all become a failure [`SubmissionResult`]; nothing here discards
/// the caller's draft.
pub struct SubmissionHandler {
    gateway: Arc<dyn BookingGateway>,
    timeout: Duration,
}

impl SubmissionHandler {
    pub fn new(gateway: Arc<dyn BookingGateway>) -> Self {
        Self {
            gateway,
            timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn submit(&self, request: &BookingRequest) -> SubmissionResult {
        info!(
            draft_id = %request.draft_id,
            flow = %request.flow,
            gateway = self.gateway.name(),
            "Submitting booking"
        );

        let outcome = match tokio::time::timeout(self.timeout, self.gateway.submit(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(GatewayResponse { ok: true, id, .. }) => {
                info!(draft_id = %request.draft_id, confirmation_id = ?id, "Booking confirmed");
                SubmissionResult::success(id)
            }
            Ok(GatewayResponse { error, .. }) => {
                let message = error.unwrap_or_else(|| "The booking was rejected".to_string());
                warn!(draft_id = %request.draft_id, "Booking rejected: {}", message);
                SubmissionResult::failure(message)
            }
            Err(e) => {
                warn!(draft_id = %request.draft_id, "Booking submission failed: {}", e);
                SubmissionResult::failure(e.to_string())
            }
        }
    }
}

/// Per-draft "submission outstanding" flag
#[derive(Debug, Default)]
pub struct InFlightFlag(AtomicBool);

impl InFlightFlag {
    /// Claim the flag; `None` if a submission already holds it
    pub fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the flag on drop, including when the submitting future is dropped
#[derive(Debug)]
pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Name of the top-level payload key the mock gateway reads to simulate a
/// failure, e.g. `{"simulate": "reject"}`
pub const SIMULATE_KEY: &str = "simulate";

/// In-process stand-in for the booking API.
///
/// Confirms every request unless its payload carries `"simulate": "reject"`
/// (server-side rejection) or `"simulate": "unavailable"` (transport error).
#[derive(Debug, Default)]
pub struct MockBookingGateway {
    latency: Duration,
    calls: AtomicUsize,
}

impl MockBookingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn confirmation_id(request: &BookingRequest) -> String {
        let prefix: String = request
            .flow
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(3)
            .collect::<String>()
            .to_ascii_uppercase();
        let suffix = request.draft_id.simple().to_string()[..8].to_ascii_uppercase();
        format!("{prefix}-{suffix}")
    }
}

#[async_trait::async_trait]
impl BookingGateway for MockBookingGateway {
    async fn submit(&self, request: &BookingRequest) -> Result<GatewayResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match request.payload[SIMULATE_KEY].as_str() {
            Some("reject") => {
                Ok(GatewayResponse::rejected("Selected dates are no longer available"))
            }
            Some("unavailable") => Err(GatewayError::Transport("connection refused".to_string())),
            _ => Ok(GatewayResponse::accepted(Self::confirmation_id(request))),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionStatus;
    use serde_json::json;
    use wayfare_core::{BookingDraft, FormFields};

    fn request(fields: FormFields) -> BookingRequest {
        BookingRequest::from_draft(&BookingDraft::with_defaults("hotel", fields))
    }

    #[tokio::test]
    async fn test_mock_confirms_booking() {
        let gateway = Arc::new(MockBookingGateway::new());
        let handler = SubmissionHandler::new(gateway.clone());

        let result = handler.submit(&request(FormFields::new())).await;
        assert_eq!(result.status, SubmissionStatus::Success);
        assert!(result.confirmation_id.unwrap().starts_with("HOT-"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_and_transport_errors_become_failures() {
        let handler = SubmissionHandler::new(Arc::new(MockBookingGateway::new()));

        let rejected = handler
            .submit(&request(FormFields::from([(SIMULATE_KEY, json!("reject"))])))
            .await;
        assert!(!rejected.is_success());
        assert_eq!(
            rejected.error_message.as_deref(),
            Some("Selected dates are no longer available")
        );

        let unavailable = handler
            .submit(&request(FormFields::from([(SIMULATE_KEY, json!("unavailable"))])))
            .await;
        assert!(!unavailable.is_success());
        assert!(unavailable.error_message.unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_as_failure() {
        let gateway = Arc::new(MockBookingGateway::with_latency(Duration::from_secs(60)));
        let handler = SubmissionHandler::new(gateway.clone());

        let result = handler.submit(&request(FormFields::new())).await;
        assert_eq!(result.status, SubmissionStatus::Failure);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Booking service did not answer within 30s")
        );
    }

    #[test]
    fn test_in_flight_flag_is_exclusive_and_released_on_drop() {
        let flag = InFlightFlag::default();
        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_set());
        assert!(flag.try_acquire().is_none());
        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_acquire().is_some());
    }
}
