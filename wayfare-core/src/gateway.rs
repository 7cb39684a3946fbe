use crate::draft::BookingDraft;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Request body sent to the booking/creation API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub draft_id: Uuid,
    pub flow: String,
    /// Form fields expanded into nested objects
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl BookingRequest {
    pub fn from_draft(draft: &BookingDraft) -> Self {
        Self {
            draft_id: draft.id,
            flow: draft.flow.clone(),
            payload: draft.fields.to_nested_json(),
            submitted_at: Utc::now(),
        }
    }
}

/// What the booking API answered for a request it processed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub ok: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GatewayResponse {
    pub fn accepted(id: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Booking service unreachable: {0}")]
    Transport(String),

    #[error("Booking service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable booking service response: {0}")]
    Decode(String),

    #[error("Booking service did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// The external booking/creation endpoint
#[async_trait]
pub trait BookingGateway: Send + Sync {
    /// Submit a packaged draft
    async fn submit(&self, request: &BookingRequest) -> Result<GatewayResponse, GatewayError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "booking-gateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::FormFields;
    use serde_json::json;

    #[test]
    fn test_request_carries_nested_payload() {
        let draft = BookingDraft::with_defaults(
            "hotel",
            FormFields::from([
                ("stay.checkIn", json!("2031-05-01")),
                ("guest.email", json!("ada@example.com")),
            ]),
        );
        let request = BookingRequest::from_draft(&draft);

        assert_eq!(request.draft_id, draft.id);
        assert_eq!(request.flow, "hotel");
        assert_eq!(request.payload["stay"]["checkIn"], "2031-05-01");
        assert_eq!(request.payload["guest"]["email"], "ada@example.com");
    }

    #[test]
    fn test_response_decodes_with_missing_optionals() {
        let response: GatewayResponse =
            serde_json::from_value(json!({ "ok": true, "id": "BK-42" })).unwrap();
        assert_eq!(response, GatewayResponse::accepted("BK-42"));

        let response: GatewayResponse = serde_json::from_value(json!({ "ok": false })).unwrap();
        assert!(!response.ok);
        assert!(response.error.is_none());
    }
}
