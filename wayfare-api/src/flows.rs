use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::error::AppError;
use crate::state::AppState;
use wayfare_catalog::{DiscountTiers, Fee, PriceCalculator, PricePreview, PriceQuote, MAX_AMOUNT};
use wayfare_order::FlowTemplate;

/// Highest long-stay discount an owner may configure
const MAX_DISCOUNT_PERCENT: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

#[derive(Debug, Serialize)]
pub struct FlowSummary {
    pub id: String,
    pub title: String,
    pub priced: bool,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Serialize)]
pub struct StepSummary {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub required_fields: Vec<String>,
}

impl From<&FlowTemplate> for FlowSummary {
    fn from(flow: &FlowTemplate) -> Self {
        Self {
            id: flow.id.clone(),
            title: flow.title.clone(),
            priced: flow.pricing.is_some(),
            steps: flow
                .registry
                .steps()
                .iter()
                .map(|step| StepSummary {
                    id: step.id.clone(),
                    title: step.title.clone(),
                    order: step.order,
                    required_fields: step.required_fields.iter().cloned().collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    /// Raw rate as typed (`"120"`, `"$1,250.50"`); unparsable counts as not entered
    pub base_rate: String,
    pub period_days: u32,
    #[serde(default)]
    pub weekly_discount: Decimal,
    #[serde(default)]
    pub monthly_discount: Decimal,
    #[serde(default)]
    pub fees: Vec<Fee>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: PriceQuote,
    pub preview: PricePreview,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flows", get(list_flows))
        .route("/v1/quotes", post(create_quote))
}

/// GET /v1/flows
async fn list_flows(State(state): State<AppState>) -> Json<Vec<FlowSummary>> {
    let catalog = state.sessions.catalog();
    let flows = catalog
        .ids()
        .into_iter()
        .filter_map(|id| catalog.get(id))
        .map(|flow| FlowSummary::from(flow.as_ref()))
        .collect();
    Json(flows)
}

/// POST /v1/quotes
/// Stateless price preview for a rate, period, discounts and fees
async fn create_quote(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    validate_quote_request(&req)?;

    let tiers = DiscountTiers::new(req.weekly_discount, req.monthly_discount);
    let Some(base_rate) = PriceCalculator::parse_amount(&req.base_rate) else {
        return Ok(Json(QuoteResponse {
            quote: PriceQuote::zero(),
            preview: PricePreview::default(),
        }));
    };

    Ok(Json(QuoteResponse {
        quote: state.calculator.quote_tiered(base_rate, req.period_days, &tiers, &req.fees),
        preview: state.calculator.preview(base_rate, &tiers),
    }))
}

/// The calculator trusts its inputs; out-of-range values are refused here
fn validate_quote_request(req: &QuoteRequest) -> Result<(), AppError> {
    if req.period_days == 0 {
        return Err(AppError::ValidationError("period_days must be at least 1".to_string()));
    }
    for (name, percent) in [
        ("weekly_discount", req.weekly_discount),
        ("monthly_discount", req.monthly_discount),
    ] {
        if percent < Decimal::ZERO || percent > MAX_DISCOUNT_PERCENT {
            return Err(AppError::ValidationError(format!(
                "{name} must be between 0 and {MAX_DISCOUNT_PERCENT}"
            )));
        }
    }
    if let Some(fee) = req
        .fees
        .iter()
        .find(|f| f.amount < Decimal::ZERO || f.amount > MAX_AMOUNT)
    {
        return Err(AppError::ValidationError(format!(
            "Fee '{}' must be between 0 and {MAX_AMOUNT}",
            fee.label
        )));
    }
    if let Some(rate) = PriceCalculator::parse_amount(&req.base_rate) {
        if rate < Decimal::ZERO || rate > MAX_AMOUNT {
            return Err(AppError::ValidationError(format!(
                "base_rate must be between 0 and {MAX_AMOUNT}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(base_rate: &str, weekly: Decimal) -> QuoteRequest {
        QuoteRequest {
            base_rate: base_rate.to_string(),
            period_days: 7,
            weekly_discount: weekly,
            monthly_discount: Decimal::ZERO,
            fees: vec![],
        }
    }

    #[test]
    fn test_discount_limits() {
        assert!(validate_quote_request(&request("100", dec!(50))).is_ok());
        assert!(validate_quote_request(&request("100", dec!(50.01))).is_err());
        assert!(validate_quote_request(&request("100", dec!(-1))).is_err());
    }

    #[test]
    fn test_negative_rate_rejected_but_garbage_allowed() {
        assert!(validate_quote_request(&request("-5", dec!(0))).is_err());
        assert!(validate_quote_request(&request("tbd", dec!(0))).is_ok());
    }

    #[test]
    fn test_amount_upper_bound() {
        assert!(validate_quote_request(&request("1000000", dec!(0))).is_ok());
        let huge = request("10000000000000000000000000000", dec!(0));
        assert!(validate_quote_request(&huge).is_err());

        let mut req = request("100", dec!(0));
        req.fees = vec![Fee::new("Cleaning", dec!(1000000.01))];
        assert!(validate_quote_request(&req).is_err());
    }
}
