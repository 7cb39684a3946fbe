use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest rate or fee accepted from a form; larger inputs are refused by validation
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// A flat fee added on top of the discounted rental/stay price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub label: String,
    pub amount: Decimal,
}

impl Fee {
    pub fn new(label: impl Into<String>, amount: Decimal) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }
}

/// Long-stay discount percentages, as entered on a pricing step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTiers {
    pub weekly_percent: Decimal,
    pub monthly_percent: Decimal,
}

impl DiscountTiers {
    pub fn new(weekly_percent: Decimal, monthly_percent: Decimal) -> Self {
        Self {
            weekly_percent,
            monthly_percent,
        }
    }
}

/// Breakdown of a priced period. All amounts are rounded to the configured scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub fees_total: Decimal,
    pub total: Decimal,
}

impl PriceQuote {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.total.is_zero() && self.subtotal.is_zero()
    }
}

/// Daily/weekly/monthly totals shown next to the rate inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePreview {
    pub daily_total: Decimal,
    pub weekly_total: Decimal,
    pub monthly_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Decimal places kept on every output amount
    pub scale: u32,

    /// Minimum period for the weekly tier
    pub weekly_threshold_days: u32,

    /// Minimum period for the monthly tier
    pub monthly_threshold_days: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            scale: 2,
            weekly_threshold_days: 7,
            monthly_threshold_days: 30,
        }
    }
}

/// Pure price calculator for booking and listing previews.
///
/// Inputs are assumed to be validated upstream (discounts within range, fees
/// non-negative). A missing or zero base rate is "not entered yet" and yields
/// an all-zero quote rather than an error.
#[derive(Debug, Clone, Default)]
pub struct PriceCalculator {
    config: PricingConfig,
}

impl PriceCalculator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Quote a period at a single, already chosen discount percentage
    pub fn quote(
        &self,
        base_rate: Decimal,
        period_days: u32,
        discount_percent: Decimal,
        fees: &[Fee],
    ) -> PriceQuote {
        if base_rate <= Decimal::ZERO || period_days == 0 {
            return PriceQuote::zero();
        }
        self.try_quote(base_rate, period_days, discount_percent, fees)
            .unwrap_or_default()
    }

    /// `None` when an intermediate amount overflows
    fn try_quote(
        &self,
        base_rate: Decimal,
        period_days: u32,
        discount_percent: Decimal,
        fees: &[Fee],
    ) -> Option<PriceQuote> {
        let gross = base_rate.checked_mul(Decimal::from(period_days))?;
        let subtotal = self.round(gross);
        let discount_amount =
            self.round(gross.checked_mul(discount_percent)? / Decimal::ONE_HUNDRED);
        let fees_total = self.round(
            fees.iter()
                .try_fold(Decimal::ZERO, |sum, fee| sum.checked_add(fee.amount))?,
        );

        Some(PriceQuote {
            subtotal,
            discount_amount,
            fees_total,
            // Computed from the rounded parts so the breakdown always adds up
            total: subtotal.checked_sub(discount_amount)?.checked_add(fees_total)?,
        })
    }

    /// Quote a period, picking the long-stay tier that applies to it
    pub fn quote_tiered(
        &self,
        base_rate: Decimal,
        period_days: u32,
        tiers: &DiscountTiers,
        fees: &[Fee],
    ) -> PriceQuote {
        let percent = self.discount_for(period_days, tiers);
        self.quote(base_rate, period_days, percent, fees)
    }

    /// Quote straight from raw form input; unparsable amounts count as not entered
    pub fn quote_from_input(
        &self,
        base_rate: &str,
        period_days: u32,
        tiers: (&str, &str),
        fees: &[Fee],
    ) -> PriceQuote {
        let Some(base_rate) = Self::parse_amount(base_rate) else {
            return PriceQuote::zero();
        };
        let tiers = DiscountTiers::new(
            Self::parse_amount(tiers.0).unwrap_or_default(),
            Self::parse_amount(tiers.1).unwrap_or_default(),
        );
        self.quote_tiered(base_rate, period_days, &tiers, fees)
    }

    /// Weekly and monthly tiers are exclusive; monthly wins once its threshold is met.
    /// A stay past the monthly threshold with no monthly discount set keeps the weekly one.
    pub fn discount_for(&self, period_days: u32, tiers: &DiscountTiers) -> Decimal {
        if period_days >= self.config.monthly_threshold_days && !tiers.monthly_percent.is_zero() {
            tiers.monthly_percent
        } else if period_days >= self.config.weekly_threshold_days {
            tiers.weekly_percent
        } else {
            Decimal::ZERO
        }
    }

    /// Totals for one day, one week and one month at the respective tiers
    pub fn preview(&self, base_rate: Decimal, tiers: &DiscountTiers) -> PricePreview {
        if base_rate <= Decimal::ZERO {
            return PricePreview::default();
        }

        self.try_preview(base_rate, tiers).unwrap_or_default()
    }

    fn try_preview(&self, base_rate: Decimal, tiers: &DiscountTiers) -> Option<PricePreview> {
        let period_total = |days: u32, percent: Decimal| {
            let factor = Decimal::ONE - percent / Decimal::ONE_HUNDRED;
            base_rate
                .checked_mul(Decimal::from(days))?
                .checked_mul(factor)
                .map(|total| self.round(total))
        };

        Some(PricePreview {
            daily_total: self.round(base_rate),
            weekly_total: period_total(self.config.weekly_threshold_days, tiers.weekly_percent)?,
            monthly_total: period_total(self.config.monthly_threshold_days, tiers.monthly_percent)?,
        })
    }

    /// Parse a user-typed amount such as `"120"`, `"$1,250.50"` or `" 99.9 "`
    pub fn parse_amount(input: &str) -> Option<Decimal> {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix(['$', '€', '£', '¥'])
            .unwrap_or(trimmed)
            .trim_start();

        if trimmed.is_empty() {
            return None;
        }

        let cleaned: String = trimmed.chars().filter(|c| *c != ',' && *c != '_').collect();
        Decimal::from_str(&cleaned).ok()
    }

    fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.config.scale, RoundingStrategy::MidpointAwayFromZero)
    }
}
