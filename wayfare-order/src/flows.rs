//! Built-in booking and listing flows.
//!
//! Each guest booking page (flight, hotel, car rental, restaurant, tour) and
//! the owner vehicle-listing onboarding is a [`FlowTemplate`]: an ordered step
//! registry, default field values, and optionally a [`PricingBinding`] naming
//! the fields the price preview is computed from.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wayfare_catalog::{DiscountTiers, Fee, PriceCalculator, MAX_AMOUNT};
use wayfare_core::{
    CoreResult, FieldRule, FormFields, StepDefinition, StepRegistry, ValidationResult,
};

/// Field keys feeding the price calculator
#[derive(Debug, Clone, Default, Serialize)]
pub struct PricingBinding {
    pub base_rate: String,
    pub weekly_discount: Option<String>,
    pub monthly_discount: Option<String>,
    /// `(label, key)` pairs; blank or unparsable amounts are skipped
    pub fees: Vec<(String, String)>,
    /// Date fields the priced period is derived from
    pub period: Option<(String, String)>,
}

impl PricingBinding {
    pub fn new(base_rate: &str) -> Self {
        Self {
            base_rate: base_rate.to_string(),
            ..Self::default()
        }
    }

    pub fn with_discounts(mut self, weekly: &str, monthly: &str) -> Self {
        self.weekly_discount = Some(weekly.to_string());
        self.monthly_discount = Some(monthly.to_string());
        self
    }

    pub fn with_fee(mut self, label: &str, key: &str) -> Self {
        self.fees.push((label.to_string(), key.to_string()));
        self
    }

    pub fn with_period(mut self, start: &str, end: &str) -> Self {
        self.period = Some((start.to_string(), end.to_string()));
        self
    }

    /// Every field key the price preview is computed from
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = vec![self.base_rate.as_str()];
        keys.extend(self.weekly_discount.as_deref());
        keys.extend(self.monthly_discount.as_deref());
        keys.extend(self.fees.iter().map(|(_, k)| k.as_str()));
        if let Some((start, end)) = &self.period {
            keys.extend([start.as_str(), end.as_str()]);
        }
        keys
    }

    /// Whether an edit to `key` changes the price preview
    pub fn watches(&self, key: &str) -> bool {
        self.keys().contains(&key)
    }

    /// Base rate as entered; `None` when missing or unparsable
    pub fn base_rate(&self, fields: &FormFields) -> Option<Decimal> {
        amount(fields, &self.base_rate)
    }

    pub fn tiers(&self, fields: &FormFields) -> DiscountTiers {
        let percent = |key: &Option<String>| {
            key.as_deref()
                .and_then(|k| amount(fields, k))
                .unwrap_or_default()
        };
        DiscountTiers::new(percent(&self.weekly_discount), percent(&self.monthly_discount))
    }

    pub fn fees(&self, fields: &FormFields) -> Vec<Fee> {
        self.fees
            .iter()
            .filter_map(|(label, key)| amount(fields, key).map(|a| Fee::new(label.clone(), a)))
            .collect()
    }

    /// Number of nights/days between the bound dates, if both are set and ordered
    pub fn period_days(&self, fields: &FormFields) -> Option<u32> {
        let (start, end) = self.period.as_ref()?;
        let days = (fields.date(end)? - fields.date(start)?).num_days();
        u32::try_from(days).ok().filter(|d| *d > 0)
    }
}

fn amount(fields: &FormFields, key: &str) -> Option<Decimal> {
    fields.text(key).and_then(|t| PriceCalculator::parse_amount(&t))
}

/// A complete wizard definition
#[derive(Debug)]
pub struct FlowTemplate {
    pub id: String,
    pub title: String,
    pub registry: Arc<StepRegistry>,
    pub defaults: FormFields,
    pub pricing: Option<PricingBinding>,
}

impl FlowTemplate {
    pub fn new(id: &str, title: &str, steps: Vec<StepDefinition>) -> CoreResult<Self> {
        Ok(Self {
            id: id.to_string(),
            title: title.to_string(),
            registry: Arc::new(StepRegistry::new(steps)?),
            defaults: FormFields::new(),
            pricing: None,
        })
    }

    pub fn with_defaults(mut self, defaults: FormFields) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingBinding) -> Self {
        self.pricing = Some(pricing);
        self
    }
}

/// Lookup of flow templates by id
#[derive(Debug, Default)]
pub struct FlowCatalog {
    flows: HashMap<String, Arc<FlowTemplate>>,
}

impl FlowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in flow
    pub fn builtin() -> CoreResult<Self> {
        let mut catalog = Self::new();
        catalog.register(flight_flow()?);
        catalog.register(hotel_flow()?);
        catalog.register(car_rental_flow()?);
        catalog.register(restaurant_flow()?);
        catalog.register(tour_flow()?);
        catalog.register(vehicle_listing_flow()?);
        Ok(catalog)
    }

    pub fn register(&mut self, flow: FlowTemplate) {
        self.flows.insert(flow.id.clone(), Arc::new(flow));
    }

    pub fn get(&self, id: &str) -> Option<Arc<FlowTemplate>> {
        self.flows.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FlowTemplate>> {
        self.flows.values()
    }
}

/// Rate, discount and fee rules for the pricing fields a step owns
fn with_price_rules(
    step: StepDefinition,
    rate: &str,
    discounts: &[&str],
    fees: &[&str],
) -> StepDefinition {
    let max_discount = Decimal::from(50);
    let step = step
        .rule(FieldRule::positive(rate))
        .rule(FieldRule::number_range(rate, Decimal::ZERO, MAX_AMOUNT));
    let step = discounts.iter().fold(step, |step, key| {
        step.rule(FieldRule::number_range(key, Decimal::ZERO, max_discount))
    });
    fees.iter().fold(step, |step, key| {
        step.rule(FieldRule::number_range(key, Decimal::ZERO, MAX_AMOUNT))
    })
}

fn review_step(order: u32) -> StepDefinition {
    StepDefinition::new("review", order)
        .titled("Review & confirm")
        .require("review.acceptTerms")
        .rule(FieldRule::accepted("review.acceptTerms"))
}

fn payment_step(order: u32) -> StepDefinition {
    StepDefinition::new("payment", order)
        .titled("Payment")
        .require_all(&["payment.method", "payment.cardholder"])
        .rule(FieldRule::one_of("payment.method", &["card", "paypal", "bank_transfer"]))
        .rule(FieldRule::min_length("payment.cardholder", 2))
}

pub fn flight_flow() -> CoreResult<FlowTemplate> {
    let steps = vec![
        StepDefinition::new("flight", 1)
            .titled("Flight")
            .require_all(&[
                "flight.origin",
                "flight.destination",
                "flight.departDate",
                "flight.passengers",
            ])
            .rule(FieldRule::not_in_past("flight.departDate"))
            .rule(FieldRule::date_order("flight.departDate", "flight.returnDate"))
            .rule(FieldRule::number_range("flight.passengers", Decimal::ONE, Decimal::from(9)))
            .rule(FieldRule::one_of("flight.cabin", &["economy", "premium", "business", "first"]))
            .with_validator(|fields| {
                match (fields.text("flight.origin"), fields.text("flight.destination")) {
                    (Some(o), Some(d)) if !o.is_empty() && o.eq_ignore_ascii_case(&d) => {
                        ValidationResult::field_error(
                            "flight.destination",
                            "Destination must differ from origin",
                        )
                    }
                    _ => ValidationResult::valid(),
                }
            }),
        StepDefinition::new("passengers", 2)
            .titled("Passengers")
            .require_all(&[
                "passengers.leadFirstName",
                "passengers.leadLastName",
                "passengers.leadEmail",
            ])
            .rule(FieldRule::email("passengers.leadEmail")),
        payment_step(3),
        review_step(4),
    ];

    Ok(FlowTemplate::new("flight", "Flight booking", steps)?.with_defaults(FormFields::from([
        ("flight.passengers", json!(1)),
        ("flight.cabin", json!("economy")),
    ])))
}

pub fn hotel_flow() -> CoreResult<FlowTemplate> {
    let stay = StepDefinition::new("stay", 1)
        .titled("Your stay")
        .require_all(&["stay.hotelId", "stay.checkIn", "stay.checkOut", "stay.guests"])
        .rule(FieldRule::not_in_past("stay.checkIn"))
        .rule(FieldRule::date_order("stay.checkIn", "stay.checkOut"))
        .rule(FieldRule::number_range("stay.guests", Decimal::ONE, Decimal::TEN));
    let steps = vec![
        with_price_rules(stay, "stay.nightlyRate", &[], &["stay.serviceFee"]),
        StepDefinition::new("guest", 2)
            .titled("Guest details")
            .require_all(&["guest.firstName", "guest.lastName", "guest.email"])
            .rule(FieldRule::email("guest.email"))
            .rule(FieldRule::min_length("guest.phone", 6)),
        payment_step(3),
        review_step(4),
    ];

    let pricing = PricingBinding::new("stay.nightlyRate")
        .with_fee("Service fee", "stay.serviceFee")
        .with_period("stay.checkIn", "stay.checkOut");

    Ok(FlowTemplate::new("hotel", "Hotel booking", steps)?
        .with_defaults(FormFields::from([("stay.guests", json!(2))]))
        .with_pricing(pricing))
}

pub fn car_rental_flow() -> CoreResult<FlowTemplate> {
    let rental = StepDefinition::new("rental", 1)
        .titled("Vehicle")
        .require_all(&["rental.vehicleId", "rental.pickupLocation"]);
    let steps = vec![
        with_price_rules(
            rental,
            "rental.dailyRate",
            &["rental.weeklyDiscount", "rental.monthlyDiscount"],
            &["rental.deliveryFee", "rental.insuranceFee"],
        ),
        StepDefinition::new("schedule", 2)
            .titled("Dates")
            .require_all(&["schedule.pickupDate", "schedule.returnDate"])
            .rule(FieldRule::not_in_past("schedule.pickupDate"))
            .rule(FieldRule::date_order("schedule.pickupDate", "schedule.returnDate")),
        StepDefinition::new("driver", 3)
            .titled("Driver")
            .require_all(&["driver.fullName", "driver.email", "driver.licenseNumber", "driver.age"])
            .rule(FieldRule::email("driver.email"))
            .rule(FieldRule::min_length("driver.licenseNumber", 5))
            .rule(FieldRule::number_range("driver.age", Decimal::from(21), Decimal::from(99))),
        review_step(4),
    ];

    let pricing = PricingBinding::new("rental.dailyRate")
        .with_discounts("rental.weeklyDiscount", "rental.monthlyDiscount")
        .with_fee("Delivery", "rental.deliveryFee")
        .with_fee("Insurance", "rental.insuranceFee")
        .with_period("schedule.pickupDate", "schedule.returnDate");

    Ok(FlowTemplate::new("car-rental", "Car rental", steps)?.with_pricing(pricing))
}

pub fn restaurant_flow() -> CoreResult<FlowTemplate> {
    let steps = vec![
        StepDefinition::new("reservation", 1)
            .titled("Reservation")
            .require_all(&[
                "reservation.restaurantId",
                "reservation.date",
                "reservation.time",
                "reservation.partySize",
            ])
            .rule(FieldRule::not_in_past("reservation.date"))
            .rule(FieldRule::number_range("reservation.partySize", Decimal::ONE, Decimal::from(20)))
            .with_validator(|fields| match fields.text("reservation.time") {
                Some(t) if !t.is_empty() && NaiveTime::parse_from_str(&t, "%H:%M").is_err() => {
                    ValidationResult::field_error("reservation.time", "Enter a time as HH:MM")
                }
                _ => ValidationResult::valid(),
            }),
        StepDefinition::new("contact", 2)
            .titled("Contact")
            .require_all(&["contact.name", "contact.email"])
            .rule(FieldRule::email("contact.email")),
        review_step(3),
    ];

    Ok(FlowTemplate::new("restaurant", "Restaurant reservation", steps)?
        .with_defaults(FormFields::from([("reservation.partySize", json!(2))])))
}

pub fn tour_flow() -> CoreResult<FlowTemplate> {
    let steps = vec![
        StepDefinition::new("tour", 1)
            .titled("Tour")
            .require_all(&["tour.tourId", "tour.date", "tour.participants"])
            .rule(FieldRule::not_in_past("tour.date"))
            .rule(FieldRule::number_range("tour.participants", Decimal::ONE, Decimal::from(30))),
        StepDefinition::new("travellers", 2)
            .titled("Travellers")
            .require_all(&["travellers.leadName", "travellers.leadEmail"])
            .rule(FieldRule::email("travellers.leadEmail")),
        payment_step(3),
        review_step(4),
    ];

    Ok(FlowTemplate::new("tour", "Tour booking", steps)?
        .with_defaults(FormFields::from([("tour.participants", json!(1))])))
}

/// Owner onboarding: list a vehicle for rent
pub fn vehicle_listing_flow() -> CoreResult<FlowTemplate> {
    let steps = vec![
        StepDefinition::new("vehicle", 1)
            .titled("Vehicle details")
            .require_all(&["vehicle.make", "vehicle.model", "vehicle.year", "vehicle.category"])
            .rule(FieldRule::number_range("vehicle.year", Decimal::from(1980), Decimal::from(2030)))
            .rule(FieldRule::one_of("vehicle.category", &["car", "van", "suv", "motorbike"])),
        StepDefinition::new("location", 2)
            .titled("Location")
            .require_all(&["location.city", "location.address"]),
        StepDefinition::new("photos", 3)
            .titled("Photos")
            .rule(FieldRule::non_empty_list("photos.urls")),
        StepDefinition::new("availability", 4)
            .titled("Availability")
            .require_all(&["availability.startDate", "availability.minDays"])
            .rule(FieldRule::not_in_past("availability.startDate"))
            .rule(FieldRule::number_range("availability.minDays", Decimal::ONE, Decimal::from(30))),
        with_price_rules(
            StepDefinition::new("pricing", 5)
                .titled("Pricing")
                .require("pricing.dailyRate"),
            "pricing.dailyRate",
            &["pricing.weeklyDiscount", "pricing.monthlyDiscount"],
            &["pricing.cleaningFee", "pricing.deliveryFee"],
        ),
        review_step(6),
    ];

    let pricing = PricingBinding::new("pricing.dailyRate")
        .with_discounts("pricing.weeklyDiscount", "pricing.monthlyDiscount")
        .with_fee("Cleaning", "pricing.cleaningFee")
        .with_fee("Delivery", "pricing.deliveryFee");

    Ok(FlowTemplate::new("vehicle-listing", "List your vehicle", steps)?
        .with_defaults(FormFields::from([
            ("pricing.weeklyDiscount", json!(0)),
            ("pricing.monthlyDiscount", json!(0)),
        ]))
        .with_pricing(pricing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_builtin_catalog_contains_all_flows() {
        let catalog = FlowCatalog::builtin().unwrap();
        assert_eq!(
            catalog.ids(),
            vec!["car-rental", "flight", "hotel", "restaurant", "tour", "vehicle-listing"]
        );
        assert!(catalog.get("cruise").is_none());
        for flow in catalog.iter() {
            assert_eq!(flow.registry.steps().last().unwrap().id, "review");
        }
    }

    #[test]
    fn test_pricing_binding_reads_fields() {
        let flow = vehicle_listing_flow().unwrap();
        let binding = flow.pricing.as_ref().unwrap();
        let fields = FormFields::from([
            ("pricing.dailyRate", json!("$85")),
            ("pricing.weeklyDiscount", json!(10)),
            ("pricing.monthlyDiscount", json!("bad")),
            ("pricing.cleaningFee", json!("25")),
        ]);

        assert_eq!(binding.base_rate(&fields), Some(dec!(85)));
        assert_eq!(binding.tiers(&fields), DiscountTiers::new(dec!(10), dec!(0)));
        assert_eq!(binding.fees(&fields), vec![Fee::new("Cleaning", dec!(25))]);
        assert!(binding.watches("pricing.deliveryFee"));
        assert!(!binding.watches("vehicle.make"));
        assert_eq!(binding.period_days(&fields), None);
    }

    #[test]
    fn test_period_days_from_dates() {
        let flow = hotel_flow().unwrap();
        let binding = flow.pricing.as_ref().unwrap();
        let fields = FormFields::from([
            ("stay.checkIn", json!("2031-05-01")),
            ("stay.checkOut", json!("2031-05-08")),
        ]);
        assert_eq!(binding.period_days(&fields), Some(7));

        let reversed = FormFields::from([
            ("stay.checkIn", json!("2031-05-08")),
            ("stay.checkOut", json!("2031-05-01")),
        ]);
        assert_eq!(binding.period_days(&reversed), None);
    }

    #[test]
    fn test_listing_pricing_step_limits_discounts() {
        let flow = vehicle_listing_flow().unwrap();
        let index = flow.registry.index_of("pricing").unwrap();
        let step = flow.registry.get(index).unwrap();

        let fields = FormFields::from([
            ("pricing.dailyRate", json!("60")),
            ("pricing.weeklyDiscount", json!(55)),
            ("pricing.monthlyDiscount", json!(-1)),
        ]);
        let result = step.validate(&fields);
        assert_eq!(result.error_for("pricing.weeklyDiscount"), Some("Must be between 0 and 50"));
        assert_eq!(result.error_for("pricing.monthlyDiscount"), Some("Must be between 0 and 50"));
    }

    #[test]
    fn test_every_priced_field_is_validated() {
        let catalog = FlowCatalog::builtin().unwrap();
        for flow in catalog.iter() {
            let Some(binding) = &flow.pricing else {
                continue;
            };
            let checked: Vec<&str> = flow
                .registry
                .steps()
                .iter()
                .flat_map(|step| step.rules.iter())
                .flat_map(|rule| match rule {
                    FieldRule::DateOrder { start, end } => vec![start.as_str(), end.as_str()],
                    other => vec![other.target()],
                })
                .collect();

            for key in binding.keys() {
                assert!(checked.contains(&key), "{}: '{}' has no rule", flow.id, key);
            }
        }
    }

    #[test]
    fn test_rental_and_hotel_reject_out_of_range_pricing() {
        let car = car_rental_flow().unwrap();
        let fields = FormFields::from([
            ("rental.vehicleId", json!("v-1")),
            ("rental.pickupLocation", json!("LIS")),
            ("rental.dailyRate", json!("100")),
            ("rental.weeklyDiscount", json!(150)),
            ("rental.insuranceFee", json!(-20)),
        ]);
        let result = car.registry.get(0).unwrap().validate(&fields);
        assert_eq!(result.error_for("rental.weeklyDiscount"), Some("Must be between 0 and 50"));
        assert_eq!(result.error_for("rental.insuranceFee"), Some("Must be between 0 and 1000000"));

        let hotel = hotel_flow().unwrap();
        let fields = FormFields::from([
            ("stay.hotelId", json!("h-1")),
            ("stay.checkIn", json!("2099-05-01")),
            ("stay.checkOut", json!("2099-05-03")),
            ("stay.nightlyRate", json!("10000000000000000000000000000")),
            ("stay.serviceFee", json!(-500)),
        ]);
        let result = hotel.registry.get(0).unwrap().validate(&fields);
        assert_eq!(result.error_for("stay.serviceFee"), Some("Must be between 0 and 1000000"));
        assert_eq!(result.error_for("stay.nightlyRate"), Some("Must be between 0 and 1000000"));
    }

    #[test]
    fn test_flight_destination_must_differ() {
        let flow = flight_flow().unwrap();
        let step = flow.registry.get(0).unwrap();
        let fields = FormFields::from([
            ("flight.origin", json!("LIS")),
            ("flight.destination", json!("lis")),
            ("flight.departDate", json!("2099-01-01")),
            ("flight.passengers", json!(2)),
        ]);
        assert_eq!(
            step.validate(&fields).error_for("flight.destination"),
            Some("Destination must differ from origin")
        );
    }

    #[test]
    fn test_restaurant_time_format() {
        let flow = restaurant_flow().unwrap();
        let step = flow.registry.get(0).unwrap();
        let mut fields = FormFields::from([
            ("reservation.restaurantId", json!("r-1")),
            ("reservation.date", json!("2099-01-01")),
            ("reservation.time", json!("7pm")),
        ]);
        assert_eq!(
            step.validate(&fields).error_for("reservation.time"),
            Some("Enter a time as HH:MM")
        );

        fields.insert("reservation.time", json!("19:30"));
        fields.insert("reservation.partySize", json!(4));
        assert!(step.validate(&fields).is_valid());
    }
}
