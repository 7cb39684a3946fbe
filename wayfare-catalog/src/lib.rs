pub mod pricing;

pub use pricing::{
    DiscountTiers, Fee, PriceCalculator, PricePreview, PriceQuote, PricingConfig, MAX_AMOUNT,
};
