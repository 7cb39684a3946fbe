pub mod draft;
pub mod gateway;
pub mod listeners;
pub mod navigator;
pub mod step;

pub use draft::{BookingDraft, FormFields};
pub use gateway::{BookingGateway, BookingRequest, GatewayError, GatewayResponse};
pub use listeners::{Listener, Listeners, SubscriptionId};
pub use navigator::{NavigationError, StepNavigator, WizardState};
pub use step::{FieldRule, StepDefinition, StepRegistry, ValidationResult};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid step registry: {0}")]
    InvalidRegistry(String),
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
