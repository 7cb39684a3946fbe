pub mod models;
pub mod pii;

pub use models::events::WizardEvent;
pub use pii::Masked;
