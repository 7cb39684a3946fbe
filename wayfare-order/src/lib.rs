pub mod flows;
pub mod manager;
pub mod models;
pub mod session;
pub mod submission;

pub use flows::{FlowCatalog, FlowTemplate, PricingBinding};
pub use manager::{SessionError, SessionManager};
pub use models::{SubmissionResult, SubmissionStatus};
pub use session::{SessionSnapshot, SubmitError, WizardSession};
pub use submission::{InFlightFlag, MockBookingGateway, SubmissionHandler, DEFAULT_SUBMIT_TIMEOUT};
