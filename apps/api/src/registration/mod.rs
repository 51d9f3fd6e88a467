pub mod draft;
pub mod flow;
pub mod handlers;

pub use draft::{CallbackQuery, PaymentCallback, RegistrationDraft, RegistrationForm};
pub use flow::{RegistrationFlow, RegistrationState};
