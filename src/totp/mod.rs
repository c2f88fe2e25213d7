pub mod crypto;
pub mod models;
pub mod qr;
pub mod repo;
pub mod secret;
pub mod service;

pub use service::{ConfirmOutcome, Enrollment, TotpService};
