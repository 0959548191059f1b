pub mod confirmation;
pub mod verification;
pub mod worker;

pub use confirmation::{ConfirmOutcome, ConfirmationService};
pub use verification::{TopUpPolicy, TopUpRequest, VerificationService};
pub use worker::{ConfirmationWorker, WorkerOutcome};
