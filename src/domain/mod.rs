//! Framework-agnostic wallet ledger model.

pub mod chain;
pub mod event;
pub mod lifecycle;
pub mod status;
pub mod transaction;

pub use chain::{audit_chain, chain_head, in_link_order, ChainLink, ChainViolation};
pub use event::TransactionEvent;
pub use lifecycle::{transition, Effect, Transition, Trigger, TRANSITIONS};
pub use status::TransactionStatus;
pub use transaction::{Transaction, User};
