//! Transaction lifecycle transition table.
//!
//! Every legal status change is one row of [`TRANSITIONS`]. Anything not in
//! the table is illegal, which is how "status never moves backward" holds.

use super::status::TransactionStatus;

/// What causes a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Worker chained a pending entry against the user's balance.
    Verify,
    /// Client asked to confirm a verified entry.
    Confirm,
    /// Worker settled a confirming entry.
    Finalize,
}

/// Side effects attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Compute `prev_transaction_id`, `prev_balance`, `balance` from the chain head.
    LinkChain,
    /// Write the new head balance to the user row.
    SettleBalance,
    /// Publish a status event after the row is updated.
    Announce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TransactionStatus,
    pub trigger: Trigger,
    pub to: TransactionStatus,
    pub effects: &'static [Effect],
}

impl Transition {
    pub fn has(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

pub const TRANSITIONS: [Transition; 3] = [
    Transition {
        from: TransactionStatus::Pending,
        trigger: Trigger::Verify,
        to: TransactionStatus::Verified,
        effects: &[Effect::LinkChain, Effect::Announce],
    },
    Transition {
        from: TransactionStatus::Verified,
        trigger: Trigger::Confirm,
        to: TransactionStatus::Confirming,
        effects: &[Effect::Announce],
    },
    Transition {
        from: TransactionStatus::Confirming,
        trigger: Trigger::Finalize,
        to: TransactionStatus::Completed,
        effects: &[Effect::LinkChain, Effect::SettleBalance, Effect::Announce],
    },
];

/// Looks up the transition for `(from, trigger)`, if it is legal.
pub fn transition(from: TransactionStatus, trigger: Trigger) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.trigger == trigger)
}

impl Trigger {
    /// Each trigger owns exactly one row of the table.
    pub fn transition(self) -> &'static Transition {
        match self {
            Trigger::Verify => &TRANSITIONS[0],
            Trigger::Confirm => &TRANSITIONS[1],
            Trigger::Finalize => &TRANSITIONS[2],
        }
    }
}

impl TransactionStatus {
    /// The trigger the confirmation worker fires for a row in this status.
    pub fn worker_trigger(self) -> Option<Trigger> {
        match self {
            TransactionStatus::Pending => Some(Trigger::Verify),
            TransactionStatus::Confirming => Some(Trigger::Finalize),
            TransactionStatus::Verified | TransactionStatus::Completed => None,
        }
    }
}
