//! Accounting module (double-entry journal and chart-of-accounts balances).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod ledger;

pub use ledger::{
    AccountKind, GlAccount, JournalEntry, JournalLine, JournalStatus, JournalTotals,
};
