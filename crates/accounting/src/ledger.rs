use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{DomainError, DomainResult, JournalEntryId};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Signed change to the cached balance for one journal line.
    ///
    /// Debit-normal kinds (asset, expense) grow with debits; credit-normal kinds
    /// (liability, equity, revenue) grow with credits.
    pub fn balance_delta(self, debit: i64, credit: i64) -> i64 {
        match self {
            AccountKind::Asset | AccountKind::Expense => debit - credit,
            AccountKind::Liability | AccountKind::Equity | AccountKind::Revenue => credit - debit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Asset => "ASSET",
            AccountKind::Liability => "LIABILITY",
            AccountKind::Equity => "EQUITY",
            AccountKind::Revenue => "REVENUE",
            AccountKind::Expense => "EXPENSE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASSET" => Some(AccountKind::Asset),
            "LIABILITY" => Some(AccountKind::Liability),
            "EQUITY" => Some(AccountKind::Equity),
            "REVENUE" => Some(AccountKind::Revenue),
            "EXPENSE" => Some(AccountKind::Expense),
            _ => None,
        }
    }
}

/// Chart-of-accounts record with its cached running balance.
///
/// `balance` is derived from posted journal entries and is only ever moved by the
/// journal poster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlAccount {
    pub code: String, // e.g. "1310"
    pub name: String, // e.g. "Raw Materials"
    pub kind: AccountKind,
    /// Minor currency units, sign per `AccountKind::balance_delta`.
    pub balance: i64,
}

/// One line of a journal entry. Exactly one of `debit`/`credit` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_code: String,
    /// Minor currency units.
    pub debit: i64,
    /// Minor currency units.
    pub credit: i64,
}

impl JournalLine {
    pub fn debit(account_code: impl Into<String>, amount: i64) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: 0,
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: i64) -> Self {
        Self {
            account_code: account_code.into(),
            debit: 0,
            credit: amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Posted,
}

impl JournalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalStatus::Posted => "POSTED",
        }
    }
}

/// Immutable, balanced journal entry.
///
/// Corrections are made by posting a new, opposite entry; a posted entry is never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub description: String,
    pub reference: String,
    pub entry_date: DateTime<Utc>,
    pub status: JournalStatus,
    pub lines: Vec<JournalLine>,
}

/// Totals of a set of lines, widened so long entries cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalTotals {
    pub debit: i128,
    pub credit: i128,
}

impl JournalTotals {
    pub fn of(lines: &[JournalLine]) -> Self {
        lines.iter().fold(
            JournalTotals {
                debit: 0,
                credit: 0,
            },
            |acc, l| JournalTotals {
                debit: acc.debit + l.debit as i128,
                credit: acc.credit + l.credit as i128,
            },
        )
    }

    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }
}

impl JournalEntry {
    /// Validate `lines` and build a POSTED entry.
    ///
    /// Account existence is checked by the caller against the chart of accounts.
    pub fn post(
        description: impl Into<String>,
        reference: impl Into<String>,
        entry_date: DateTime<Utc>,
        lines: Vec<JournalLine>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }

        for line in &lines {
            if line.account_code.trim().is_empty() {
                return Err(DomainError::validation("journal line must name an account"));
            }
            if line.debit < 0 || line.credit < 0 {
                return Err(DomainError::validation("journal amounts cannot be negative"));
            }
            if line.debit != 0 && line.credit != 0 {
                return Err(DomainError::validation(
                    "journal line cannot carry both a debit and a credit",
                ));
            }
        }

        let totals = JournalTotals::of(&lines);
        if !totals.is_balanced() {
            return Err(DomainError::UnbalancedJournal {
                debit: saturate(totals.debit),
                credit: saturate(totals.credit),
            });
        }

        Ok(Self {
            id: JournalEntryId::new(),
            description: description.into(),
            reference: reference.into(),
            entry_date,
            status: JournalStatus::Posted,
            lines,
        })
    }

    /// Distinct account codes referenced by this entry, in code order.
    pub fn account_codes(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|l| l.account_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn totals(&self) -> JournalTotals {
        JournalTotals::of(&self.lines)
    }
}

fn saturate(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn balanced_entry_is_posted() {
        let lines = vec![
            JournalLine::debit("1320", 105_000),
            JournalLine::credit("1310", 105_000),
        ];
        let entry = JournalEntry::post("Material issue", "WO-0001", test_time(), lines.clone())
            .unwrap();
        assert_eq!(entry.status, JournalStatus::Posted);
        assert_eq!(entry.lines, lines);
        assert_eq!(entry.account_codes(), vec!["1310".to_string(), "1320".to_string()]);
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let lines = vec![JournalLine::debit("1000", 100), JournalLine::credit("2000", 90)];
        let err = JournalEntry::post("x", "y", test_time(), lines).unwrap_err();
        assert_eq!(err, DomainError::UnbalancedJournal { debit: 100, credit: 90 });
    }

    #[test]
    fn a_single_cent_off_is_unbalanced() {
        let lines = vec![JournalLine::debit("1000", 10_001), JournalLine::credit("2000", 10_000)];
        assert!(matches!(
            JournalEntry::post("x", "y", test_time(), lines),
            Err(DomainError::UnbalancedJournal { .. })
        ));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(JournalEntry::post("x", "y", test_time(), vec![]).is_err());

        let negative = vec![JournalLine::debit("1000", -5), JournalLine::credit("2000", -5)];
        assert!(matches!(
            JournalEntry::post("x", "y", test_time(), negative),
            Err(DomainError::Validation(_))
        ));

        let both = vec![JournalLine {
            account_code: "1000".to_string(),
            debit: 5,
            credit: 5,
        }];
        assert!(matches!(
            JournalEntry::post("x", "y", test_time(), both),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn sign_convention_follows_normal_balance() {
        assert_eq!(AccountKind::Asset.balance_delta(100, 0), 100);
        assert_eq!(AccountKind::Asset.balance_delta(0, 100), -100);
        assert_eq!(AccountKind::Expense.balance_delta(40, 0), 40);
        assert_eq!(AccountKind::Liability.balance_delta(0, 100), 100);
        assert_eq!(AccountKind::Equity.balance_delta(100, 0), -100);
        assert_eq!(AccountKind::Revenue.balance_delta(0, 25), 25);
    }

    #[test]
    fn kind_parse_is_case_insensitive() {
        assert_eq!(AccountKind::parse("asset"), Some(AccountKind::Asset));
        assert_eq!(AccountKind::parse("REVENUE"), Some(AccountKind::Revenue));
        assert_eq!(AccountKind::parse("cash"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any set of posted entries, debits minus credits is zero.
        #[test]
        fn debits_equal_credits_in_posted_entries(
            amounts in prop::collection::vec(1i64..1_000_000_000i64, 1..10)
        ) {
            let mut total: i128 = 0;
            for amount in amounts {
                let entry = JournalEntry::post(
                    "prop",
                    "prop",
                    test_time(),
                    vec![JournalLine::debit("1320", amount), JournalLine::credit("1310", amount)],
                ).unwrap();
                let t = entry.totals();
                total += t.debit - t.credit;
            }
            prop_assert_eq!(total, 0);
        }

        /// Property: a balanced entry moving value between two asset accounts leaves the
        /// summed asset balance unchanged.
        #[test]
        fn asset_to_asset_transfer_preserves_total(amount in 1i64..1_000_000_000i64) {
            let debit = AccountKind::Asset.balance_delta(amount, 0);
            let credit = AccountKind::Asset.balance_delta(0, amount);
            prop_assert_eq!(debit + credit, 0);
        }
    }
}
