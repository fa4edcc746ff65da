use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use shopfloor_accounting::{GlAccount, JournalEntry, JournalLine};
use shopfloor_core::DomainError;

use crate::store::ErpTransaction;

use super::EngineResult;

/// Validate `lines`, record a POSTED journal entry and apply it to the account balances.
///
/// Accounts are never auto-created: a line naming a missing code fails the whole posting
/// with `UnknownAccount` before anything is written.
pub async fn post_balanced_journal(
    tx: &mut dyn ErpTransaction,
    description: &str,
    reference: &str,
    lines: Vec<JournalLine>,
    entry_date: DateTime<Utc>,
) -> EngineResult<JournalEntry> {
    let entry = JournalEntry::post(description, reference, entry_date, lines)?;

    let codes = entry.account_codes();
    let accounts: HashMap<String, GlAccount> = tx
        .gl_accounts(&codes)
        .await?
        .into_iter()
        .map(|a| (a.code.clone(), a))
        .collect();
    if let Some(missing) = codes.iter().find(|c| !accounts.contains_key(*c)) {
        return Err(DomainError::UnknownAccount(missing.clone()).into());
    }

    tx.insert_journal_entry(&entry).await?;

    for line in &entry.lines {
        let account = accounts
            .get(&line.account_code)
            .ok_or_else(|| DomainError::UnknownAccount(line.account_code.clone()))?;
        let delta = account.kind.balance_delta(line.debit, line.credit);
        if delta != 0 {
            tx.increment_account_balance(&line.account_code, delta).await?;
        }
    }

    debug!(
        journal_entry_id = %entry.id,
        reference,
        debit = entry.totals().debit as i64,
        "journal entry posted"
    );
    Ok(entry)
}
