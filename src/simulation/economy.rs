use std::collections::HashMap;
use std::fmt;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::simulation::collaborators::InvestigationContext;
use crate::simulation::track::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars.saturating_mul(100),
        }
    }

    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn cents(self) -> i64 {
        self.cents
    }

    pub fn as_dollars(self) -> i64 {
        self.cents / 100
    }

    pub fn add(self, other: Money) -> Self {
        Self {
            cents: self.cents.saturating_add(other.cents),
        }
    }

    pub fn sub(self, other: Money) -> Self {
        Self {
            cents: self.cents.saturating_sub(other.cents),
        }
    }

    pub fn scale(self, factor: f64) -> Self {
        let scaled = (self.cents as f64 * factor).round() as i64;
        Self { cents: scaled }
    }

    pub fn is_zero(self) -> bool {
        self.cents == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.cents / 100;
        let cents = self.cents.abs() % 100;
        let sign = if self.cents < 0 { "-" } else { "" };
        let formatted = format_dollars(dollars.abs());
        write!(f, "{}${}.{:02}", sign, formatted, cents)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub liquid: Money,
    pub frozen: Money,
    pub legitimate_income: Money,
    pub total_income: Money,
    /// Set by gameplay when a witness, informant or paper trail exists.
    pub evidence: bool,
}

impl Account {
    pub fn legitimacy(&self) -> f64 {
        if self.total_income.cents() <= 0 {
            return 1.0;
        }
        (self.legitimate_income.cents() as f64 / self.total_income.cents() as f64).clamp(0.0, 1.0)
    }
}

/// Tracked funds per owner. Plays the economy collaborator for investigations.
#[derive(Resource, Debug, Clone, Default)]
pub struct FinanceState {
    accounts: HashMap<OwnerId, Account>,
}

impl FinanceState {
    pub fn account(&self, owner: OwnerId) -> Option<&Account> {
        self.accounts.get(&owner)
    }

    fn account_mut(&mut self, owner: OwnerId) -> &mut Account {
        self.accounts.entry(owner).or_default()
    }

    pub fn record_income(&mut self, owner: OwnerId, amount: Money, legitimate: bool) {
        let account = self.account_mut(owner);
        account.liquid = account.liquid.add(amount);
        account.total_income = account.total_income.add(amount);
        if legitimate {
            account.legitimate_income = account.legitimate_income.add(amount);
        }
    }

    /// Frozen funds cannot be spent. Returns false when liquid funds fall short.
    pub fn spend(&mut self, owner: OwnerId, amount: Money) -> bool {
        let account = self.account_mut(owner);
        if account.liquid < amount {
            return false;
        }
        account.liquid = account.liquid.sub(amount);
        true
    }

    pub fn set_evidence(&mut self, owner: OwnerId, evidence: bool) {
        self.account_mut(owner).evidence = evidence;
    }
}

impl InvestigationContext for FinanceState {
    fn legitimacy(&self, owner: OwnerId) -> f64 {
        self.account(owner).map_or(1.0, Account::legitimacy)
    }

    fn has_evidence(&self, owner: OwnerId) -> bool {
        self.account(owner).map_or(false, |account| account.evidence)
    }

    fn freeze_funds(&mut self, owner: OwnerId, fraction: f64) -> Money {
        let account = self.account_mut(owner);
        let amount = account.liquid.max(Money::zero()).scale(fraction.clamp(0.0, 1.0));
        account.liquid = account.liquid.sub(amount);
        account.frozen = account.frozen.add(amount);
        amount
    }

    fn release_funds(&mut self, owner: OwnerId, amount: Money) {
        let account = self.account_mut(owner);
        let amount = amount.min(account.frozen);
        account.frozen = account.frozen.sub(amount);
        account.liquid = account.liquid.add(amount);
    }

    fn seize_funds(&mut self, owner: OwnerId, amount: Money) {
        let account = self.account_mut(owner);
        let amount = amount.min(account.frozen);
        account.frozen = account.frozen.sub(amount);
    }
}

fn format_dollars(mut value: i64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut parts = Vec::new();
    while value > 0 {
        parts.push(format!("{:03}", value % 1000));
        value /= 1000;
    }
    if let Some(last) = parts.last_mut() {
        *last = last.trim_start_matches('0').to_string();
        if last.is_empty() {
            *last = "0".to_string();
        }
    }
    parts.reverse();
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: OwnerId = OwnerId(1);

    #[test]
    fn money_formats_with_separators() {
        assert_eq!(Money::from_dollars(1_234_567).to_string(), "$1,234,567.00");
        assert_eq!(Money::from_cents(-1_050).to_string(), "-$10.50");
    }

    #[test]
    fn legitimacy_is_share_of_clean_income() {
        let mut finances = FinanceState::default();
        assert_eq!(finances.legitimacy(OWNER), 1.0);
        finances.record_income(OWNER, Money::from_dollars(300), true);
        finances.record_income(OWNER, Money::from_dollars(700), false);
        assert!((finances.legitimacy(OWNER) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn freeze_release_and_seize_move_funds() {
        let mut finances = FinanceState::default();
        finances.record_income(OWNER, Money::from_dollars(1_000), true);

        let frozen = finances.freeze_funds(OWNER, 0.5);
        assert_eq!(frozen, Money::from_dollars(500));
        assert!(!finances.spend(OWNER, Money::from_dollars(600)));

        finances.release_funds(OWNER, Money::from_dollars(200));
        let account = finances.account(OWNER).cloned().unwrap_or_default();
        assert_eq!(account.liquid, Money::from_dollars(700));
        assert_eq!(account.frozen, Money::from_dollars(300));

        finances.seize_funds(OWNER, Money::from_dollars(1_000));
        let account = finances.account(OWNER).cloned().unwrap_or_default();
        assert_eq!(account.frozen, Money::zero());
        assert_eq!(account.liquid, Money::from_dollars(700));
    }
}
