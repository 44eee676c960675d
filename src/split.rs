// ➗ Split Engine - who owes the payer how much
//
// Equal split:
//   share = round_half_up(amount / |members|)
//   payer keeps exactly `share`; the rounding drift (amount - share × n,
//   a whole number of cents) is spread one cent at a time over the owing
//   members in ascending stable-id order.
//
// Custom split:
//   caller declares every member's share; we only validate that the
//   shares are non-negative, belong to members, and sum to the amount.

use crate::error::{LedgerError, LedgerResult};
use crate::identity::StableId;
use crate::money::{is_representable, one_cent, quantize, validate_amount};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// ============================================================================
// SPLIT POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomShare {
    pub member: StableId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Everyone (payer included) carries the same share
    #[default]
    Equal,

    /// Explicit per-member amounts, payer's own share included
    Custom { shares: Vec<CustomShare> },
}

// ============================================================================
// SPLIT SHARE (engine output)
// ============================================================================

/// One owing member and what they owe the payer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitShare {
    pub member: StableId,
    pub owed: Decimal,
}

// ============================================================================
// SPLIT ENGINE
// ============================================================================

pub struct SplitEngine {
    /// Allowed gap between declared custom shares and the amount (default: 0.01)
    pub tolerance: Decimal,
}

impl SplitEngine {
    pub fn new() -> Self {
        SplitEngine {
            tolerance: one_cent(),
        }
    }

    pub fn with_tolerance(tolerance: Decimal) -> Self {
        SplitEngine { tolerance }
    }

    /// Compute owed amounts for every owing member
    ///
    /// The result has one entry per owing member, ordered by stable id.
    /// The payer never appears in it.
    pub fn compute_splits(
        &self,
        expense_amount: Decimal,
        payer: StableId,
        members: &[StableId],
        policy: &SplitPolicy,
    ) -> LedgerResult<Vec<SplitShare>> {
        let amount = validate_amount(expense_amount)?;

        let members: BTreeSet<StableId> = members.iter().copied().collect();
        if members.is_empty() {
            return Err(LedgerError::EmptyMemberSet);
        }
        if !members.contains(&payer) {
            return Err(LedgerError::PayerNotMember(payer));
        }

        let owing = match policy {
            SplitPolicy::Equal => self.equal_split(amount, payer, &members)?,
            SplitPolicy::Custom { shares } => self.custom_split(amount, payer, &members, shares)?,
        };

        // A group expense nobody owes anything on is not a split
        if owing.is_empty() {
            return Err(LedgerError::EmptyMemberSet);
        }
        Ok(owing)
    }

    /// What the payer carries themself, given the owed entries
    pub fn payer_share(&self, expense_amount: Decimal, owed: &[SplitShare]) -> Decimal {
        expense_amount - owed.iter().map(|s| s.owed).sum::<Decimal>()
    }

    fn equal_split(
        &self,
        amount: Decimal,
        payer: StableId,
        members: &BTreeSet<StableId>,
    ) -> LedgerResult<Vec<SplitShare>> {
        let count = Decimal::from(members.len() as u64);
        let share = quantize(amount / count);

        let drift = amount - share * count;
        let drift_cents = (drift / one_cent())
            .trunc()
            .to_i64()
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{} cannot be split", amount)))?;

        let mut owing: Vec<SplitShare> = members
            .iter()
            .filter(|member| **member != payer)
            .map(|member| SplitShare {
                member: *member,
                owed: share,
            })
            .collect();

        // |drift| <= n/2 cents, always fewer than the owing members when n >= 2
        let step = if drift_cents >= 0 { one_cent() } else { -one_cent() };
        if !owing.is_empty() {
            let len = owing.len();
            for i in 0..drift_cents.unsigned_abs() as usize {
                owing[i % len].owed += step;
            }
        }

        Ok(owing)
    }

    fn custom_split(
        &self,
        amount: Decimal,
        payer: StableId,
        members: &BTreeSet<StableId>,
        shares: &[CustomShare],
    ) -> LedgerResult<Vec<SplitShare>> {
        let mut seen = HashSet::new();
        let mut total = Decimal::ZERO;

        for share in shares {
            if share.amount < Decimal::ZERO {
                return Err(LedgerError::SplitMismatch(format!(
                    "member {} has a negative share {}",
                    share.member, share.amount
                )));
            }
            if !is_representable(share.amount) {
                return Err(LedgerError::SplitMismatch(format!(
                    "member {} share {} has more than two decimals",
                    share.member, share.amount
                )));
            }
            if !seen.insert(share.member) {
                return Err(LedgerError::SplitMismatch(format!(
                    "member {} appears more than once",
                    share.member
                )));
            }
            if share.amount > Decimal::ZERO && !members.contains(&share.member) {
                return Err(LedgerError::SplitMismatch(format!(
                    "member {} is not in the group",
                    share.member
                )));
            }
            total += share.amount;
        }

        if (total - amount).abs() > self.tolerance {
            return Err(LedgerError::SplitMismatch(format!(
                "shares sum to {} but the expense is {}",
                total, amount
            )));
        }

        let mut owing: Vec<SplitShare> = shares
            .iter()
            .filter(|share| share.amount > Decimal::ZERO && share.member != payer)
            .map(|share| SplitShare {
                member: share.member,
                owed: quantize(share.amount),
            })
            .collect();
        owing.sort_by_key(|share| share.member);

        Ok(owing)
    }
}

impl Default for SplitEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
