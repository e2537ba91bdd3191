//! Core types for the ledger space
//!
//! The engine is account-identity-agnostic: accounts are positional
//! indices, dates are packed calendar integers, and moments are
//! caller-assigned sequence identifiers. Nothing in here knows about
//! debit/credit conventions or account semantics.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Signed fixed-point amount in integer cents (real value x100).
pub type Amount = i64;

/// 1-based positional index into an externally-maintained,
/// creation-ordered list of ledger accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account(u32);

impl Account {
    /// Create an account index. Index 0 is never assigned by the
    /// accounting layer; the engine does not reject it.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw positional index.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calendar day packed as `year*10000 + month*100 + day`
/// (e.g. 20140501). Also used as a bucket key by projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Date(u32);

impl Date {
    /// Wrap an already-packed date value.
    pub fn new(packed: u32) -> Self {
        Self(packed)
    }

    /// Pack a year/month/day triple.
    pub fn from_ymd(year: u32, month: u32, day: u32) -> Self {
        Self(year * 10000 + month * 100 + day)
    }

    /// Convert a calendar date to the packed encoding.
    pub fn from_calendar(date: NaiveDate) -> Self {
        Self::from_ymd(date.year() as u32, date.month(), date.day())
    }

    /// Convert back to a calendar date. `None` when the packed value
    /// does not name a real day (projections may emit such keys).
    pub fn to_calendar(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            (self.0 / 10000) as i32,
            self.0 / 100 % 100,
            self.0 % 100,
        )
    }

    /// The raw packed value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-assigned, strictly-ordered insertion identifier, typically a
/// nanosecond timestamp. Moments are assumed unique within one Space;
/// the engine does not enforce this. A transaction's metadata may
/// reference a prior moment to mark it superseded (tombstone); the
/// engine never interprets that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Moment(u64);

impl Moment {
    /// Wrap a raw moment value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive date interval: `start <= d <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day in the interval.
    pub start: Date,
    /// Last day in the interval, included.
    pub end: Date,
}

impl DateRange {
    /// Build an inclusive range.
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    /// Inclusive membership on both ends.
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Inclusive moment interval: `start <= m <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentRange {
    /// First moment in the interval.
    pub start: Moment,
    /// Last moment in the interval, included.
    pub end: Moment,
}

impl MomentRange {
    /// Build an inclusive range.
    pub fn new(start: Moment, end: Moment) -> Self {
        Self { start, end }
    }

    /// Inclusive membership on both ends.
    pub fn contains(&self, moment: Moment) -> bool {
        self.start <= moment && moment <= self.end
    }
}

/// Per-transaction entry set: account to amount. No two entries of one
/// transaction share an account. Iteration order is unspecified;
/// compare entry sets as maps, never as sequences.
pub type Entries = HashMap<Account, Amount>;

/// One ledger transaction.
///
/// `metadata` is an engine-opaque blob: the accounting layer serializes
/// memo/tags/user/tombstone-reference into it, and the engine stores
/// and returns it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Insertion identifier, unique within a space.
    pub moment: Moment,
    /// Calendar day of the transaction.
    pub date: Date,
    /// Account/amount pairs.
    pub entries: Entries,
    /// Opaque metadata blob, returned verbatim.
    #[serde(with = "serde_bytes")]
    pub metadata: Vec<u8>,
}

impl Transaction {
    /// The slice/projection predicate: the date lies in the union of
    /// `dates`, the moment in the union of `moments`, and at least one
    /// entry's account is in `accounts`. An empty account list matches
    /// every transaction; empty date or moment lists match none.
    pub fn matches(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> bool {
        dates.iter().any(|r| r.contains(self.date))
            && moments.iter().any(|r| r.contains(self.moment))
            && (accounts.is_empty() || self.entries.keys().any(|a| accounts.contains(a)))
    }
}

/// Account filter with empty-matches-all semantics.
pub(crate) fn account_matches(accounts: &[Account], account: Account) -> bool {
    accounts.is_empty() || accounts.contains(&account)
}
