//! Dense 3-D array primitive for the small-space variant
//!
//! Axes are account x date x moment; values are flattened row-major
//! into one buffer. Cell value 0 means "no entry".

use crate::types::Amount;

/// Dense account/date/moment value cube.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    accounts: usize,
    dates: usize,
    moments: usize,
    values: Vec<Amount>,
}

impl Array {
    /// Zero-filled array of the given dimensions.
    pub fn new(accounts: usize, dates: usize, moments: usize) -> Self {
        Self {
            accounts,
            dates,
            moments,
            values: vec![0; accounts * dates * moments],
        }
    }

    /// (accounts, dates, moments) extents.
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.accounts, self.dates, self.moments)
    }

    /// True when any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.accounts == 0 || self.dates == 0 || self.moments == 0
    }

    fn index(&self, account: usize, date: usize, moment: usize) -> usize {
        debug_assert!(account < self.accounts && date < self.dates && moment < self.moments);
        (account * self.dates + date) * self.moments + moment
    }

    /// Cell value.
    pub fn get(&self, account: usize, date: usize, moment: usize) -> Amount {
        self.values[self.index(account, date, moment)]
    }

    /// Set a cell value.
    pub fn set(&mut self, account: usize, date: usize, moment: usize, value: Amount) {
        let index = self.index(account, date, moment);
        self.values[index] = value;
    }

    /// Copy every non-zero cell of `other` into this array, shifted by
    /// the given date/moment offsets. The destination must be large
    /// enough to hold the shifted extents.
    pub fn embed(&mut self, other: &Array, date_offset: usize, moment_offset: usize) {
        let (accounts, dates, moments) = other.dimensions();
        for i in 0..accounts {
            for j in 0..dates {
                for k in 0..moments {
                    let value = other.get(i, j, k);
                    if value != 0 {
                        self.set(i, j + date_offset, k + moment_offset, value);
                    }
                }
            }
        }
    }
}
