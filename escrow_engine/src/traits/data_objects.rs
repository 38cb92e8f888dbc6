use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db_types::{PaymentAccount, PaymentMethod, PaymentTransaction, PayoutAccount, Wallet};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// One-based pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn is_valid(&self) -> bool {
        self.page >= 1 && self.limit >= 1
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HistoryEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub transaction: PaymentTransaction,
    /// True when the user was the recipient rather than the sender
    pub inbound: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub account: PaymentAccount,
    pub wallets: Vec<Wallet>,
    pub payout_accounts: Vec<PayoutAccount>,
    pub payment_methods: Vec<PaymentMethod>,
}

#[cfg(test)]
mod test {
    use super::Pagination;

    #[test]
    fn offsets() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(3, 10).offset(), 20);
        assert!(!Pagination::new(0, 10).is_valid());
        assert!(!Pagination::new(1, 0).is_valid());
        assert!(Pagination::default().is_valid());
    }
}
