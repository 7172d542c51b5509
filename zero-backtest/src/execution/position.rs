//! Position tracking for T+1 compliance.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An open holding, owned by [`super::PortfolioState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Shares held, a multiple of the lot size
    pub shares: u64,
    /// Average fill price, excluding commission
    pub avg_cost: f64,
    /// Date of the most recent BUY
    pub buy_date: NaiveDate,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_rate: f64,
    /// False until the first mark after `buy_date`
    pub can_sell: bool,
    /// Buy-side commissions paid into this position
    pub entry_commission: f64,
}

impl Position {
    /// Open a position on `buy_date`; locked until the next trading day
    pub fn open(
        symbol: impl Into<String>,
        shares: u64,
        price: f64,
        buy_date: NaiveDate,
        commission: f64,
    ) -> Self {
        let mut position = Self {
            symbol: symbol.into(),
            shares,
            avg_cost: price,
            buy_date,
            current_price: price,
            market_value: 0.0,
            unrealized_pnl: 0.0,
            unrealized_pnl_rate: 0.0,
            can_sell: false,
            entry_commission: commission,
        };
        position.update_price(price);
        position
    }

    /// Refresh derived values at `price`
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        let shares = self.shares as f64;
        self.market_value = price * shares;
        self.unrealized_pnl = (price - self.avg_cost) * shares;
        self.unrealized_pnl_rate = if self.avg_cost > 0.0 {
            (price - self.avg_cost) / self.avg_cost
        } else {
            0.0
        };
    }

    /// Daily mark. Unlocks on the first date after `buy_date` even when no
    /// price is available for the symbol; the lock never comes back.
    pub fn mark(&mut self, date: NaiveDate, price: Option<f64>) {
        if let Some(price) = price {
            self.update_price(price);
        }
        if date > self.buy_date {
            self.can_sell = true;
        }
    }

    /// Average in additional shares. The merged position is locked again.
    pub fn add_shares(&mut self, shares: u64, price: f64, date: NaiveDate, commission: f64) {
        let total = self.shares + shares;
        if total == 0 {
            return;
        }
        self.avg_cost =
            (self.avg_cost * self.shares as f64 + price * shares as f64) / total as f64;
        self.shares = total;
        self.buy_date = date;
        self.can_sell = false;
        self.entry_commission += commission;
        self.update_price(price);
    }

    /// Capital committed at average cost
    pub fn cost_basis(&self) -> f64 {
        self.avg_cost * self.shares as f64
    }

    /// Calendar days held as of `date`
    pub fn days_held(&self, date: NaiveDate) -> i64 {
        (date - self.buy_date).num_days()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} | 数量:{} | 成本:{:.2} | 现价:{:.2} | 盈亏:{:+.2} ({:+.1}%){}",
            self.symbol,
            self.shares,
            self.avg_cost,
            self.current_price,
            self.unrealized_pnl,
            self.unrealized_pnl_rate * 100.0,
            if self.can_sell { "" } else { " [T+1锁定]" }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[test]
    fn test_open_is_locked() {
        let pos = Position::open("600000.SH", 2000, 10.0, d(3), 6.0);

        assert!(!pos.can_sell);
        assert!((pos.market_value - 20_000.0).abs() < 1e-9);
        assert_eq!(pos.unrealized_pnl, 0.0);
    }

    #[test]
    fn test_mark_same_day_keeps_lock() {
        let mut pos = Position::open("600000.SH", 100, 10.0, d(3), 5.0);
        pos.mark(d(3), Some(10.5));

        assert!(!pos.can_sell);
        assert!((pos.unrealized_pnl - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_mark_next_day_unlocks_without_price() {
        let mut pos = Position::open("600000.SH", 100, 10.0, d(3), 5.0);
        pos.mark(d(4), None);

        assert!(pos.can_sell);
        assert_eq!(pos.current_price, 10.0);
    }

    #[test]
    fn test_unrealized_rate() {
        let mut pos = Position::open("600000.SH", 2000, 10.0, d(3), 6.0);
        pos.mark(d(4), Some(11.5));

        assert!((pos.unrealized_pnl_rate - 0.15).abs() < 1e-12);
        assert!((pos.unrealized_pnl - 3000.0).abs() < 1e-9);
        assert_eq!(pos.days_held(d(4)), 1);
    }

    #[test]
    fn test_add_shares_averages_and_relocks() {
        let mut pos = Position::open("600000.SH", 100, 10.0, d(3), 5.0);
        pos.mark(d(4), Some(11.0));
        pos.add_shares(100, 12.0, d(4), 5.0);

        assert_eq!(pos.shares, 200);
        assert!((pos.avg_cost - 11.0).abs() < 1e-12);
        assert!(!pos.can_sell);
        assert_eq!(pos.buy_date, d(4));
        assert!((pos.entry_commission - 10.0).abs() < 1e-12);
    }
}
