//! Position math: weighted-average buys, sell reductions, unrealized P&L.
//! Pure functions, testable without a store.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::types::position::Position;
use crate::types::trade::TradeSide;

/// Fraction digits kept for quantities.
pub const QUANTITY_SCALE: u32 = 8;
/// Fraction digits kept for prices and cash amounts.
pub const PRICE_SCALE: u32 = 2;

/// Round a cash amount the way a NUMERIC(_, 2) column does, scale included.
pub fn round_money(amount: Decimal) -> Decimal {
    round_cents(amount, RoundingStrategy::MidpointAwayFromZero)
}

fn round_cents(amount: Decimal, strategy: RoundingStrategy) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(PRICE_SCALE, strategy);
    rounded.rescale(PRICE_SCALE);
    rounded
}

/// Cash value of a fill, rounded to cents against the account: a buy costs
/// `quantity * price` rounded up, a sell pays it rounded down. Sub-cent
/// remainders never turn into cash.
pub fn trade_total(side: TradeSide, quantity: Decimal, price: Decimal) -> Decimal {
    let strategy = match side {
        TradeSide::Buy => RoundingStrategy::ToPositiveInfinity,
        TradeSide::Sell => RoundingStrategy::ToNegativeInfinity,
    };
    round_cents(quantity * price, strategy)
}

/// Dollar-cost average after adding `quantity` at `price` to a holding of
/// `held` at `avg_price`.
pub fn weighted_average(held: Decimal, avg_price: Decimal, quantity: Decimal, price: Decimal) -> Decimal {
    let total = held + quantity;
    if total.is_zero() {
        return price;
    }
    round_money((avg_price * held + price * quantity) / total)
}

/// Result of reducing a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionChange {
    /// Quantity left over; average price untouched.
    Reduced(Position),
    /// Quantity reached exactly zero; the row must be deleted.
    Closed(Position),
}

/// Apply a buy fill. Creates the position on first buy, otherwise blends the
/// average price.
pub fn apply_buy(
    existing: Option<Position>,
    account_id: Uuid,
    asset_id: Uuid,
    quantity: Decimal,
    price: Decimal,
    now: DateTime<Utc>,
) -> Position {
    match existing {
        Some(mut pos) => {
            pos.avg_price = weighted_average(pos.quantity, pos.avg_price, quantity, price);
            pos.quantity += quantity;
            pos.updated_at = now;
            pos
        }
        None => Position {
            id: Uuid::new_v4(),
            account_id,
            asset_id,
            quantity,
            avg_price: round_money(price),
            created_at: now,
            updated_at: now,
        },
    }
}

/// Apply a sell fill. Caller has already checked `quantity <= position.quantity`.
pub fn apply_sell(mut position: Position, quantity: Decimal, now: DateTime<Utc>) -> PositionChange {
    position.quantity -= quantity;
    position.updated_at = now;
    if position.quantity.is_zero() {
        PositionChange::Closed(position)
    } else {
        PositionChange::Reduced(position)
    }
}

/// Unrealized P&L: (current_price - avg_price) * quantity.
pub fn unrealized_pnl(position: &Position, current_price: Decimal) -> Decimal {
    (current_price - position.avg_price) * position.quantity
}

/// Percentage move of `current_price` against `avg_price`, 4 fraction digits.
pub fn pnl_percent(avg_price: Decimal, current_price: Decimal) -> Decimal {
    if avg_price.is_zero() {
        return Decimal::ZERO;
    }
    ((current_price - avg_price) / avg_price * Decimal::ONE_HUNDRED).round_dp(4)
}

/// True when `value` has no more than `scale` significant fraction digits.
pub fn fits_scale(value: Decimal, scale: u32) -> bool {
    value.normalize().scale() <= scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_money_rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(0.005)), dec!(0.01));
        assert_eq!(round_money(dec!(0.01665)), dec!(0.02));
        assert_eq!(round_money(dec!(180)).to_string(), "180.00");
    }

    #[test]
    fn trade_total_rounds_against_the_account() {
        assert_eq!(trade_total(TradeSide::Buy, dec!(0.1), dec!(45000)), dec!(4500.00));
        assert_eq!(trade_total(TradeSide::Sell, dec!(0.1), dec!(45000)), dec!(4500.00));
        // 0.00495
        assert_eq!(trade_total(TradeSide::Buy, dec!(0.00000011), dec!(45000)), dec!(0.01));
        assert_eq!(trade_total(TradeSide::Sell, dec!(0.00000011), dec!(45000)), dec!(0.00));
        // 0.01665
        assert_eq!(trade_total(TradeSide::Buy, dec!(0.333), dec!(0.05)), dec!(0.02));
        assert_eq!(trade_total(TradeSide::Sell, dec!(0.333), dec!(0.05)), dec!(0.01));
        assert_eq!(trade_total(TradeSide::Buy, dec!(2), dec!(90)).to_string(), "180.00");
    }

    #[test]
    fn weighted_average_blends_by_quantity() {
        assert_eq!(weighted_average(dec!(0.1), dec!(45000), dec!(0.1), dec!(47000)), dec!(46000));
        assert_eq!(weighted_average(dec!(10), dec!(100), dec!(30), dec!(200)), dec!(175));
    }

    #[test]
    fn pnl_percent_handles_zero_average() {
        assert_eq!(pnl_percent(Decimal::ZERO, dec!(10)), Decimal::ZERO);
        assert_eq!(pnl_percent(dec!(100), dec!(110)), dec!(10));
    }

    #[test]
    fn fits_scale_ignores_trailing_zeros() {
        assert!(fits_scale(dec!(45000.000), 2));
        assert!(!fits_scale(dec!(1.001), 2));
        assert!(fits_scale(dec!(0.12345678), 8));
        assert!(!fits_scale(dec!(0.123456789), 8));
    }
}
