pub mod enums;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{PriceSource, StepStatus, TradeKind};
pub use structs::{Position, PriceQuote, TradeEvent};

/// A position whose replayed quantity falls below this threshold is treated
/// as fully closed: both quantity and invested capital are forced to exactly
/// zero. This absorbs float drift from repeated partial sells.
pub const POSITION_EPSILON: f64 = 1e-10;

/// The synthetic pseudo-asset used for cash balances. It never participates
/// in holdings aggregation or exit planning.
pub const CASH_SYMBOL: &str = "CASH";

/// Rounds a value to `dp` decimal places, half away from zero.
///
/// All engine outputs are rounded only at the presentation boundary:
/// prices to 8 decimals, USD amounts to 2, percentages to 2.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_dp_two_decimals() {
        // 0.125 is exactly representable, so the half rounds away from zero.
        assert_eq!(round_dp(0.125, 2), 0.13);
        assert_eq!(round_dp(-0.125, 2), -0.13);
        assert_eq!(round_dp(29.999999, 2), 30.0);
    }

    #[test]
    fn round_dp_eight_decimals() {
        assert_eq!(round_dp(0.123456789, 8), 0.12345679);
        assert_eq!(round_dp(130.0, 8), 130.0);
    }
}
