use serde::{Deserialize, Serialize};

/// How much cash an entry commits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Deploy every unit of available cash.
    #[default]
    FullBalance,
    /// Deploy a fraction (0..=1) of available cash.
    FixedFraction(f64),
    /// Buy a fixed quantity, capped by available cash.
    FixedUnits(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionAllocation {
    pub quantity: f64,
    /// Pre-fee cash taken out of the account; the PnL basis of the trade.
    pub committed: f64,
}

#[derive(Debug, PartialEq)]
pub enum PositionSizingOutcome {
    Sized(PositionAllocation),
    TooSmall,
}

impl PositionSizing {
    /// Sizes an entry at `price`. Callers must reject a zero price first.
    pub fn allocate(&self, available_cash: f64, price: f64, fee_rate: f64) -> PositionSizingOutcome {
        if available_cash <= 0.0 {
            return PositionSizingOutcome::TooSmall;
        }

        let net_rate = 1.0 - fee_rate;
        let committed = match *self {
            PositionSizing::FullBalance => available_cash,
            PositionSizing::FixedFraction(fraction) => {
                if !fraction.is_finite() {
                    return PositionSizingOutcome::TooSmall;
                }
                available_cash * fraction.clamp(0.0, 1.0)
            }
            PositionSizing::FixedUnits(units) => {
                if !units.is_finite() || units <= 0.0 || net_rate <= 0.0 {
                    return PositionSizingOutcome::TooSmall;
                }
                (units * price / net_rate).min(available_cash)
            }
        };

        if committed <= 0.0 {
            return PositionSizingOutcome::TooSmall;
        }

        let spendable = committed * net_rate;
        PositionSizingOutcome::Sized(PositionAllocation {
            quantity: spendable / price,
            committed,
        })
    }

    pub fn label(&self) -> String {
        match self {
            PositionSizing::FullBalance => "full_balance".to_string(),
            PositionSizing::FixedFraction(fraction) => format!("fixed_fraction({})", fraction),
            PositionSizing::FixedUnits(units) => format!("fixed_units({})", units),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(outcome: PositionSizingOutcome) -> PositionAllocation {
        match outcome {
            PositionSizingOutcome::Sized(allocation) => allocation,
            other => panic!("expected a sized allocation, got {:?}", other),
        }
    }

    #[test]
    fn full_balance_commits_all_cash() {
        let allocation = sized(PositionSizing::FullBalance.allocate(1000.0, 100.0, 0.01));
        assert_eq!(allocation.committed, 1000.0);
        assert!((allocation.quantity - 9.9).abs() < 1e-12);
    }

    #[test]
    fn fixed_fraction_is_clamped() {
        let half = sized(PositionSizing::FixedFraction(0.5).allocate(1000.0, 50.0, 0.0));
        assert_eq!(half.committed, 500.0);
        assert_eq!(half.quantity, 10.0);

        let capped = sized(PositionSizing::FixedFraction(3.0).allocate(1000.0, 50.0, 0.0));
        assert_eq!(capped.committed, 1000.0);

        assert_eq!(
            PositionSizing::FixedFraction(0.0).allocate(1000.0, 50.0, 0.0),
            PositionSizingOutcome::TooSmall
        );
    }

    #[test]
    fn fixed_units_grosses_up_for_fees_and_caps_at_cash() {
        let allocation = sized(PositionSizing::FixedUnits(2.0).allocate(1000.0, 100.0, 0.2));
        assert!((allocation.committed - 250.0).abs() < 1e-9);
        assert!((allocation.quantity - 2.0).abs() < 1e-9);

        let capped = sized(PositionSizing::FixedUnits(50.0).allocate(1000.0, 100.0, 0.0));
        assert_eq!(capped.committed, 1000.0);
        assert_eq!(capped.quantity, 10.0);
    }

    #[test]
    fn no_cash_means_no_entry() {
        assert_eq!(
            PositionSizing::FullBalance.allocate(0.0, 100.0, 0.0),
            PositionSizingOutcome::TooSmall
        );
    }
}
