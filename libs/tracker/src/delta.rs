use rust_decimal::Decimal;

use crate::position::round_money;

/// Direction of a change, by the sign of its percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Positive,
    Negative,
    Neutral,
}

impl Indicator {
    pub fn from_pct(pct: Decimal) -> Self {
        if pct > Decimal::ZERO {
            Indicator::Positive
        } else if pct < Decimal::ZERO {
            Indicator::Negative
        } else {
            Indicator::Neutral
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Indicator::Positive => "🟩",
            Indicator::Negative => "🟥",
            Indicator::Neutral => "➖",
        }
    }
}

/// Change of a price against a baseline, in cents and percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub amount: Decimal,
    pub pct: Decimal,
    pub indicator: Indicator,
}

impl Delta {
    pub fn neutral() -> Self {
        Self {
            amount: Decimal::ZERO,
            pct: Decimal::ZERO,
            indicator: Indicator::Neutral,
        }
    }

    /// `amount = round(current - baseline)`, `pct = round(amount / baseline * 100)`.
    ///
    /// Both rounded to 2 dp, half away from zero, amount first. A baseline
    /// that is zero or negative has no meaningful percentage and yields
    /// [`Delta::neutral`].
    pub fn between(current: Decimal, baseline: Decimal) -> Self {
        if baseline <= Decimal::ZERO {
            return Self::neutral();
        }

        let amount = round_money(current - baseline);
        let Some(ratio) = amount
            .checked_div(baseline)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
        else {
            return Self::neutral();
        };
        let pct = round_money(ratio);

        Self {
            amount,
            pct,
            indicator: Indicator::from_pct(pct),
        }
    }
}
