//! Price-delta normalization into pips (currency pairs) or points (everything else).

use serde::{Deserialize, Serialize};

use super::instrument::{InstrumentClass, InstrumentTable};
use super::leg::{Leg, Side};

/// Added before flooring so exact decimal deltas are not lost to binary error.
const PIP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipMethod {
    Exact,
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipValue {
    pub value: f64,
    pub method: PipMethod,
}

/// Significant decimal digits of a price, read from its 10-place rendering.
pub fn decimal_digits(price: f64) -> usize {
    let rendered = format!("{:.10}", price);
    match rendered.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len(),
        None => 0,
    }
}

/// 0.01 for 2-3 decimal quotes, 0.0001 otherwise (pipettes discarded).
pub fn pip_size(open_price: f64, close_price: f64) -> f64 {
    match decimal_digits(open_price).max(decimal_digits(close_price)) {
        2 | 3 => 0.01,
        _ => 0.0001,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Normalizes a closing leg against its opening leg.
///
/// Without an opening or without both prices, falls back to
/// `profit / (volume * unit value)` for the class.
pub fn normalize(
    closing: &Leg,
    opening: Option<&Leg>,
    class: InstrumentClass,
    table: &InstrumentTable,
) -> PipValue {
    let priced = opening.and_then(|o| Some((o, o.price()?, closing.price()?)));

    let Some((opening, open_price, close_price)) = priced else {
        return approximate(closing, class, table);
    };

    let mut delta = close_price - open_price;
    if opening.order.side == Side::Sell {
        delta = -delta;
    }

    let value = if class.uses_pips() {
        let pips = (delta.abs() / pip_size(open_price, close_price) + PIP_EPSILON).floor();
        pips.copysign(delta)
    } else {
        round2(delta)
    };

    PipValue {
        value: if value == 0.0 { 0.0 } else { value },
        method: PipMethod::Exact,
    }
}

fn approximate(closing: &Leg, class: InstrumentClass, table: &InstrumentTable) -> PipValue {
    let divisor = closing.volume() * table.unit_value(class);
    let value = if divisor > 0.0 {
        round2(closing.profit() / divisor)
    } else {
        0.0
    };
    tracing::debug!(
        "approximated units for order {} in {}",
        closing.order_id(),
        closing.source()
    );
    PipValue {
        value,
        method: PipMethod::Approximate,
    }
}
