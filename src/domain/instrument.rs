//! Instrument classification and the per-class lookup table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Revision of the built-in keyword lists and unit constants.
pub const TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    CurrencyPair,
    Metal,
    Index,
    Crypto,
    Energy,
    Equity,
}

impl InstrumentClass {
    pub const ALL: [InstrumentClass; 6] = [
        InstrumentClass::CurrencyPair,
        InstrumentClass::Metal,
        InstrumentClass::Index,
        InstrumentClass::Crypto,
        InstrumentClass::Energy,
        InstrumentClass::Equity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentClass::CurrencyPair => "currency_pair",
            InstrumentClass::Metal => "metal",
            InstrumentClass::Index => "index",
            InstrumentClass::Crypto => "crypto",
            InstrumentClass::Energy => "energy",
            InstrumentClass::Equity => "equity",
        }
    }

    pub fn parse(value: &str) -> Option<InstrumentClass> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// Whether movements of this class are counted in pips rather than points.
    pub fn uses_pips(&self) -> bool {
        matches!(self, InstrumentClass::CurrencyPair)
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which legs enter reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentFilter {
    CurrencyPairs,
    NonCurrencyPairs,
    Only(InstrumentClass),
}

impl InstrumentFilter {
    pub fn parse(value: &str) -> Option<InstrumentFilter> {
        match value.trim().to_lowercase().as_str() {
            "currency_pairs" | "forex" => Some(InstrumentFilter::CurrencyPairs),
            "others" | "non_currency_pairs" => Some(InstrumentFilter::NonCurrencyPairs),
            other => InstrumentClass::parse(other).map(InstrumentFilter::Only),
        }
    }

    pub fn accepts(&self, class: InstrumentClass) -> bool {
        match self {
            InstrumentFilter::CurrencyPairs => class == InstrumentClass::CurrencyPair,
            InstrumentFilter::NonCurrencyPairs => class != InstrumentClass::CurrencyPair,
            InstrumentFilter::Only(c) => class == *c,
        }
    }
}

/// Keyword lists, currency codes and fallback unit values in one place.
///
/// Keyword classes are tried in a fixed order: metal, index, crypto,
/// energy, then the currency-pair substrings. Anything left is equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentTable {
    pub version: u32,
    /// True once a caller has applied overrides on top of the built-in data.
    pub customized: bool,
    pub currencies: Vec<String>,
    pub keywords: BTreeMap<InstrumentClass, Vec<String>>,
    pub unit_values: BTreeMap<InstrumentClass, f64>,
}

const KEYWORD_ORDER: [InstrumentClass; 5] = [
    InstrumentClass::Metal,
    InstrumentClass::Index,
    InstrumentClass::Crypto,
    InstrumentClass::Energy,
    InstrumentClass::CurrencyPair,
];

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for InstrumentTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl InstrumentTable {
    pub fn standard() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            InstrumentClass::Metal,
            words(&[
                "GOLD", "SILVER", "XAU", "XAG", "XPT", "XPD", "PLATINUM", "PALLADIUM",
            ]),
        );
        keywords.insert(
            InstrumentClass::Index,
            words(&[
                "DAX", "CAC", "SP500", "NASDAQ", "FTSE", "NIKKEI", "DOW", "ASX", "US30", "US500",
                "GER30", "GER40", "FRA40", "UK100",
            ]),
        );
        keywords.insert(
            InstrumentClass::Crypto,
            words(&[
                "BTC", "ETH", "LTC", "XRP", "ADA", "DOT", "BITCOIN", "ETHEREUM", "CRYPTO",
            ]),
        );
        keywords.insert(
            InstrumentClass::Energy,
            words(&["OIL", "WTI", "BRENT", "PETROL", "CRUDE", "GAS", "NATURAL"]),
        );
        keywords.insert(
            InstrumentClass::CurrencyPair,
            words(&[
                "EURUSD", "GBPUSD", "USDCHF", "USDJPY", "USDCAD", "AUDUSD", "NZDUSD", "EURJPY",
                "GBPJPY", "AUDJPY", "CADJPY", "CHFJPY", "NZDJPY", "EURGBP", "EURAUD", "EURCAD",
                "EURCHF", "EURNZD", "GBPAUD", "GBPCAD", "GBPCHF", "GBPNZD", "AUDCAD", "AUDCHF",
                "AUDNZD", "CADCHF", "NZDCAD", "NZDCHF",
            ]),
        );

        let mut unit_values = BTreeMap::new();
        for class in InstrumentClass::ALL {
            let value = match class {
                InstrumentClass::CurrencyPair => 10.0,
                InstrumentClass::Crypto => 0.1,
                _ => 1.0,
            };
            unit_values.insert(class, value);
        }

        InstrumentTable {
            version: TABLE_VERSION,
            customized: false,
            currencies: words(&["USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD"]),
            keywords,
            unit_values,
        }
    }

    /// Appends extra keywords for a class. Equity takes none.
    pub fn add_keywords(&mut self, class: InstrumentClass, extra: &[String]) {
        if class == InstrumentClass::Equity || extra.is_empty() {
            return;
        }
        let list = self.keywords.entry(class).or_default();
        for word in extra {
            let word = word.trim().to_uppercase();
            if !word.is_empty() && !list.contains(&word) {
                list.push(word);
            }
        }
        self.customized = true;
    }

    pub fn set_unit_value(&mut self, class: InstrumentClass, value: f64) {
        self.unit_values.insert(class, value);
        self.customized = true;
    }

    /// Profit per unit of volume per pip/point used by the approximate path.
    pub fn unit_value(&self, class: InstrumentClass) -> f64 {
        self.unit_values.get(&class).copied().unwrap_or(1.0)
    }

    /// Never fails: unknown symbols are equities.
    pub fn classify(&self, symbol: &str) -> InstrumentClass {
        let upper = symbol.trim().to_uppercase();

        if self.is_structural_pair(&upper) {
            return InstrumentClass::CurrencyPair;
        }

        for class in KEYWORD_ORDER {
            let hit = self
                .keywords
                .get(&class)
                .is_some_and(|list| list.iter().any(|k| upper.contains(k.as_str())));
            if hit {
                return class;
            }
        }

        InstrumentClass::Equity
    }

    /// Six letters as two known currency codes, or seven with a separator
    /// at position 3 (`EUR/USD`) or a one-character broker suffix (`EURUSDm`).
    fn is_structural_pair(&self, upper: &str) -> bool {
        if !upper.is_ascii() {
            return false;
        }
        let (base, quote) = match upper.len() {
            6 => (&upper[..3], &upper[3..]),
            7 if !upper.as_bytes()[3].is_ascii_alphanumeric() => (&upper[..3], &upper[4..]),
            7 => (&upper[..3], &upper[3..6]),
            _ => return false,
        };
        self.is_currency(base) && self.is_currency(quote)
    }

    fn is_currency(&self, code: &str) -> bool {
        self.currencies.iter().any(|c| c == code)
    }
}
