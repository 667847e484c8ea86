use std::collections::BTreeMap;

use serde::Serialize;

use crate::rates::RatesProvider;

/// An amount formatted for display, with fiat conversions when rates are
/// known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedAmount {
    pub amount: String,
    pub unit: String,
    /// Fiat currency code to formatted value. Empty when no rates are
    /// available for the unit.
    pub conversions: BTreeMap<String, String>,
}

/// Format a smallest-unit amount as a decimal string with exactly
/// `decimals` fractional digits. Pure integer arithmetic, so no precision
/// is lost on large amounts.
pub fn format_amount_value(amount: i64, decimals: u32) -> String {
    let abs = amount.unsigned_abs();
    let sign = if amount < 0 { "-" } else { "" };
    if decimals == 0 {
        return format!("{sign}{abs}");
    }
    let factor = 10u64.pow(decimals);
    let whole = abs / factor;
    let frac = abs % factor;
    format!("{sign}{whole}.{frac:0width$}", width = decimals as usize)
}

/// Format a smallest-unit amount with its unit suffix.
pub fn format_amount(amount: i64, decimals: u32, unit: &str) -> String {
    format!("{} {unit}", format_amount_value(amount, decimals))
}

/// Format a fiat value with two fractional digits and `'` as the thousands
/// separator, scanning left from the decimal point.
pub fn format_as_currency(value: f64) -> String {
    let mut formatted = format!("{value:.2}");
    let dot = formatted.find('.').unwrap_or(formatted.len());
    let mut position = dot as isize - 3;
    while position > 0 {
        formatted.insert(position as usize, '\'');
        position -= 3;
    }
    formatted
}

/// Assemble the serializable form of an amount, converting into every fiat
/// currency the rates provider knows for the unit. Missing rates simply
/// leave the conversions empty.
pub fn format_amount_as_json(
    amount: i64,
    decimals: u32,
    unit: &str,
    rates: Option<&dyn RatesProvider>,
) -> FormattedAmount {
    let mut conversions = BTreeMap::new();
    if let Some(provider) = rates {
        // A four-letter unit starting with T is the testnet form of its
        // mainnet unit and converts under the mainnet rates.
        let rate_unit = if unit.len() == 4 && unit.starts_with('T') {
            &unit[1..]
        } else {
            unit
        };
        if let Some(unit_rates) = provider.latest().get(rate_unit) {
            let value = amount as f64 / 10f64.powi(decimals as i32);
            for (fiat, rate) in unit_rates {
                conversions.insert(fiat.clone(), format_as_currency(value * rate));
            }
        }
    }
    FormattedAmount {
        amount: format_amount_value(amount, decimals),
        unit: unit.to_string(),
        conversions,
    }
}
