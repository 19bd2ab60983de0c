//! Static logistics reference data and the shipping cost estimator.
//!
//! The option table mirrors the supplier's published channel list; it is
//! reference data, seeded into the database once and otherwise consumed from
//! memory. Cost estimation is pure arithmetic over fixed rate rows so the
//! same inputs always produce the same quote.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// One shipping channel as assigned by the supplier.
#[derive(Debug, Clone, Serialize)]
pub struct LogisticsOption {
    /// Supplier-assigned channel id.
    pub id: i64,
    pub name: &'static str,
    pub min_days: u32,
    pub max_days: u32,
    pub express: bool,
    pub sensitive_allowed: bool,
    /// Supported destination countries; empty means worldwide.
    pub countries: &'static [&'static str],
}

/// A deterministic shipping quote.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub logistics_id: i64,
    pub cost: Decimal,
    pub currency: &'static str,
    pub eta_min_days: u32,
    pub eta_max_days: u32,
}

#[derive(Debug, Error)]
pub enum LogisticsError {
    #[error("unknown logistics option: {0}")]
    UnknownOption(i64),
    #[error("logistics option {id} does not ship to {country}")]
    UnsupportedCountry { id: i64, country: String },
}

/// Channel table. Option 21 is the express worldwide channel referenced by
/// quoting callers; ids are supplier-assigned and not contiguous.
pub static OPTIONS: &[LogisticsOption] = &[
    LogisticsOption {
        id: 21,
        name: "Supplier Express Global",
        min_days: 3,
        max_days: 7,
        express: true,
        sensitive_allowed: false,
        countries: &[],
    },
    LogisticsOption {
        id: 22,
        name: "Supplier Express Sensitive",
        min_days: 5,
        max_days: 9,
        express: true,
        sensitive_allowed: true,
        countries: &["US", "GB", "DE", "FR", "ES", "IT", "NL"],
    },
    LogisticsOption {
        id: 31,
        name: "Supplier Packet Standard",
        min_days: 8,
        max_days: 15,
        express: false,
        sensitive_allowed: false,
        countries: &[],
    },
    LogisticsOption {
        id: 32,
        name: "Supplier Packet Sensitive",
        min_days: 10,
        max_days: 20,
        express: false,
        sensitive_allowed: true,
        countries: &[],
    },
    LogisticsOption {
        id: 41,
        name: "Supplier Sea Economy",
        min_days: 25,
        max_days: 45,
        express: false,
        sensitive_allowed: true,
        countries: &["US", "CA", "AU", "GB", "DE"],
    },
];

/// Lists the options that can ship to `country`, fastest first.
///
/// With `sensitive_goods` set, channels that cannot carry sensitive goods
/// (batteries, liquids, magnets) are filtered out.
#[must_use]
pub fn options_for(country: &str, sensitive_goods: bool) -> Vec<&'static LogisticsOption> {
    let country = country.to_uppercase();
    let mut options: Vec<&LogisticsOption> = OPTIONS
        .iter()
        .filter(|o| o.countries.is_empty() || o.countries.contains(&country.as_str()))
        .filter(|o| !sensitive_goods || o.sensitive_allowed)
        .collect();
    options.sort_by_key(|o| (o.min_days, o.max_days, o.id));
    options
}

fn option_by_id(id: i64) -> Option<&'static LogisticsOption> {
    OPTIONS.iter().find(|o| o.id == id)
}

/// Fixed rate row: flat base plus a per-gram rate, in USD cents to stay exact.
fn rates(express: bool) -> (Decimal, Decimal) {
    if express {
        // 12.00 base + 0.012/g
        (Decimal::new(1200, 2), Decimal::new(12, 3))
    } else {
        // 5.00 base + 0.006/g
        (Decimal::new(500, 2), Decimal::new(6, 3))
    }
}

/// Per-destination-country cost multiplier; unlisted countries use the
/// rest-of-world factor.
fn country_multiplier(country: &str) -> Decimal {
    match country {
        "US" | "CA" => Decimal::new(100, 2),
        "GB" | "NL" => Decimal::new(115, 2),
        "DE" | "FR" | "ES" | "IT" => Decimal::new(120, 2),
        "AU" | "NZ" | "JP" => Decimal::new(125, 2),
        _ => Decimal::new(135, 2),
    }
}

/// Estimates the shipping cost for a parcel on a given channel.
///
/// `cost = (base + per_gram * weight) * country_multiplier`, rounded to two
/// decimals. Deterministic for the same inputs.
///
/// # Errors
///
/// Returns [`LogisticsError::UnknownOption`] for an id not in the table and
/// [`LogisticsError::UnsupportedCountry`] when the channel does not ship to
/// the destination.
pub fn estimate_cost(
    logistics_id: i64,
    weight_grams: u32,
    country: &str,
) -> Result<Quote, LogisticsError> {
    let option = option_by_id(logistics_id).ok_or(LogisticsError::UnknownOption(logistics_id))?;
    let country = country.to_uppercase();
    if !option.countries.is_empty() && !option.countries.contains(&country.as_str()) {
        return Err(LogisticsError::UnsupportedCountry {
            id: logistics_id,
            country,
        });
    }

    let (base, per_gram) = rates(option.express);
    let cost = (base + per_gram * Decimal::from(weight_grams)) * country_multiplier(&country);

    Ok(Quote {
        logistics_id,
        cost: cost.round_dp(2),
        currency: "USD",
        eta_min_days: option.min_days,
        eta_max_days: option.max_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_for_sorts_fastest_first() {
        let options = options_for("US", false);
        assert!(!options.is_empty());
        for pair in options.windows(2) {
            assert!(pair[0].min_days <= pair[1].min_days);
        }
        assert_eq!(options[0].id, 21, "express global should be fastest to US");
    }

    #[test]
    fn sensitive_filter_drops_non_sensitive_channels() {
        let options = options_for("DE", true);
        assert!(options.iter().all(|o| o.sensitive_allowed));
        assert!(options.iter().any(|o| o.id == 22));
        assert!(!options.iter().any(|o| o.id == 21));
    }

    #[test]
    fn country_filter_excludes_unsupported_channels() {
        let options = options_for("BR", false);
        assert!(!options.iter().any(|o| o.id == 41), "sea economy is not BR");
    }

    #[test]
    fn express_global_de_estimate_is_deterministic() {
        // 500 g express to DE: (12.00 + 0.012 * 500) * 1.20 = 21.60
        let quote = estimate_cost(21, 500, "DE").expect("quote");
        assert_eq!(quote.cost, Decimal::new(2160, 2));
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.eta_min_days, 3);
        assert_eq!(quote.eta_max_days, 7);

        let again = estimate_cost(21, 500, "DE").expect("quote");
        assert_eq!(quote.cost, again.cost);
    }

    #[test]
    fn standard_rate_is_cheaper_than_express() {
        let express = estimate_cost(21, 500, "US").expect("express");
        let standard = estimate_cost(31, 500, "US").expect("standard");
        assert!(standard.cost < express.cost);
    }

    #[test]
    fn unknown_option_is_rejected() {
        assert!(matches!(
            estimate_cost(999, 100, "US"),
            Err(LogisticsError::UnknownOption(999))
        ));
    }

    #[test]
    fn unsupported_country_is_rejected() {
        assert!(matches!(
            estimate_cost(41, 100, "BR"),
            Err(LogisticsError::UnsupportedCountry { id: 41, .. })
        ));
    }

    #[test]
    fn lowercase_country_codes_are_accepted() {
        let quote = estimate_cost(21, 100, "de").expect("quote");
        assert_eq!(quote.logistics_id, 21);
    }
}
