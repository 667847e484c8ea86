use std::collections::HashMap;

/// Source of the latest known exchange rates.
///
/// Maps a coin unit (e.g. `"BTC"`) to the rate per fiat currency code.
/// Fetching and refreshing rates happens elsewhere; the coin only reads
/// the most recent snapshot.
pub trait RatesProvider: Send + Sync {
    fn latest(&self) -> HashMap<String, HashMap<String, f64>>;
}

/// Fixed rates for tests.
#[derive(Default)]
pub struct StaticRates {
    rates: HashMap<String, HashMap<String, f64>>,
}

impl StaticRates {
    pub fn new(rates: HashMap<String, HashMap<String, f64>>) -> Self {
        StaticRates { rates }
    }
}

impl RatesProvider for StaticRates {
    fn latest(&self) -> HashMap<String, HashMap<String, f64>> {
        self.rates.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_rates_return_what_they_were_given() {
        let mut rates = HashMap::new();
        rates.insert(
            "BTC".to_string(),
            HashMap::from([("USD".to_string(), 50_000.0)]),
        );
        let provider = StaticRates::new(rates);
        assert_eq!(provider.latest()["BTC"]["USD"], 50_000.0);
    }
}
