//! Coin orchestration: ties together address derivation, header sync,
//! event notifications, and amount formatting for one Bitcoin-family coin.

pub mod amount;
pub mod coin;
pub mod error;
pub mod observable;
pub mod rates;

pub use amount::{format_amount, format_as_currency, FormattedAmount};
pub use coin::Coin;
pub use error::CoinError;
pub use observable::{Action, Event, Observers};
pub use rates::RatesProvider;
