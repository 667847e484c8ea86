use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{info, info_span, warn, Span};

use blockchain_client::{BlockchainClient, ScriptHashHex};
use chain_btc::BtcNetwork;
use chain_headers::{
    ChainError, HeaderChain, Headers, RocksHeaderStore, SyncStatus, DEFAULT_MAX_REORG_DEPTH,
};

use crate::amount::{self, FormattedAmount};
use crate::error::CoinError;
use crate::observable::{Action, Event, Observers};
use crate::rates::RatesProvider;

/// A Bitcoin-family coin: identity, network parameters, header sync, and
/// amount formatting.
///
/// Cheap to construct; nothing talks to the network or touches the disk
/// until [`Coin::init`]. Each instance carries its own tracing span so log
/// lines from concurrent coins stay attributable.
pub struct Coin {
    name: String,
    unit: String,
    decimals: u32,
    network: BtcNetwork,
    db_dir: PathBuf,
    client: Arc<dyn BlockchainClient>,
    rates: Option<Arc<dyn RatesProvider>>,
    observers: Arc<Observers>,
    headers: Mutex<Option<Arc<Headers>>>,
    bridge: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl Coin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        decimals: u32,
        network: BtcNetwork,
        db_dir: impl Into<PathBuf>,
        client: Arc<dyn BlockchainClient>,
        rates: Option<Arc<dyn RatesProvider>>,
    ) -> Coin {
        let name = name.into();
        let span = info_span!("coin", name = %name);
        Coin {
            name,
            unit: unit.into(),
            decimals,
            network,
            db_dir: db_dir.into(),
            client,
            rates,
            observers: Arc::new(Observers::new()),
            headers: Mutex::new(None),
            bridge: Mutex::new(None),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    /// Receive this coin's notifications, e.g.
    /// `coins/<name>/headers/status` with the sync status as payload.
    pub fn subscribe(&self) -> Receiver<Event> {
        self.observers.subscribe()
    }

    /// Open the header store and start syncing. A failure to open the
    /// store is fatal and propagated; everything after that recovers on
    /// its own. Calling it a second time is a no-op.
    pub fn init(&self) -> Result<(), CoinError> {
        let _guard = self.span.enter();
        let mut headers_slot = self.headers.lock();
        if headers_slot.is_some() {
            return Ok(());
        }

        let db_path = self.db_dir.join(format!("headers-{}.db", self.name));
        let store = RocksHeaderStore::open(&db_path).map_err(ChainError::from)?;
        let chain = Arc::new(HeaderChain::new(
            Box::new(store),
            self.network.to_bitcoin_network(),
            DEFAULT_MAX_REORG_DEPTH,
        ));
        let headers = Arc::new(Headers::new(Arc::clone(&chain), Arc::clone(&self.client)));

        // Bridge sync events to coin notifications. The thread exits when
        // the engine (the sender side) is dropped in `close`.
        let events = headers.subscribe();
        let observers = Arc::clone(&self.observers);
        let subject = format!("coins/{}/headers/status", self.name);
        let span = self.span.clone();
        let bridge = thread::spawn(move || {
            let _guard = span.enter();
            while events.recv().is_ok() {
                match chain.status() {
                    Ok(status) => match serde_json::to_value(status) {
                        Ok(object) => observers.notify(Event {
                            subject: subject.clone(),
                            action: Action::Replace,
                            object,
                        }),
                        Err(e) => warn!(error = %e, "failed to encode sync status"),
                    },
                    Err(e) => warn!(error = %e, "failed to read sync status"),
                }
            }
        });
        *self.bridge.lock() = Some(bridge);

        headers.init()?;
        info!("coin initialized");
        *headers_slot = Some(headers);
        Ok(())
    }

    /// Current header sync status. Before `init` the store is considered
    /// empty and nothing is synced.
    pub fn status(&self) -> Result<SyncStatus, CoinError> {
        match self.headers.lock().as_ref() {
            Some(headers) => Ok(headers.status()?),
            None => Ok(SyncStatus {
                tip_height: -1,
                target_height: -1,
                synced: false,
            }),
        }
    }

    /// Subscribe to history status changes of an output script. Callbacks
    /// from the client are serialized into the returned channel, so the
    /// consumer is the only writer of the address's history status.
    pub fn subscribe_address_status(
        &self,
        script_hash: ScriptHashHex,
    ) -> Result<Receiver<(ScriptHashHex, String)>, CoinError> {
        let (tx, rx) = mpsc::channel();
        let hash = script_hash.clone();
        self.client.subscribe_script_hash(
            script_hash,
            Box::new(move |status| {
                let _ = tx.send((hash.clone(), status));
            }),
        )?;
        Ok(rx)
    }

    pub fn format_amount(&self, amount: i64) -> String {
        amount::format_amount(amount, self.decimals, &self.unit)
    }

    pub fn format_amount_as_json(&self, amount: i64) -> FormattedAmount {
        amount::format_amount_as_json(amount, self.decimals, &self.unit, self.rates.as_deref())
    }

    /// Stop syncing and wait for the workers to exit. Idempotent.
    pub fn close(&self) {
        if let Some(headers) = self.headers.lock().take() {
            headers.stop();
        }
        if let Some(bridge) = self.bridge.lock().take() {
            let _ = bridge.join();
        }
    }
}

impl Drop for Coin {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::StaticRates;
    use chain_headers::testing::{mine_chain, MockClient};
    use std::collections::HashMap;
    use std::time::Duration;

    const RECV_TIMEOUT: Duration = Duration::from_secs(10);

    fn test_coin(client: Arc<MockClient>, db_dir: &std::path::Path) -> Coin {
        let mut rates = HashMap::new();
        rates.insert(
            "BTC".to_string(),
            HashMap::from([("USD".to_string(), 21_000.0)]),
        );
        Coin::new(
            "rbtc",
            "TBTC",
            8,
            BtcNetwork::Regtest,
            db_dir,
            client,
            Some(Arc::new(StaticRates::new(rates))),
        )
    }

    #[test]
    fn init_syncs_and_notifies_headers_status() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(mine_chain(6)));
        let coin = test_coin(client, dir.path());

        let rx = coin.subscribe();
        coin.init().unwrap();

        // Drain status notifications until the chain reports synced.
        let final_status = loop {
            let event = rx.recv_timeout(RECV_TIMEOUT).unwrap();
            assert_eq!(event.subject, "coins/rbtc/headers/status");
            assert_eq!(event.action, Action::Replace);
            if event.object["synced"] == true {
                break event.object;
            }
        };
        assert_eq!(final_status["tipHeight"], 5);
        assert_eq!(final_status["targetHeight"], 5);

        let status = coin.status().unwrap();
        assert_eq!(status.tip_height, 5);
        assert!(status.synced);
        coin.close();
    }

    #[test]
    fn status_before_init_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(mine_chain(2)));
        let coin = test_coin(client, dir.path());

        let status = coin.status().unwrap();
        assert_eq!(status.tip_height, -1);
        assert!(!status.synced);
    }

    #[test]
    fn init_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(mine_chain(3)));
        let coin = test_coin(client, dir.path());
        coin.init().unwrap();
        coin.init().unwrap();
        coin.close();
    }

    #[test]
    fn address_status_updates_arrive_on_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(mine_chain(2)));
        let coin = test_coin(Arc::clone(&client), dir.path());

        let script_hash = ScriptHashHex::from_script(&[0x51]);
        let rx = coin.subscribe_address_status(script_hash.clone()).unwrap();

        client.set_script_status(&script_hash, "deadbeef");
        let (hash, status) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(hash, script_hash);
        assert_eq!(status, "deadbeef");
    }

    #[test]
    fn formatting_uses_the_coin_unit_and_rates() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(mine_chain(2)));
        let coin = test_coin(client, dir.path());

        assert_eq!(coin.format_amount(150_000_000), "1.50000000 TBTC");

        let formatted = coin.format_amount_as_json(100_000_000);
        assert_eq!(formatted.amount, "1.00000000");
        assert_eq!(formatted.unit, "TBTC");
        // Testnet unit converts under the mainnet rates.
        assert_eq!(formatted.conversions["USD"], "21'000.00");
    }
}
