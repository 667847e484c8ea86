//! End-to-end sync against a scripted client with the RocksDB store,
//! including restart and reorg across a restart.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::Network;

use chain_headers::testing::{extend_chain, mine_chain, MockClient};
use chain_headers::{
    HeaderChain, HeaderEvent, Headers, RocksHeaderStore, DEFAULT_MAX_REORG_DEPTH,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn open_engine(dir: &std::path::Path, client: Arc<MockClient>) -> Headers {
    let store = RocksHeaderStore::open(dir).unwrap();
    let chain = HeaderChain::new(Box::new(store), Network::Regtest, DEFAULT_MAX_REORG_DEPTH);
    Headers::with_batch_size(Arc::new(chain), client, 8)
}

fn wait_for_synced(rx: &Receiver<HeaderEvent>) -> i64 {
    loop {
        if let HeaderEvent::Synced { tip } = rx.recv_timeout(RECV_TIMEOUT).unwrap() {
            return tip;
        }
    }
}

#[test]
fn sync_survives_restart_and_reorg() {
    let dir = tempfile::tempdir().unwrap();
    let headers = mine_chain(30);
    let client = Arc::new(MockClient::new(headers.clone()));

    // First run: catch up from empty.
    {
        let engine = open_engine(dir.path(), Arc::clone(&client));
        let rx = engine.subscribe();
        engine.init().unwrap();
        assert_eq!(wait_for_synced(&rx), 29);
        engine.stop();
    }

    // While offline, the server reorganizes to a heavier branch and grows.
    let branch = extend_chain(&headers[24], 8, 4242);
    client.reorg_to(25, &branch);

    // Second run: the stored tip is still 29, the persisted chain is picked
    // up as-is, and the reorg is resolved against the new server chain.
    {
        let engine = open_engine(dir.path(), Arc::clone(&client));

        // Reopening alone is not being synced: no server has reported a
        // tip yet for this run.
        let status = engine.status().unwrap();
        assert_eq!(status.tip_height, 29);
        assert_eq!(status.target_height, -1);
        assert!(!status.synced);

        let rx = engine.subscribe();
        engine.init().unwrap();
        assert_eq!(wait_for_synced(&rx), 32);

        let (tip_height, tip_header) = engine.chain().tip().unwrap().unwrap();
        assert_eq!(tip_height, 32);
        assert_eq!(tip_header, branch[7]);

        // The prefix below the fork is untouched.
        let status = engine.status().unwrap();
        assert!(status.synced);
        engine.stop();
    }
}
