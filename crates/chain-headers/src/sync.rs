use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use blockchain_client::{BlockchainClient, TipHeader};

use crate::chain::{HeaderChain, ReorgOutcome};
use crate::error::ChainError;

/// Headers fetched per request while catching up.
pub const DEFAULT_BATCH_SIZE: u32 = 2016;

/// Progress notifications emitted by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEvent {
    SyncStarted,
    Syncing { tip: i64, target: i64 },
    Synced { tip: i64 },
}

/// Fan-out registry for sync events. Delivery is non-blocking: events go
/// into unbounded channels and subscribers whose receiver is gone are
/// dropped on the next send.
#[derive(Default)]
struct Observers {
    senders: Mutex<Vec<Sender<HeaderEvent>>>,
}

impl Observers {
    fn subscribe(&self) -> Receiver<HeaderEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().push(tx);
        rx
    }

    fn notify(&self, event: HeaderEvent) {
        self.senders.lock().retain(|s| s.send(event).is_ok());
    }
}

enum Message {
    Tip(TipHeader),
    Stop,
}

/// Headers-only sync engine.
///
/// Tip notifications from the client arrive on arbitrary threads; they are
/// funneled through a channel into one worker thread, which is the only
/// caller of the chain's mutating operations. Batches commit atomically, so
/// stopping between batches always leaves a fully committed prefix.
pub struct Headers {
    chain: Arc<HeaderChain>,
    client: Arc<dyn BlockchainClient>,
    observers: Arc<Observers>,
    batch_size: u32,
    sender: Sender<Message>,
    receiver: Mutex<Option<Receiver<Message>>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Headers {
    pub fn new(chain: Arc<HeaderChain>, client: Arc<dyn BlockchainClient>) -> Self {
        Self::with_batch_size(chain, client, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(
        chain: Arc<HeaderChain>,
        client: Arc<dyn BlockchainClient>,
        batch_size: u32,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Headers {
            chain,
            client,
            observers: Arc::new(Observers::default()),
            batch_size,
            sender,
            receiver: Mutex::new(Some(receiver)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker and subscribe to the client's tip notifications.
    /// Calling it a second time is a no-op.
    pub fn init(&self) -> Result<(), ChainError> {
        let receiver = match self.receiver.lock().take() {
            Some(receiver) => receiver,
            None => return Ok(()),
        };

        let chain = Arc::clone(&self.chain);
        let client = Arc::clone(&self.client);
        let observers = Arc::clone(&self.observers);
        let stop = Arc::clone(&self.stop);
        let batch_size = self.batch_size;
        let handle = thread::spawn(move || {
            run_worker(&chain, client.as_ref(), &observers, &stop, batch_size, receiver);
        });
        *self.worker.lock() = Some(handle);

        let sender = self.sender.clone();
        self.client.subscribe_headers(Box::new(move |tip| {
            let _ = sender.send(Message::Tip(tip));
        }))?;
        Ok(())
    }

    /// Receive sync events. Subscribing before [`Headers::init`] guarantees
    /// no event is missed.
    pub fn subscribe(&self) -> Receiver<HeaderEvent> {
        self.observers.subscribe()
    }

    pub fn status(&self) -> Result<crate::chain::SyncStatus, ChainError> {
        self.chain.status()
    }

    pub fn chain(&self) -> &Arc<HeaderChain> {
        &self.chain
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Message::Stop);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Headers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    chain: &HeaderChain,
    client: &dyn BlockchainClient,
    observers: &Observers,
    stop: &AtomicBool,
    batch_size: u32,
    receiver: Receiver<Message>,
) {
    while let Ok(message) = receiver.recv() {
        let tip = match message {
            Message::Stop => break,
            Message::Tip(tip) => tip,
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        chain.set_target_height(tip.height);
        debug!(target = tip.height, "tip notification");
        if let Err(e) = sync_to_target(chain, client, observers, stop, batch_size) {
            warn!(error = %e, "header sync aborted, waiting for next tip");
        }
    }
}

fn sync_to_target(
    chain: &HeaderChain,
    client: &dyn BlockchainClient,
    observers: &Observers,
    stop: &AtomicBool,
    batch_size: u32,
) -> Result<(), ChainError> {
    observers.notify(HeaderEvent::SyncStarted);
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        let status = chain.status()?;
        if status.synced {
            info!(tip = status.tip_height, "header chain synced");
            observers.notify(HeaderEvent::Synced {
                tip: status.tip_height,
            });
            return Ok(());
        }

        let start = (status.tip_height + 1) as u32;
        let batch = client.get_headers(start, batch_size)?;
        if batch.is_empty() {
            // The server has nothing past our tip; done until it reports
            // a newer one.
            observers.notify(HeaderEvent::Synced {
                tip: status.tip_height,
            });
            return Ok(());
        }

        match chain.append_headers(start, &batch) {
            Ok(()) => {}
            Err(ChainError::Discontinuity { .. }) if start > 0 => {
                // The server's chain no longer connects to ours: refetch a
                // window reaching back to the deepest acceptable fork and
                // let the chain pick the heavier branch.
                if reconcile_fork(chain, client, batch_size)? == ReorgOutcome::NotBetter {
                    // Nothing to adopt, and refetching would only hit the
                    // same branch again. Re-read the status so the terminal
                    // event still fires when the stored tip meets the
                    // target, e.g. after the server retreats to our chain.
                    let status = chain.status()?;
                    if status.synced {
                        info!(tip = status.tip_height, "header chain synced");
                        observers.notify(HeaderEvent::Synced {
                            tip: status.tip_height,
                        });
                    }
                    return Ok(());
                }
            }
            Err(e) => return Err(e),
        }

        let status = chain.status()?;
        observers.notify(HeaderEvent::Syncing {
            tip: status.tip_height,
            target: status.target_height,
        });
    }
}

fn reconcile_fork(
    chain: &HeaderChain,
    client: &dyn BlockchainClient,
    batch_size: u32,
) -> Result<ReorgOutcome, ChainError> {
    let status = chain.status()?;
    let start = (status.tip_height + 1 - i64::from(chain.max_reorg_depth())).max(0) as u32;
    let overlap = (status.tip_height + 1) as u32 - start;
    let batch = client.get_headers(start, overlap + batch_size)?;
    let outcome = chain.reconcile(start, &batch)?;
    debug!(start, ?outcome, "reconciled fork");
    Ok(outcome)
}
