//! Single-flight coalescing of concurrent fetches for the same chart.
//!
//! The first caller for a key becomes the leader and is responsible for
//! completing the flight. Callers that arrive while the flight is pending
//! attach as waiters and receive a clone of the leader's result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

pub(crate) enum Attach<T> {
    /// Perform the work, then call [`InFlight::complete`] with this id.
    Leader {
        id: u64,
        receiver: broadcast::Receiver<T>,
    },
    Waiter(broadcast::Receiver<T>),
}

struct Flight<T> {
    id: u64,
    sender: broadcast::Sender<T>,
}

pub(crate) struct InFlight<T> {
    flights: Mutex<HashMap<String, Flight<T>>>,
    next_id: AtomicU64,
    coalesced: AtomicU64,
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn try_attach(&self, key: &str) -> Attach<T> {
        let mut flights = self.flights.lock();

        if let Some(flight) = flights.get(key) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return Attach::Waiter(flight.sender.subscribe());
        }

        // one result per flight
        let (sender, receiver) = broadcast::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        flights.insert(key.to_string(), Flight { id, sender });
        Attach::Leader { id, receiver }
    }

    /// Finish flight `id` and hand `value` to every attached caller. A flight
    /// that was cancelled, and possibly replaced by a newer one, is left
    /// alone. Returns true if the flight was still registered.
    pub fn complete(&self, key: &str, id: u64, value: T) -> bool {
        let flight = {
            let mut flights = self.flights.lock();
            match flights.get(key) {
                Some(flight) if flight.id == id => flights.remove(key),
                _ => None,
            }
        };

        match flight {
            Some(flight) => {
                // no receivers left is fine
                let _ = flight.sender.send(value);
                true
            }
            None => false,
        }
    }

    /// Forget the pending flight for `key` so the next caller starts a new
    /// one. Callers attached to the forgotten flight observe a closed channel.
    pub fn cancel(&self, key: &str) -> bool {
        self.flights.lock().remove(key).is_some()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Number of callers that attached to an existing flight.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}
