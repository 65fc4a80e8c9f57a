//! Simple in-proc channel for session delivery.
//!
//! Uses `std::sync::mpsc` under the hood and exposes non-blocking drain
//! helpers. A `Relay` fans messages out per player id; sends to players
//! with no live session are dropped, which is exactly the offline
//! semantics the core wants.

use crate::message::GroupMessage;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

#[derive(Clone)]
pub struct Tx(pub Sender<GroupMessage>);
pub struct Rx(pub Receiver<GroupMessage>);

/// Create a sender/receiver pair. The underlying channel is unbounded.
#[must_use]
pub fn channel() -> (Tx, Rx) {
    let (s, r) = mpsc::channel::<GroupMessage>();
    (Tx(s), Rx(r))
}

impl Tx {
    /// Try to send; returns false if the receiver is dropped.
    #[must_use]
    pub fn try_send(&self, msg: GroupMessage) -> bool {
        self.0.send(msg).is_ok()
    }
}

impl Rx {
    /// Non-blocking receive of a single message.
    #[must_use]
    pub fn try_recv(&self) -> Option<GroupMessage> {
        self.0.try_recv().ok()
    }
    /// Drain all currently queued messages.
    #[must_use]
    pub fn drain(&self) -> Vec<GroupMessage> {
        let mut out = Vec::new();
        while let Some(m) = self.try_recv() {
            out.push(m);
        }
        out
    }
}

/// Per-player delivery table.
#[derive(Default)]
pub struct Relay {
    sessions: Mutex<HashMap<u64, Tx>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session for `player`, returning its receive side.
    pub fn connect(&self, player: u64) -> Rx {
        let (tx, rx) = channel();
        if let Ok(mut s) = self.sessions.lock() {
            s.insert(player, tx);
        }
        rx
    }

    pub fn disconnect(&self, player: u64) {
        if let Ok(mut s) = self.sessions.lock() {
            s.remove(&player);
        }
    }

    /// Deliver to one player; silently dropped when offline.
    pub fn send(&self, player: u64, msg: GroupMessage) {
        if let Ok(s) = self.sessions.lock() {
            if let Some(tx) = s.get(&player) {
                let _ = tx.try_send(msg);
            }
        }
    }
}
