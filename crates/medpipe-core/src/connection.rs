//! Per-input connection records.
//!
//! A consumer keeps one [`Connection`] per input port. The producer is held
//! by handle only; if that node is removed the handle stops resolving and the
//! connection is treated as carrying no data.

use serde::{Deserialize, Serialize};

use crate::id::NodeHandle;

/// Link from a producer's output port to one of the owner's input ports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Producer node, `None` when the input is disconnected.
    pub producer: Option<NodeHandle>,
    /// Output port index on the producer.
    pub producer_port: usize,
    /// Producer timestamp last pulled through this connection.
    pub cached_timestamp: u64,
}

impl Connection {
    /// A fresh link that has never pulled data.
    pub fn to(producer: NodeHandle, producer_port: usize) -> Self {
        Connection {
            producer: Some(producer),
            producer_port,
            cached_timestamp: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.producer.is_some()
    }

    /// Forgets the producer and resets the port index to 0.
    pub fn clear(&mut self) {
        self.producer = None;
        self.producer_port = 0;
    }
}
