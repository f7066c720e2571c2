//! Point-in-time network availability.
//!
//! Callers ask immediately before each network-eligible decision; nothing
//! here remembers a previous answer. A fetch can still fail after a `true`,
//! which the ordinary remote-failure path handles.

use std::{
    net::{SocketAddr, UdpSocket},
    sync::atomic::{AtomicBool, Ordering},
};

pub trait Connectivity: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Asks the OS for a route to a public address.
///
/// Connecting a UDP socket sends nothing; it only resolves a route, so the
/// check is immediate and fails when no interface can reach `target`.
#[derive(Clone, Debug)]
pub struct RouteProbe {
    target: SocketAddr,
}

impl RouteProbe {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Connectivity for RouteProbe {
    fn is_available(&self) -> bool {
        let bind: SocketAddr = if self.target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        match UdpSocket::bind(bind).and_then(|socket| socket.connect(self.target)) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(target_addr = %self.target, error = %err, "no route to network");
                false
            },
        }
    }
}

/// Connectivity pinned by hand: offline mode and tests.
#[derive(Debug)]
pub struct ManualSwitch {
    online: AtomicBool,
}

impl ManualSwitch {
    pub fn new(online: bool) -> Self {
        Self { online: AtomicBool::new(online) }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for ManualSwitch {
    fn is_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
