//! Shared helpers for runtime integration tests
//!
//! Every test builds its own directory on free loopback ports so tests can
//! run in parallel without sharing sockets.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modlink_runtime::{
    ChannelKind, ChannelSocketParam, ModuleDirectory, ModuleId, TimeSource, Timestamp,
};
use tokio::time::{sleep, Instant};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ----------------------------------------------------------------------------
// Logging
// ----------------------------------------------------------------------------

/// Route framework logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------------
// Addressing
// ----------------------------------------------------------------------------

/// Ask the OS for a currently unused UDP port
pub fn free_port() -> u16 {
    UdpSocket::bind(SocketAddr::new(LOOPBACK, 0))
        .and_then(|socket| socket.local_addr())
        .map(|addr| addr.port())
        .expect("failed to reserve a loopback port")
}

/// Directory with both channels of every listed module on fresh ports
///
/// Output ports are left at 0 so each output socket gets an ephemeral port
/// on first send.
pub fn test_directory(modules: &[u16]) -> Arc<ModuleDirectory> {
    let mut directory = ModuleDirectory::new();
    for &module in modules {
        for kind in ChannelKind::ALL {
            directory
                .insert(
                    ModuleId::new(module),
                    kind,
                    ChannelSocketParam::new(LOOPBACK, free_port(), 0),
                )
                .expect("duplicate module in test directory");
        }
    }
    Arc::new(directory)
}

/// Input address of `module` on `kind`
pub fn input_addr(directory: &ModuleDirectory, module: u16, kind: ChannelKind) -> SocketAddr {
    directory
        .lookup(ModuleId::new(module), kind)
        .expect("module missing from test directory")
        .input_addr()
}

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Settable clock for checking send timestamps
#[derive(Debug, Clone, Default)]
pub struct MockTimeSource {
    current_time: Arc<AtomicI64>,
}

impl MockTimeSource {
    pub fn new_at(millis: i64) -> Self {
        Self {
            current_time: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Waiting
// ----------------------------------------------------------------------------

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}
