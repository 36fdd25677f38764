//! Datagram socket with explicit lifecycle
//!
//! Wraps a tokio [`UdpSocket`] behind the open / bind / close sequence the
//! channels use. Opening only reserves the socket; binding attaches it to
//! its configured local address. An open socket that was never bound binds
//! itself to that address on its first send.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use modlink_core::{ModlinkError, Result};

enum SocketState {
    Closed,
    Open(OnceCell<UdpSocket>),
}

/// UDP endpoint with fixed-size send and receive
pub struct DatagramSocket {
    local: SocketAddr,
    state: SocketState,
}

impl DatagramSocket {
    /// Create a closed socket for `local`
    pub fn new(local: SocketAddr) -> Self {
        Self {
            local,
            state: SocketState::Closed,
        }
    }

    /// Configured local address
    pub fn configured_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn open(&mut self) -> Result<()> {
        if let SocketState::Open(_) = self.state {
            return Err(ModlinkError::AlreadyOpen);
        }
        self.state = SocketState::Open(OnceCell::new());
        debug!(local = %self.local, "Socket opened");
        Ok(())
    }

    /// Bind to the configured local address
    pub async fn bind(&mut self) -> Result<()> {
        let cell = match &self.state {
            SocketState::Closed => {
                return Err(ModlinkError::invalid_state("cannot bind a closed socket"))
            }
            SocketState::Open(cell) if cell.initialized() => {
                return Err(ModlinkError::invalid_state("socket is already bound"))
            }
            SocketState::Open(cell) => cell,
        };

        let socket = UdpSocket::bind(self.local).await?;
        let bound = socket.local_addr()?;
        cell.set(socket)
            .map_err(|_| ModlinkError::invalid_state("socket is already bound"))?;
        debug!(local = %bound, "Socket bound");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let SocketState::Closed = self.state {
            return Err(ModlinkError::invalid_state("socket is not open"));
        }
        self.state = SocketState::Closed;
        debug!(local = %self.local, "Socket closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SocketState::Open(_))
    }

    pub fn is_bound(&self) -> bool {
        matches!(&self.state, SocketState::Open(cell) if cell.initialized())
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.bound()?.local_addr()?)
    }

    /// Receive one datagram that must be exactly `exact` bytes long
    ///
    /// `timeout` of `None` waits indefinitely; a zero timeout polls once.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        exact: usize,
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr)> {
        if buf.len() < exact {
            return Err(ModlinkError::buffer_too_small(exact, buf.len()));
        }
        let socket = self.bound()?;
        let (len, from) = with_timeout(timeout, socket.recv_from(buf)).await?;
        trace!(len, from = %from, "Datagram received");
        if len != exact {
            return Err(ModlinkError::failed(format!(
                "received {} bytes from {}, expected {}",
                len, from, exact
            )));
        }
        Ok((len, from))
    }

    /// Look at the next datagram without consuming it
    pub async fn recv_peek(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr)> {
        let socket = self.bound()?;
        with_timeout(timeout, socket.peek_from(buf)).await
    }

    /// Send the first `exact` bytes of `buf` to `dest`
    pub async fn send_to(&self, buf: &[u8], exact: usize, dest: SocketAddr) -> Result<usize> {
        if buf.len() < exact {
            return Err(ModlinkError::buffer_too_small(exact, buf.len()));
        }
        let cell = match &self.state {
            SocketState::Closed => {
                return Err(ModlinkError::invalid_state("cannot send on a closed socket"))
            }
            SocketState::Open(cell) => cell,
        };
        let socket = cell
            .get_or_try_init(|| async {
                debug!(local = %self.local, "Binding socket on first send");
                UdpSocket::bind(self.local).await
            })
            .await?;

        let sent = socket.send_to(&buf[..exact], dest).await?;
        if sent != exact {
            return Err(ModlinkError::failed(format!(
                "sent {} of {} bytes to {}",
                sent, exact, dest
            )));
        }
        trace!(len = sent, dest = %dest, "Datagram sent");
        Ok(sent)
    }

    fn bound(&self) -> Result<&UdpSocket> {
        match &self.state {
            SocketState::Closed => Err(ModlinkError::invalid_state("socket is not open")),
            SocketState::Open(cell) => cell
                .get()
                .ok_or_else(|| ModlinkError::invalid_state("socket is not bound")),
        }
    }
}

async fn with_timeout<T, F>(timeout: Option<Duration>, op: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        None => Ok(op.await?),
        Some(limit) => match time_limit(limit, op).await {
            Some(result) => Ok(result?),
            None => Err(ModlinkError::Timeout {
                duration_ms: limit.as_millis() as u64,
            }),
        },
    }
}

// tokio's timeout polls the inner future before checking the deadline, so
// a zero limit still picks up a datagram that is already queued.
async fn time_limit<F: Future>(limit: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(limit, fut).await.ok()
}
