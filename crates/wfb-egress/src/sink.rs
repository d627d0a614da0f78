use std::net::{SocketAddr, UdpSocket};

use anyhow::{Context, Result};

use crate::message::Message;

/// Result of handing one message to the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOutcome {
    /// Bytes actually written to the link.
    pub bytes_sent: u32,
    /// Injection errors reported by the link for this message.
    pub inject_errors: u16,
}

/// Raw send capability driven by the send loop.
///
/// Implemented by [`UdpInjector`] and by mock senders in tests. An `Err`
/// from [`RawSender::send`] is recorded by the loop as a single inject
/// error; retries, if any, are the implementation's business.
pub trait RawSender: Send {
    /// Turns a dequeued message into its on-air form.
    ///
    /// Runs inside the loop's encode timing window. The default is a
    /// pass-through for links that take messages as-is.
    fn prepare(&mut self, msg: Message) -> Message {
        msg
    }

    /// Injects one message onto the link.
    fn send(&mut self, msg: Message) -> Result<SendOutcome>;
}

/// Sends each message as a single datagram on a connected UDP socket.
///
/// A short write is reported as one inject error.
pub struct UdpInjector {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpInjector {
    /// Binds an ephemeral socket of the peer's address family and connects it.
    pub fn connect(peer: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = if peer.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).with_context(|| format!("bind {bind}"))?;
        socket
            .connect(peer)
            .with_context(|| format!("connect {peer}"))?;
        Ok(UdpInjector { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl RawSender for UdpInjector {
    fn send(&mut self, msg: Message) -> Result<SendOutcome> {
        let written = self
            .socket
            .send(msg.data())
            .with_context(|| format!("send {} bytes to {}", msg.len(), self.peer))?;
        Ok(SendOutcome {
            bytes_sent: u32::try_from(written).unwrap_or(u32::MAX),
            inject_errors: u16::from(written < msg.len()),
        })
    }
}
