// UDP plumbing: command frames in from the control server, light readings back out

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Largest frame we accept; longer datagrams are truncated
pub const BUFFER_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to create socket: {0}")]
    Create(io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddrV4, source: io::Error },

    #[error("Failed to receive frame: {0}")]
    Receive(io::Error),

    #[error("Failed to send to {target}: {source}")]
    Send { target: SocketAddrV4, source: io::Error },
}

pub struct BroadcastReceiver {
    socket: UdpSocket,
    buffer: [u8; BUFFER_SIZE],
}

impl BroadcastReceiver {
    /// Bind a non-blocking socket; must be called inside a tokio runtime
    pub fn bind(addr: SocketAddrV4) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::Create)?;
        // several robot processes may share one host during simulation
        socket
            .set_reuse_address(true)
            .map_err(TransportError::Create)?;
        socket
            .set_nonblocking(true)
            .map_err(TransportError::Create)?;
        socket
            .bind(&addr.into())
            .map_err(|source| TransportError::Bind { addr, source })?;

        let std_socket: StdUdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(TransportError::Create)?;

        Ok(Self {
            socket,
            buffer: [0u8; BUFFER_SIZE],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Next pending frame, or None when nothing is waiting
    pub fn try_recv_frame(&mut self) -> Result<Option<String>, TransportError> {
        match self.socket.try_recv_from(&mut self.buffer) {
            Ok((len, _)) => Ok(Some(self.decode(len))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::Receive(e)),
        }
    }

    /// Wait for the next frame
    pub async fn recv_frame(&mut self) -> Result<String, TransportError> {
        let (len, _) = self
            .socket
            .recv_from(&mut self.buffer)
            .await
            .map_err(TransportError::Receive)?;
        Ok(self.decode(len))
    }

    fn decode(&self, len: usize) -> String {
        String::from_utf8_lossy(&self.buffer[..len]).into_owned()
    }
}

/// Sends light sensor readings to the control server, one datagram per reading
pub struct TelemetrySender {
    socket: UdpSocket,
    target: SocketAddrV4,
}

impl TelemetrySender {
    /// Bind an ephemeral broadcast-capable socket aimed at `target`
    pub async fn bind(target: SocketAddrV4) -> Result<Self, TransportError> {
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind { addr: local, source })?;
        socket.set_broadcast(true).map_err(TransportError::Create)?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    /// Reading as decimal ASCII, e.g. `512`
    pub async fn send_reading(&self, value: u16) -> Result<(), TransportError> {
        self.socket
            .send_to(value.to_string().as_bytes(), self.target)
            .await
            .map_err(|source| TransportError::Send {
                target: self.target,
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    #[tokio::test]
    async fn test_receives_frame_text() {
        let mut receiver = BroadcastReceiver::bind(loopback()).unwrap();
        let target = receiver.local_addr().unwrap();

        let sender = UdpSocket::bind(loopback()).await.unwrap();
        sender
            .send_to(b"<start><1>45,80</1><end>", target)
            .await
            .unwrap();

        let frame = receiver.recv_frame().await.unwrap();
        assert_eq!(frame, "<start><1>45,80</1><end>");
    }

    #[tokio::test]
    async fn test_try_recv_without_traffic_is_none() {
        let mut receiver = BroadcastReceiver::bind(loopback()).unwrap();
        assert!(receiver.try_recv_frame().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_telemetry_reading_is_decimal_text() {
        let listener = UdpSocket::bind(loopback()).await.unwrap();
        let target = match listener.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
        };

        let sender = TelemetrySender::bind(target).await.unwrap();
        assert_eq!(sender.target(), target);
        sender.send_reading(511).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"511");
    }
}
