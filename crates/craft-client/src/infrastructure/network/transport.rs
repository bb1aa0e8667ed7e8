//! Socket establishment behind a trait seam.
//!
//! The driver only needs a byte pipe that is both readable and writable.
//! [`TcpConnector`] produces real TCP sockets; tests plug in in-memory
//! duplex pipes or a mock.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A connected, bidirectional byte stream.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedTransport = Box<dyn Transport>;

/// Opens a fresh transport to `host:port` each time it is called.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxedTransport>;
}

/// Plain TCP with `TCP_NODELAY` and OS-level keepalive probes.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    /// Idle time before the OS starts sending keepalive probes.
    pub keepalive: Option<Duration>,
}

impl TcpConnector {
    pub fn new(keepalive: Option<Duration>) -> Self {
        Self { keepalive }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxedTransport> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        if let Some(idle) = self.keepalive {
            SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        }
        debug!(host, port, local = ?stream.local_addr().ok(), "tcp socket established");
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_reaches_local_listener() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TcpConnector::new(Some(Duration::from_secs(30)));

        // Act
        let (client, accepted) = tokio::join!(connector.connect("127.0.0.1", port), listener.accept());
        let mut client = client.unwrap();
        let (mut server, _) = accepted.unwrap();
        client.write_all(b"V,1\n").await.unwrap();

        // Assert
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"V,1\n");
    }

    #[tokio::test]
    async fn test_tcp_connector_reports_refused_connection() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TcpConnector::default().connect("127.0.0.1", port).await;

        assert!(result.is_err());
    }
}
