//! Physical channels to the tester.
//!
//! A [`Channel`] is either a serial line or a UDP socket. Both variants
//! offer the same three steps of an exchange (discard stale input, write one
//! line, read one line within the timeout), so the
//! [`Transceiver`](crate::Transceiver) never branches on the transport kind.

use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::port::{DEFAULT_TIMEOUT, Port, SerialConfig};

/// Largest datagram accepted from the tester.
pub const MAX_DATAGRAM: usize = 1024;

/// UDP transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramConfig {
    /// Tester address as `host:port` (e.g., "192.168.0.33:5001").
    pub remote: String,
    /// Local port to bind; 0 picks an ephemeral port.
    pub local_port: u16,
    /// Send and receive timeout.
    pub timeout: Duration,
}

impl DatagramConfig {
    /// Create a configuration for the given tester address with defaults.
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            local_port: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the local bind port.
    #[must_use]
    pub fn with_local_port(mut self, local_port: u16) -> Self {
        self.local_port = local_port;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the remote address.
    pub fn remote_addr(&self) -> Result<SocketAddr> {
        self.remote
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("invalid tester address '{}': {e}", self.remote)))?
            .next()
            .ok_or_else(|| Error::Config(format!("tester address '{}' did not resolve", self.remote)))
    }
}

/// Which physical channel to open. Chosen once, never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelConfig {
    /// RS-232 serial port.
    Serial(SerialConfig),
    /// UDP over Ethernet.
    Datagram(DatagramConfig),
}

impl ChannelConfig {
    /// Open the configured channel.
    pub fn open(&self) -> Result<Channel> {
        match self {
            #[cfg(feature = "native")]
            Self::Serial(config) => {
                let port = crate::port::NativePort::open(config)?;
                Ok(Channel::Serial(SerialChannel::new(Box::new(port))))
            },
            #[cfg(not(feature = "native"))]
            Self::Serial(_) => Err(Error::Unsupported(
                "Serial ports are only available with native feature".to_string(),
            )),
            Self::Datagram(config) => Ok(Channel::Datagram(DatagramChannel::open(config)?)),
        }
    }

    /// Human-readable channel description.
    pub fn describe(&self) -> String {
        match self {
            Self::Serial(config) => format!("serial {}", config.port_name),
            Self::Datagram(config) => format!("udp {}", config.remote),
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// An open physical channel.
pub enum Channel {
    /// Serial line.
    Serial(SerialChannel),
    /// UDP socket.
    Datagram(DatagramChannel),
}

impl Channel {
    /// Human-readable channel description.
    pub fn describe(&self) -> String {
        match self {
            Self::Serial(c) => format!("serial {}", c.port.name()),
            Self::Datagram(c) => format!("udp {}", c.remote),
        }
    }

    /// Drop unread input so a late reply cannot be taken for the answer to
    /// the next command.
    pub(crate) fn discard_stale_input(&mut self) -> Result<()> {
        match self {
            Self::Serial(c) => c.discard_stale_input(),
            Self::Datagram(c) => c.discard_stale_input(),
        }
    }

    /// Write one complete command line.
    pub(crate) fn send_line(&mut self, line: &[u8]) -> Result<()> {
        match self {
            Self::Serial(c) => c
                .port
                .send(line),
            Self::Datagram(c) => c.send(line),
        }
    }

    /// Read one reply line; `None` when nothing arrived within the timeout.
    pub(crate) fn receive_line(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Serial(c) => c.read_line(),
            Self::Datagram(c) => c.receive(),
        }
    }

    /// Release the channel.
    pub(crate) fn close(&mut self) -> Result<()> {
        match self {
            Self::Serial(c) => c
                .port
                .close(),
            // The socket is released when the channel is dropped
            Self::Datagram(_) => Ok(()),
        }
    }
}

/// Line framing over a byte-level [`Port`].
pub struct SerialChannel {
    port: Box<dyn Port>,
}

impl SerialChannel {
    /// Wrap an already opened port.
    pub fn new(port: Box<dyn Port>) -> Self {
        Self { port }
    }

    fn discard_stale_input(&mut self) -> Result<()> {
        let waiting = self
            .port
            .pending()?;
        if waiting > 0 {
            debug!("Discarding {waiting} stale bytes on {}", self.port.name());
            self.port
                .discard_input()?;
        }
        Ok(())
    }

    /// Read bytes until `\n` or until the port timeout has elapsed since the
    /// read began. Every single read is limited to the time left.
    ///
    /// A partial line at the timeout is returned as received.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + self.port.read_timeout();
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port
                .set_read_limit(remaining)?;

            match self.port.read(&mut byte) {
                Ok(0) => {},
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        return Ok(Some(line));
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {},
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if line.is_empty() {
            Ok(None)
        } else {
            warn!(
                "Unterminated reply on {} after {:?}: {:?}",
                self.port.name(),
                self.port.read_timeout(),
                String::from_utf8_lossy(&line)
            );
            Ok(Some(line))
        }
    }
}

/// UDP socket bound locally and aimed at one tester.
pub struct DatagramChannel {
    socket: UdpSocket,
    remote: SocketAddr,
    timeout: Duration,
}

impl DatagramChannel {
    /// Bind a local socket for the configured tester.
    pub fn open(config: &DatagramConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(Error::Config("datagram timeout must be non-zero".into()));
        }
        let remote = config.remote_addr()?;
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], config.local_port).into()
        } else {
            ([0u16; 8], config.local_port).into()
        };

        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(config.timeout))?;
        socket.set_read_timeout(Some(config.timeout))?;
        debug!("Bound {} for tester {remote}", socket.local_addr()?);

        Ok(Self {
            socket,
            remote,
            timeout: config.timeout,
        })
    }

    /// Tester address.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn send(&mut self, line: &[u8]) -> Result<()> {
        self.socket
            .send_to(line, self.remote)?;
        Ok(())
    }

    /// Drain datagrams already queued on the socket without blocking.
    fn discard_stale_input(&mut self) -> Result<()> {
        self.socket
            .set_nonblocking(true)?;
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut dropped = 0usize;
        let drained = loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    debug!("Discarding stale {n}-byte datagram from {from}");
                    dropped += 1;
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => break Err(Error::Io(e)),
            }
        };
        self.socket
            .set_nonblocking(false)?;
        if dropped > 0 {
            debug!("Discarded {dropped} stale datagrams from {}", self.remote);
        }
        drained
    }

    /// Receive one datagram from the tester within the timeout. Datagrams
    /// from any other address are skipped.
    fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket
                .set_read_timeout(Some(remaining))?;

            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) if from == self.remote => {
                    trace!("Received {n} bytes from {from}");
                    return Ok(Some(buf[..n].to_vec()));
                },
                Ok((n, from)) => {
                    debug!("Ignoring {n} bytes from unexpected peer {from}");
                },
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None);
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPort;
    use std::thread;

    #[test]
    fn test_serial_read_line_stops_at_newline() {
        let port = MockPort::new("mock").with_reply(b"ACK\r\nEXTRA");
        let mut channel = Channel::Serial(SerialChannel::new(Box::new(port)));

        channel
            .send_line(b"EXEC:LINK:RUN\n")
            .unwrap();
        let line = channel
            .receive_line()
            .unwrap();
        assert_eq!(line.as_deref(), Some(&b"ACK\r\n"[..]));
    }

    #[test]
    fn test_serial_read_line_absent_on_silence() {
        let port = MockPort::new("mock").with_timeout(Duration::from_millis(20));
        let mut channel = Channel::Serial(SerialChannel::new(Box::new(port)));

        let start = Instant::now();
        assert_eq!(
            channel
                .receive_line()
                .unwrap(),
            None
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_serial_partial_line_returned_at_timeout() {
        let port = MockPort::new("mock")
            .with_timeout(Duration::from_millis(20))
            .with_reply(b"YE");
        let mut channel = Channel::Serial(SerialChannel::new(Box::new(port)));
        channel
            .send_line(b"READ:LINK:ACTIVATION?\n")
            .unwrap();

        assert_eq!(
            channel
                .receive_line()
                .unwrap()
                .as_deref(),
            Some(&b"YE"[..])
        );
    }

    /// Port that delivers one byte late, then blocks for its whole read
    /// limit on every further read.
    struct TricklePort {
        timeout: Duration,
        limit: Duration,
        delivered: bool,
    }

    impl std::io::Read for TricklePort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.delivered {
                self.delivered = true;
                thread::sleep(Duration::from_millis(150));
                buf[0] = b'Y';
                return Ok(1);
            }
            thread::sleep(self.limit.min(self.timeout));
            Err(std::io::Error::new(ErrorKind::TimedOut, "timed out"))
        }
    }

    impl std::io::Write for TricklePort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for TricklePort {
        fn read_timeout(&self) -> Duration {
            self.timeout
        }

        fn set_read_limit(&mut self, limit: Duration) -> Result<()> {
            self.limit = limit;
            Ok(())
        }

        fn pending(&self) -> Result<u32> {
            Ok(0)
        }

        fn discard_input(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "trickle"
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_serial_read_line_never_outlasts_timeout() {
        let timeout = Duration::from_millis(200);
        let port = TricklePort {
            timeout,
            limit: timeout,
            delivered: false,
        };
        let mut channel = Channel::Serial(SerialChannel::new(Box::new(port)));

        let start = Instant::now();
        let line = channel
            .receive_line()
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(line.as_deref(), Some(&b"Y"[..]));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");
    }

    #[test]
    fn test_serial_discard_clears_only_when_bytes_waiting() {
        let port = MockPort::new("mock");
        let tap = port.tap();
        let mut channel = Channel::Serial(SerialChannel::new(Box::new(port)));

        channel
            .discard_stale_input()
            .unwrap();
        assert_eq!(tap.clears(), 0);

        tap.preload(b"garbage\r\n");
        channel
            .discard_stale_input()
            .unwrap();
        assert_eq!(tap.clears(), 1);
    }

    #[test]
    fn test_serial_close_twice_fails() {
        let mut channel = Channel::Serial(SerialChannel::new(Box::new(MockPort::new("mock"))));
        assert!(channel.close().is_ok());
        assert!(channel.close().is_err());
    }

    #[test]
    fn test_datagram_config_defaults() {
        let config = DatagramConfig::new("192.168.0.33:5001");
        assert_eq!(config.local_port, 0);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config
                .remote_addr()
                .unwrap()
                .port(),
            5001
        );
    }

    #[test]
    fn test_datagram_config_bad_address() {
        let config = DatagramConfig::new("not an address");
        assert!(matches!(config.remote_addr(), Err(Error::Config(_))));
    }

    #[test]
    fn test_channel_config_describe() {
        let serial = ChannelConfig::Serial(SerialConfig::new("COM12"));
        let udp = ChannelConfig::Datagram(DatagramConfig::new("192.168.0.33:5001"));
        assert_eq!(serial.to_string(), "serial COM12");
        assert_eq!(udp.to_string(), "udp 192.168.0.33:5001");
    }

    #[test]
    fn test_datagram_exchange_with_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer
            .local_addr()
            .unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (n, from) = peer
                .recv_from(&mut buf)
                .unwrap();
            assert_eq!(&buf[..n], b"*IDN?\n");
            peer.send_to(b"RWC5020A LoRaWAN Tester\r\n", from)
                .unwrap();
        });

        let config = DatagramConfig::new(peer_addr.to_string()).with_timeout(Duration::from_secs(2));
        let mut channel = Channel::Datagram(DatagramChannel::open(&config).unwrap());
        channel
            .send_line(b"*IDN?\n")
            .unwrap();
        let reply = channel
            .receive_line()
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"RWC5020A LoRaWAN Tester\r\n"[..]));
        handle
            .join()
            .unwrap();
    }

    #[test]
    fn test_datagram_silence_is_absent_within_timeout() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = DatagramConfig::new(
            peer.local_addr()
                .unwrap()
                .to_string(),
        )
        .with_timeout(Duration::from_millis(100));
        let mut channel = Channel::Datagram(DatagramChannel::open(&config).unwrap());

        let start = Instant::now();
        channel
            .send_line(b"READ:LINK:MSG?\n")
            .unwrap();
        assert_eq!(
            channel
                .receive_line()
                .unwrap(),
            None
        );
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[test]
    fn test_datagram_late_reply_is_not_taken_for_next() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer
            .local_addr()
            .unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (_, from) = peer
                .recv_from(&mut buf)
                .unwrap();
            thread::sleep(Duration::from_millis(200));
            peer.send_to(b"NA\r\n", from)
                .unwrap();
            let (n, from) = peer
                .recv_from(&mut buf)
                .unwrap();
            assert_eq!(&buf[..n], b"EXEC:LINK:MSG_RESET\n");
            peer.send_to(b"ACK\r\n", from)
                .unwrap();
        });

        let config = DatagramConfig::new(peer_addr.to_string()).with_timeout(Duration::from_millis(100));
        let mut channel = Channel::Datagram(DatagramChannel::open(&config).unwrap());
        channel
            .send_line(b"READ:LINK:MSG?\n")
            .unwrap();
        assert_eq!(
            channel
                .receive_line()
                .unwrap(),
            None
        );

        // The late "NA" lands in the socket queue meanwhile
        thread::sleep(Duration::from_millis(250));
        channel
            .discard_stale_input()
            .unwrap();
        channel
            .send_line(b"EXEC:LINK:MSG_RESET\n")
            .unwrap();
        let reply = channel
            .receive_line()
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"ACK\r\n"[..]));
        handle
            .join()
            .unwrap();
    }

    #[test]
    fn test_datagram_ignores_other_port_on_same_host() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let stray = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = DatagramConfig::new(
            peer.local_addr()
                .unwrap()
                .to_string(),
        )
        .with_timeout(Duration::from_secs(2));
        let mut channel = DatagramChannel::open(&config).unwrap();
        let local = SocketAddr::from((
            [127, 0, 0, 1],
            channel
                .local_addr()
                .unwrap()
                .port(),
        ));

        stray
            .send_to(b"NAK\r\n", local)
            .unwrap();
        peer.send_to(b"ACK\r\n", local)
            .unwrap();

        let reply = channel
            .receive()
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"ACK\r\n"[..]));
    }

    #[test]
    fn test_datagram_zero_timeout_rejected() {
        let config = DatagramConfig::new("127.0.0.1:5001").with_timeout(Duration::ZERO);
        assert!(matches!(DatagramChannel::open(&config), Err(Error::Config(_))));
    }
}
