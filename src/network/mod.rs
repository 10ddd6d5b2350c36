use std::fmt;
use std::io;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use hexplay::HexViewBuilder;
use socket2::{Domain, Socket, Type};

use errors::{ErrorKind, Result};

/// A single blocking connection to one broker.
///
/// The producer keeps at most one of these open, pointed at the current
/// partition leader; the metadata client opens short-lived ones against
/// seed brokers.
pub struct Connection {
    addr: String,
    stream: TcpStream,
}

impl Connection {
    /// Opens a TCP stream to `addr`.
    ///
    /// The send-buffer hint has to be applied to the socket before it
    /// connects, hence the detour through `socket2`. `read_timeout` bounds
    /// both the connect and every subsequent read.
    pub fn open(addr: &str, send_buffer_size: usize, read_timeout: Duration) -> Result<Connection> {
        let socket_addr = addr.to_socket_addrs()?
            .next()
            .ok_or_else(|| ErrorKind::InvalidBrokerAddr(addr.to_owned()))?;

        let domain = if socket_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_send_buffer_size(send_buffer_size)?;
        socket.connect_timeout(&socket_addr.into(), read_timeout)?;

        let stream: TcpStream = socket.into();
        stream.set_read_timeout(Some(read_timeout))?;

        debug!("connected to broker {}", addr);

        Ok(Connection {
            addr: addr.to_owned(),
            stream: stream,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Writes one whole request frame.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        if log_enabled!(::log::Level::Trace) {
            trace!("sending {} bytes to {}:\n{}",
                   frame.len(),
                   self.addr,
                   HexViewBuilder::new(frame).row_width(16).finish());
        }

        self.stream.write_all(frame)?;
        self.stream.flush()?;

        Ok(())
    }

    /// Reads exactly `buf.len()` bytes, looping through short reads.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf)?;

        Ok(())
    }

    /// Discards whatever is still buffered on the socket without blocking.
    pub fn drain(&mut self) -> Result<()> {
        self.stream.set_nonblocking(true)?;

        let mut scratch = [0u8; 512];
        let mut drained = 0;

        let res = loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(n) => drained += n,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        self.stream.set_nonblocking(false)?;
        res?;

        if drained > 0 {
            debug!("drained {} trailing bytes from {}", drained, self.addr);
        }

        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Connection {{ addr: {} }}", self.addr)
    }
}
