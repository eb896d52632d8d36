//! Session dispatcher: one request/response exchange per connection.
//!
//! The host supplies a [`Connector`]; every exchange dials a fresh stream,
//! writes the whole request, reads exactly the 7-byte header and then exactly
//! the advertised payload, and hands the bytes to the wire codec. There is no
//! retry and no pooling; the stream is dropped when the exchange ends.

use std::io::{self, Read, Write};

use crate::protocol::{ResponsePayload, RESPONSE_HEADER_LEN};
use crate::wire::{self, ProtocolError};

/// Upper bound on an advertised response payload. The length field is
/// server-controlled; anything past this is treated as malformed rather than
/// allocated.
pub const MAX_RESPONSE_PAYLOAD: u32 = 16 * 1024 * 1024; // 16 MiB

/// Supplies a fresh byte stream per exchange. The CLI implements this over
/// `TcpStream`; tests script it in memory.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&mut self) -> io::Result<Self::Stream>;
}

/// Connection or I/O failure during an exchange. The original client treated
/// these as fatal; here the host decides.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not connect to server: {0}")]
    Connect(#[source] io::Error),
    #[error("i/o failure during exchange: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Owns the connector and performs exchanges. A response is either fully
/// parsed or not returned at all; there is no partial-result path.
pub struct Dispatcher<C: Connector> {
    connector: C,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn exchange(&mut self, request: &[u8]) -> Result<ResponsePayload, ExchangeError> {
        let mut stream = self.connector.connect().map_err(TransportError::Connect)?;
        stream.write_all(request).map_err(TransportError::Io)?;
        stream.flush().map_err(TransportError::Io)?;

        let mut header_buf = [0u8; RESPONSE_HEADER_LEN];
        stream.read_exact(&mut header_buf).map_err(TransportError::Io)?;
        let header = wire::decode_response_header(&header_buf)?;

        if header.payload_size > MAX_RESPONSE_PAYLOAD {
            tracing::warn!(
                advertised = header.payload_size,
                "server advertised an oversized payload"
            );
            return Err(ProtocolError::Malformed {
                what: "oversized response",
                len: header.payload_size as usize,
            }
            .into());
        }
        let mut payload = vec![0u8; header.payload_size as usize];
        stream.read_exact(&mut payload).map_err(TransportError::Io)?;

        Ok(wire::decode_payload(&header, &payload)?)
    }
}
