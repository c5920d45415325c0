//! BLE GATT framing for mdoc data retrieval.
//!
//! The wallet acts as the GATT client (mdoc central client mode). Messages
//! larger than the negotiated MTU are split into chunks of `mtu - 3` payload
//! bytes, each prefixed with a flag byte: 0x01 when more chunks follow, 0x00
//! on the final chunk. The actual GATT stack lives behind the [BleCentral]
//! trait, which keeps this crate free of platform bindings and makes the
//! framing testable in memory.

use async_trait::async_trait;
use uuid::Uuid;

/// Written to the state characteristic to begin a session.
pub const START_SESSION_MARKER: u8 = 0x01;

/// Chunk flag: more chunks follow.
pub const CHUNK_INCOMING: u8 = 0x01;
/// Chunk flag: this is the final chunk.
pub const CHUNK_LAST: u8 = 0x00;

/// ATT header overhead per write, in bytes.
const ATT_OVERHEAD: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("negotiated MTU of {0} leaves no room for payload")]
    MtuTooSmall(usize),
    #[error("received an empty chunk")]
    EmptyChunk,
    #[error("unexpected chunk flag: {0:#04x}")]
    UnexpectedFlag(u8),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// The platform's BLE central role, scoped to what the proximity flow needs.
#[async_trait]
pub trait BleCentral: Send {
    /// The negotiated ATT MTU for the current connection.
    fn mtu(&self) -> usize;

    /// Connects to the peripheral advertising `service_uuid` and discovers
    /// its characteristics.
    async fn init(&mut self, service_uuid: Uuid) -> Result<(), Error>;

    /// Writes a marker to the state characteristic.
    async fn write_state(&mut self, marker: u8) -> Result<(), Error>;

    /// Writes one framed chunk to the client-to-server characteristic.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Error>;

    /// Subscribes to notifications on the server-to-client characteristic.
    ///
    /// Must complete before the peer is prompted to send, otherwise
    /// notifications race the subscription and are lost.
    async fn subscribe(&mut self) -> Result<(), Error>;

    /// The next notification payload, one framed chunk.
    async fn next_notification(&mut self) -> Result<Vec<u8>, Error>;
}

/// Splits `data` into framed chunks sized to the negotiated MTU.
///
/// Empty input produces no chunks.
pub fn chunk_bytes(data: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>, Error> {
    if mtu <= ATT_OVERHEAD {
        return Err(Error::MtuTooSmall(mtu));
    }
    let payload_len = mtu - ATT_OVERHEAD;
    let mut chunks = Vec::with_capacity(data.len().div_ceil(payload_len));
    let mut pieces = data.chunks(payload_len).peekable();
    while let Some(piece) = pieces.next() {
        let flag = if pieces.peek().is_some() {
            CHUNK_INCOMING
        } else {
            CHUNK_LAST
        };
        let mut chunk = Vec::with_capacity(piece.len() + 1);
        chunk.push(flag);
        chunk.extend_from_slice(piece);
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Reassembles a message from framed chunks.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
}

impl MessageAssembler {
    pub fn new() -> MessageAssembler {
        MessageAssembler::default()
    }

    /// Absorbs one chunk. Returns the complete message once the final chunk
    /// arrives, and `None` while more are expected.
    pub fn absorb(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let (&flag, payload) = chunk.split_first().ok_or(Error::EmptyChunk)?;
        match flag {
            CHUNK_INCOMING => {
                self.buffer.extend_from_slice(payload);
                Ok(None)
            }
            CHUNK_LAST => {
                self.buffer.extend_from_slice(payload);
                Ok(Some(std::mem::take(&mut self.buffer)))
            }
            other => Err(Error::UnexpectedFlag(other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chunking_respects_the_att_overhead() {
        let data = vec![0xab; 50];
        let chunks = chunk_bytes(&data, 23).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 21);
        assert_eq!(chunks[0][0], CHUNK_INCOMING);
        assert_eq!(chunks[1].len(), 21);
        assert_eq!(chunks[1][0], CHUNK_INCOMING);
        assert_eq!(chunks[2].len(), 11);
        assert_eq!(chunks[2][0], CHUNK_LAST);

        let concatenated: Vec<u8> = chunks.iter().flat_map(|c| c[1..].to_vec()).collect();
        assert_eq!(concatenated, data);
    }

    #[test]
    fn message_smaller_than_mtu_is_a_single_last_chunk() {
        let chunks = chunk_bytes(&[1, 2, 3], 23).unwrap();
        assert_eq!(chunks, vec![vec![CHUNK_LAST, 1, 2, 3]]);
    }

    #[test]
    fn empty_message_produces_no_chunks() {
        assert!(chunk_bytes(&[], 23).unwrap().is_empty());
    }

    #[test]
    fn tiny_mtu_is_rejected() {
        assert!(matches!(chunk_bytes(&[1], 3), Err(Error::MtuTooSmall(3))));
    }

    #[test]
    fn assembler_reproduces_the_original_message() {
        let data: Vec<u8> = (0..=255).collect();
        let chunks = chunk_bytes(&data, 23).unwrap();
        let mut assembler = MessageAssembler::new();
        let mut result = None;
        for chunk in &chunks {
            assert!(result.is_none());
            result = assembler.absorb(chunk).unwrap();
        }
        assert_eq!(result, Some(data));
    }

    #[test]
    fn malformed_chunks_are_rejected() {
        let mut assembler = MessageAssembler::new();
        assert!(matches!(assembler.absorb(&[]), Err(Error::EmptyChunk)));
        assert!(matches!(
            assembler.absorb(&[0x02, 1, 2]),
            Err(Error::UnexpectedFlag(0x02))
        ));
    }
}
