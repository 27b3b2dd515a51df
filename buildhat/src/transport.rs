//! Serial transport to the Build HAT.
//!
//! The UART is split once into a line reader and a byte writer. The reader
//! side is framed with [`BoardCodec`]; the writer is wrapped in a mutex by
//! the controller so commands from different tasks never interleave.
//!
//! ```text
//!             ┌──────────────┐
//!   UART ────▶│ FramedRead   │──▶ LineReader::next_line() ──▶ dispatcher
//!             │ (BoardCodec) │
//!             └──────────────┘
//!   UART ◀─── Writer::write_str() ◀── Mutex<Writer> ◀── devices, shutdown
//! ```
//!
//! Anything implementing `AsyncRead + AsyncWrite` can stand in for the UART,
//! which is how the tests drive the controller over `tokio::io::duplex`.

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, FramedRead};

use crate::config::HatConfig;
use crate::error::{HatError, Result};

pub trait SerialIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialIo for T {}

pub type DynSerial = Box<dyn SerialIo>;

/// Open the UART named in `config` with the board's fixed 8N1 settings.
pub fn open_serial(config: &HatConfig) -> Result<DynSerial> {
    let port = tokio_serial::new(&config.device, config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| HatError::Serial(format!("{}: {}", config.device, e)))?;

    log::info!("Opened {} at {} baud", config.device, config.baud_rate);
    Ok(Box::new(port))
}

// =============================================================================
// Codec
// =============================================================================

/// Splits the inbound byte stream into lines.
///
/// Lines end in `\n` with an optional `\r` before it. Bytes that are not
/// UTF-8 (bootloader noise right after a reset) are replaced rather than
/// reported, since returning an error would terminate the stream.
#[derive(Debug, Default)]
pub struct BoardCodec;

impl BoardCodec {
    fn line(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl Decoder for BoardCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<String>, Self::Error> {
        match src.iter().position(|b| *b == b'\n') {
            Some(end) => {
                let line = Self::line(&src[..=end]);
                src.advance(end + 1);
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::result::Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let line = Self::line(src);
        src.clear();
        Ok(Some(line))
    }
}

// =============================================================================
// Halves
// =============================================================================

pub struct LineReader {
    inner: FramedRead<ReadHalf<DynSerial>, BoardCodec>,
}

impl LineReader {
    /// Next line from the board, without its terminator.
    pub async fn next_line(&mut self) -> Result<String> {
        match self.inner.next().await {
            Some(Ok(line)) => {
                log::trace!("< {}", line);
                Ok(line)
            }
            Some(Err(e)) => Err(HatError::Io(e)),
            None => Err(HatError::TransportClosed),
        }
    }
}

pub struct Writer {
    inner: WriteHalf<DynSerial>,
}

impl Writer {
    /// Write one complete command line.
    pub async fn write_str(&mut self, cmd: &str) -> Result<()> {
        log::trace!("> {}", cmd.trim_end());
        self.inner.write_all(cmd.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write raw bytes; `label` is logged instead of the content.
    pub async fn write_bytes(&mut self, bytes: &[u8], label: &str) -> Result<()> {
        log::trace!("> {} ({} bytes)", label, bytes.len());
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Both halves, used while the negotiator owns the connection.
pub struct Transport {
    pub reader: LineReader,
    pub writer: Writer,
}

impl Transport {
    pub fn new<T: SerialIo + 'static>(io: T) -> Transport {
        let io: DynSerial = Box::new(io);
        let (read, write) = tokio::io::split(io);
        Transport {
            reader: LineReader {
                inner: FramedRead::new(read, BoardCodec),
            },
            writer: Writer { inner: write },
        }
    }

    pub async fn next_line(&mut self) -> Result<String> {
        self.reader.next_line().await
    }

    pub async fn write_str(&mut self, cmd: &str) -> Result<()> {
        self.writer.write_str(cmd).await
    }

    pub fn into_parts(self) -> (LineReader, Writer) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_codec_splits_crlf_lines() {
        let mut codec = BoardCodec;
        let mut buf = BytesMut::from(&b"P0: connected to active ID 30\r\nP1C0: 12"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("P0: connected to active ID 30")
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" 34\r\n\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("P1C0: 12 34"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(""));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_replaces_invalid_utf8() {
        let mut codec = BoardCodec;
        let mut buf = BytesMut::from(&b"\xff\xfeBHBL>\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.ends_with("BHBL>"));
    }

    #[test]
    fn test_codec_flushes_unterminated_line_at_eof() {
        let mut codec = BoardCodec;
        let mut buf = BytesMut::from(&b"BHBL>"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("BHBL>"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[tokio::test]
    async fn test_transport_over_duplex() {
        let (mut board, host) = tokio::io::duplex(256);
        let mut transport = Transport::new(host);

        transport.write_str("version\r").await.unwrap();
        transport
            .writer
            .write_bytes(&[0x02, 0xaa, 0x03], "--payload--")
            .await
            .unwrap();
        let mut buf = [0u8; 11];
        board.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"version\r\x02\xaa\x03");

        board.write_all(b"Firmware version: 1\r\n").await.unwrap();
        assert_eq!(transport.next_line().await.unwrap(), "Firmware version: 1");

        drop(board);
        assert!(matches!(
            transport.next_line().await,
            Err(HatError::TransportClosed)
        ));
    }
}
