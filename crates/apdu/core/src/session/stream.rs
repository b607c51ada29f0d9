//! Session over a byte stream
//!
//! Incoming frames are decoded on a dedicated reader thread and handed over
//! through a bounded channel. The reader thread only decodes frames, it never
//! touches workflow or channel state.
//!
//! On drop the session closes the input through its input closer, when one is
//! registered, and joins the reader. Without a closer a reader still blocked
//! on an open input is detached; it exits at the peer's end of stream.

use std::{
    fmt,
    io::{self, BufRead, BufReader, Read, Write},
    net::{Shutdown, TcpStream},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, trace, warn};

use super::{Message, Session, codec};
use crate::{TransportError, session::CodecError};

/// Frames buffered ahead of the workflow
pub const DEFAULT_CAPACITY: usize = 16;

/// Longest `s=<len>&` header, with room for leading zeros
const MAX_HEADER_LEN: u64 = 16;

type Incoming = Result<Message, TransportError>;

type InputCloser = Box<dyn FnOnce() + Send>;

/// [`Session`] over a `Read` + `Write` pair
pub struct StreamSession<W: Write> {
    writer: Option<W>,
    incoming: Option<Receiver<Incoming>>,
    reader: Option<JoinHandle<()>>,
    close_input: Option<InputCloser>,
}

impl<W: Write> StreamSession<W> {
    /// Start a session with the default channel capacity
    pub fn new<R: Read + Send + 'static>(reader: R, writer: W) -> Self {
        Self::with_capacity(reader, writer, DEFAULT_CAPACITY)
    }

    /// Start a session buffering at most `capacity` decoded frames
    pub fn with_capacity<R: Read + Send + 'static>(reader: R, writer: W, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        let handle = thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let item = match read_frame(&mut reader) {
                    Ok(Some(body)) => codec::decode_body(&body).map_err(TransportError::from),
                    Ok(None) => {
                        debug!("Session input reached end of stream");
                        break;
                    }
                    Err(e) => Err(e),
                };
                let fatal = item.is_err();
                if tx.send(item).is_err() || fatal {
                    break;
                }
            }
        });

        Self {
            writer: Some(writer),
            incoming: Some(rx),
            reader: Some(handle),
            close_input: None,
        }
    }

    /// Register how to unblock the reader thread once the session is dropped
    pub fn with_input_closer(mut self, close: impl FnOnce() + Send + 'static) -> Self {
        self.close_input = Some(Box::new(close));
        self
    }
}

impl StreamSession<TcpStream> {
    /// Session over a connected socket; dropping it shuts down the read half
    pub fn tcp(stream: TcpStream) -> io::Result<Self> {
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self::new(reader, stream).with_input_closer(move || {
            if let Err(e) = control.shutdown(Shutdown::Read) {
                debug!(error = %e, "Socket read half already closed");
            }
        }))
    }
}

impl<W: Write> Session for StreamSession<W> {
    fn write(&mut self, message: Message) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        let frame = codec::encode(&message)?;
        trace!(frame = %frame, "Writing session frame");
        writer.write_all(frame.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<Message, TransportError> {
        let incoming = self.incoming.as_ref().ok_or(TransportError::Closed)?;
        let message = incoming.recv().map_err(|_| TransportError::Closed)??;
        trace!(message = message.name(), "Read session message");
        Ok(message)
    }
}

impl<W: Write> Drop for StreamSession<W> {
    fn drop(&mut self) {
        // Closing the receiver stops the reader at its next frame
        self.writer.take();
        self.incoming.take();
        let input_closed = self.close_input.take().map(|close| close()).is_some();

        let Some(handle) = self.reader.take() else {
            return;
        };
        if input_closed || handle.is_finished() {
            if handle.join().is_err() {
                warn!("Session reader thread panicked");
            }
        } else {
            debug!("Session input still open, detaching reader thread");
        }
    }
}

impl<W: Write> fmt::Debug for StreamSession<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("open", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

/// Read one `s=<len>&<body>` frame, `None` at a clean end of stream
fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<String>, TransportError> {
    let mut header = Vec::new();
    if reader
        .by_ref()
        .take(MAX_HEADER_LEN)
        .read_until(b'&', &mut header)?
        == 0
    {
        return Ok(None);
    }
    let len = header
        .strip_prefix(b"s=")
        .and_then(|h| h.strip_suffix(b"&"))
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or(CodecError::MalformedHeader)?;
    let len = codec::parse_length(len)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(
        String::from_utf8(body).map_err(|_| CodecError::MalformedHeader)?,
    ))
}
