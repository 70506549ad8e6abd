// ============================================
// File: crates/kpxc-transport/src/stream.rs
// ============================================
//! # Length-Prefixed Stream Connection
//!
//! ## Creation Reason
//! Browsers talk to native-messaging hosts over stdin/stdout, framing every
//! message with its length. This connection speaks that framing over any
//! `AsyncRead` + `AsyncWrite` pair.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────────────┬─────────────────────────────┐
//! │ length: u32 (LE)     │ message bytes (length)      │
//! └──────────────────────┴─────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Partial reads are buffered across calls, so a timed-out `receive`
//!   never loses bytes that already arrived
//! - stdout is the protocol channel in this mode; logs must go to stderr
//!
//! ## Last Modified
//! v0.1.0 - Initial stream connection

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{with_deadline, Connection};

/// Size of the length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

const READ_CHUNK: usize = 16 * 1024;

/// Connection framing messages with a 4-byte little-endian length.
pub struct StreamConnection<R, W> {
    reader: R,
    writer: W,
    pending: Vec<u8>,
    open: bool,
}

impl<R, W> StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps a reader and a writer. The connection starts open.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::new(),
            open: true,
        }
    }

    /// Splits off a complete frame from the buffer, if one is there.
    fn take_frame(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>> {
        if self.pending.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&self.pending[..FRAME_HEADER_SIZE]);
        let size = u32::from_le_bytes(header) as usize;
        if size > max_bytes {
            return Err(TransportError::FrameTooLarge {
                size,
                max: max_bytes,
            });
        }
        if self.pending.len() < FRAME_HEADER_SIZE + size {
            return Ok(None);
        }
        let frame = self.pending[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + size].to_vec();
        self.pending.drain(..FRAME_HEADER_SIZE + size);
        Ok(Some(frame))
    }

    async fn read_frame(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame(max_bytes)? {
                return Ok(frame);
            }
            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(|e| TransportError::io("stream read", e))?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }
}

impl StreamConnection<tokio::io::Stdin, tokio::io::Stdout> {
    /// Native-messaging connection over the process's stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<S> StreamConnection<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Frames a single bidirectional stream.
    pub fn split(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            pending: Vec::new(),
            open: true,
        }
    }
}

#[async_trait]
impl<R, W> Connection for StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn connect(&mut self, _address: &str) -> Result<()> {
        // The pipe exists from construction; connecting just (re)opens it.
        self.open = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        let size = u32::try_from(data.len()).map_err(|_| TransportError::FrameTooLarge {
            size: data.len(),
            max: u32::MAX as usize,
        })?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
        frame.extend_from_slice(&size.to_le_bytes());
        frame.extend_from_slice(data);

        self.writer
            .write_all(&frame)
            .await
            .map_err(|e| TransportError::io("stream write", e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::io("stream flush", e))?;
        trace!(bytes = data.len(), "Sent frame");
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        let frame = with_deadline("stream receive", timeout, self.read_frame(max_bytes)).await?;
        trace!(bytes = frame.len(), "Received frame");
        Ok(frame)
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.writer
                .flush()
                .await
                .map_err(|e| TransportError::io("stream flush", e))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }
}
