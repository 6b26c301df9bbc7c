//! Connection abstraction and the file-backed transport.
//!
//! The pipeline never talks to a socket directly: it drives a
//! [`ProfilingConnection`] obtained from a [`ConnectionFactory`], so hosts
//! plug in whatever transport reaches their monitor. The crate ships a
//! file-backed implementation used for capture files and offline replay;
//! in-process subscribers observe outbound traffic through
//! [`LocalPacketHandler`].

#[cfg(test)]
pub(crate) mod mock;

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::packet::{Packet, FRAME_HEADER_LEN};
use crate::service::ProfilingOptions;

/// A bidirectional framed-packet channel to the monitor.
pub trait ProfilingConnection: Send + Sync {
    fn is_open(&self) -> bool;

    /// Closes the channel; subsequent reads and writes fail.
    fn close(&self);

    /// Writes one or more already-framed packets.
    fn write_packet_data(&self, data: &[u8]) -> Result<()>;

    /// Reads the next inbound packet, failing with [`Error::Timeout`] when
    /// none arrives within `timeout`.
    fn read_packet(&self, timeout: Duration) -> Result<Packet>;
}

/// Produces a connection for the current options.
pub trait ConnectionFactory: Send + Sync {
    fn new_connection(&self, options: &ProfilingOptions) -> Result<Arc<dyn ProfilingConnection>>;
}

/// In-process subscriber receiving a copy of every outbound packet.
pub trait LocalPacketHandler: Send + Sync {
    fn on_packet(&self, packet: &Packet);
}

/// Default factory: file transport when `file_only` is set, nothing else.
///
/// Socket transports are deliberately not built in; hosts that stream to a
/// live monitor install their own factory.
pub struct DefaultConnectionFactory;

impl ConnectionFactory for DefaultConnectionFactory {
    fn new_connection(&self, options: &ProfilingOptions) -> Result<Arc<dyn ProfilingConnection>> {
        if options.file_only {
            Ok(Arc::new(FileConnection::new(
                options.outgoing_capture_file.as_deref(),
                options.incoming_capture_file.as_deref(),
            )?))
        } else {
            Err(Error::InvalidArgument(
                "no transport configured: set file_only or install a connection factory".into(),
            ))
        }
    }
}

struct Incoming {
    file: File,
    pending: Vec<u8>,
}

impl Incoming {
    // Extracts one complete frame from the pending bytes, if there is one.
    fn take_frame(&mut self) -> Option<Packet> {
        if self.pending.len() < FRAME_HEADER_LEN {
            return None;
        }
        let length = u32::from_le_bytes([
            self.pending[4],
            self.pending[5],
            self.pending[6],
            self.pending[7],
        ]) as usize;
        let frame_len = FRAME_HEADER_LEN + length;
        if self.pending.len() < frame_len {
            return None;
        }
        let header = u32::from_le_bytes([
            self.pending[0],
            self.pending[1],
            self.pending[2],
            self.pending[3],
        ]);
        let payload = self.pending[FRAME_HEADER_LEN..frame_len].to_vec();
        self.pending.drain(..frame_len);
        Some(Packet::from_header(header, payload))
    }
}

/// Connection backed by capture files.
///
/// Outbound packets append to the outgoing capture file (or are dropped when
/// none is configured); inbound commands are replayed from the incoming
/// capture file as they appear, which lets a test or a tool drive the
/// pipeline by appending frames.
pub struct FileConnection {
    open: AtomicBool,
    outgoing: Option<Mutex<File>>,
    incoming: Option<Mutex<Incoming>>,
}

impl FileConnection {
    pub fn new(outgoing: Option<&Path>, incoming: Option<&Path>) -> Result<FileConnection> {
        let outgoing = outgoing
            .map(|path| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)
            })
            .transpose()?
            .map(Mutex::new);
        let incoming = incoming
            .map(|path| OpenOptions::new().read(true).open(path))
            .transpose()?
            .map(|file| {
                Mutex::new(Incoming {
                    file,
                    pending: Vec::new(),
                })
            });
        Ok(FileConnection {
            open: AtomicBool::new(true),
            outgoing,
            incoming,
        })
    }
}

impl ProfilingConnection for FileConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn write_packet_data(&self, data: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Io(ErrorKind::BrokenPipe.into()));
        }
        if let Some(outgoing) = &self.outgoing {
            let mut file = outgoing.lock().unwrap();
            file.write_all(data)?;
            file.flush()?;
        }
        Ok(())
    }

    fn read_packet(&self, timeout: Duration) -> Result<Packet> {
        let Some(incoming) = &self.incoming else {
            thread::sleep(timeout);
            return Err(Error::Timeout(timeout));
        };

        let mut incoming = incoming.lock().unwrap();
        let mut chunk = [0u8; 4096];
        loop {
            if !self.is_open() {
                return Err(Error::Io(ErrorKind::BrokenPipe.into()));
            }
            if let Some(packet) = incoming.take_frame() {
                return Ok(packet);
            }
            match incoming.file.read(&mut chunk)? {
                // Nothing appended yet; report a timeout so the receive
                // loop can poll its stop flag.
                0 => {
                    thread::sleep(timeout);
                    return Err(Error::Timeout(timeout));
                }
                n => incoming.pending.extend_from_slice(&chunk[..n]),
            }
        }
    }
}
