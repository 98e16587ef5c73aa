//! UDP ingestion worker.
//!
//! Owns the socket and nothing else: every datagram goes into the intake
//! queue untouched. A short read timeout lets the worker notice its stop flag.

use crate::drivers::{Datagram, IntakeSender, MonitorError};
use log::{error, info};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const READ_TIMEOUT_MS: u64 = 100;

/// Totals reported by a worker that stopped cleanly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub datagrams: u64,
    pub bytes: u64,
    pub dropped: u64,
}

pub struct IngestWorker {
    local_addr: SocketAddr,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<IngestReport, MonitorError>>>,
}

impl IngestWorker {
    pub fn bind(
        addr: SocketAddr,
        recv_buffer_bytes: usize,
        intake: IntakeSender,
    ) -> Result<Self, MonitorError> {
        let socket = UdpSocket::bind(addr)?;
        Self::spawn(socket, recv_buffer_bytes, intake)
    }

    /// Starts the receive thread on an already bound socket.
    pub fn spawn(
        socket: UdpSocket,
        recv_buffer_bytes: usize,
        intake: IntakeSender,
    ) -> Result<Self, MonitorError> {
        socket.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)))?;
        let local_addr = socket.local_addr()?;
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);
        let handle = thread::Builder::new()
            .name("udp-ingest".to_owned())
            .spawn(move || receive_loop(socket, recv_buffer_bytes.max(1), intake, flag))?;
        info!("listening for datagrams on {}", local_addr);
        Ok(Self {
            local_addr,
            stop_flag,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Raises the stop flag and waits for the thread. A socket failure that
    /// ended the worker early comes back here.
    pub fn shutdown(mut self) -> Result<IngestReport, MonitorError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| MonitorError::WorkerPanicked)?,
            None => Ok(IngestReport::default()),
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    socket: UdpSocket,
    recv_buffer_bytes: usize,
    intake: IntakeSender,
    stop_flag: Arc<AtomicBool>,
) -> Result<IngestReport, MonitorError> {
    let mut buf = vec![0u8; recv_buffer_bytes];
    let mut report = IngestReport::default();
    while !stop_flag.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                report.datagrams += 1;
                report.bytes += len as u64;
                let datagram = Datagram {
                    payload: buf[..len].to_vec(),
                    source: Some(from),
                };
                if intake.push(datagram).is_err() {
                    break;
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                error!("UDP receive failed: {}", e);
                return Err(MonitorError::Socket(e));
            }
        }
    }
    report.dropped = intake.dropped();
    info!(
        "ingest worker stopped: {} datagrams, {} bytes, {} dropped at intake",
        report.datagrams, report.bytes, report.dropped
    );
    Ok(report)
}
