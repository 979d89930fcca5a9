//! Background telemetry reader
//!
//! Reads the device's line-oriented log stream on its own thread and
//! publishes every decoded sample into a `LatestValueMailbox`. Malformed
//! lines are dropped with a warning. The thread ends on `stop()`, at end of
//! stream, or on a hard read error.

use std::io::{BufRead, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::core::LatestValueMailbox;
use crate::error::JigError;
use crate::types::TelemetrySample;

/// How long `stop()` waits for a read in flight before detaching the thread
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Handle to the running reader thread
#[derive(Debug)]
pub struct TelemetryReader {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl TelemetryReader {
    /// Spawn the reader over `source`
    pub fn start<R>(source: R, mailbox: Arc<LatestValueMailbox<TelemetrySample>>) -> Result<Self, JigError>
    where
        R: BufRead + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let shutdown_clone = Arc::clone(&shutdown);
        let running_clone = Arc::clone(&running);

        let thread_handle = thread::Builder::new()
            .name("telemetry-reader".to_string())
            .spawn(move || {
                Self::run_loop(source, mailbox, shutdown_clone);
                running_clone.store(false, Ordering::Release);
            })
            .map_err(|e| JigError::Spawn("telemetry reader", e))?;

        info!("Telemetry reader started");
        Ok(Self {
            thread_handle: Some(thread_handle),
            shutdown,
            running,
        })
    }

    fn run_loop<R: BufRead>(
        mut source: R,
        mailbox: Arc<LatestValueMailbox<TelemetrySample>>,
        shutdown: Arc<AtomicBool>,
    ) {
        // Bytes of a partial line survive a read timeout
        let mut buf = Vec::new();
        while !shutdown.load(Ordering::Acquire) {
            match source.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    info!("Telemetry stream closed");
                    break;
                }
                Ok(_) => {
                    match std::str::from_utf8(&buf) {
                        Ok(line) => match TelemetrySample::parse_line(line) {
                            Ok(sample) => {
                                debug!(fields = sample.fields.len(), "Telemetry sample");
                                mailbox.publish(sample);
                            }
                            Err(e) => warn!(error = %e, "Some problems with logs"),
                        },
                        Err(e) => warn!(error = %e, "Dropping non UTF-8 log line"),
                    }
                    buf.clear();
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Exception while reading serial data");
                    break;
                }
            }
        }
    }

    /// True until the reader thread has exited
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the thread to stop and wait for it. A thread still blocked in a
    /// read after `STOP_GRACE` is detached; it exits at its next line.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_GRACE;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if !handle.is_finished() {
            warn!("Telemetry reader blocked in read, detaching");
            return;
        }
        if handle.join().is_err() {
            error!("Telemetry reader thread panicked");
        }
        info!("Telemetry reader stopped");
    }
}

impl Drop for TelemetryReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wait_until_stopped(reader: &TelemetryReader) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while reader.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_publishes_last_valid_line() {
        let mailbox = Arc::new(LatestValueMailbox::new());
        let stream = "{\"generator_freq\": 10}\n{\"generator_freq\": 20}\n";
        let mut reader = TelemetryReader::start(Cursor::new(stream), Arc::clone(&mailbox)).unwrap();
        wait_until_stopped(&reader);
        reader.stop();
        assert_eq!(mailbox.snapshot().unwrap().get_f64("generator_freq"), Some(20.0));
        assert_eq!(mailbox.generation(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mailbox = Arc::new(LatestValueMailbox::new());
        let stream = "{\"photoresistor_adc\": 700}\nboot banner\n{\"photoresistor_adc\": 7\n\n";
        let mut reader = TelemetryReader::start(Cursor::new(stream), Arc::clone(&mailbox)).unwrap();
        wait_until_stopped(&reader);
        reader.stop();
        assert_eq!(mailbox.snapshot().unwrap().get_f64("photoresistor_adc"), Some(700.0));
        assert_eq!(mailbox.generation(), 1);
    }

    #[test]
    fn test_invalid_utf8_line_does_not_stop_reader() {
        let mailbox = Arc::new(LatestValueMailbox::new());
        let mut stream = b"{\"generator_freq\": 10}\n".to_vec();
        stream.extend_from_slice(b"\xff\xfe\n");
        stream.extend_from_slice(b"{\"generator_freq\": 20}\n");
        let mut reader = TelemetryReader::start(Cursor::new(stream), Arc::clone(&mailbox)).unwrap();
        wait_until_stopped(&reader);
        reader.stop();
        assert_eq!(mailbox.snapshot().unwrap().get_f64("generator_freq"), Some(20.0));
        assert_eq!(mailbox.generation(), 2);
    }

    #[test]
    fn test_end_of_stream_ends_thread() {
        let mailbox = Arc::new(LatestValueMailbox::new());
        let reader = TelemetryReader::start(Cursor::new(""), mailbox).unwrap();
        wait_until_stopped(&reader);
        assert!(!reader.is_running());
    }
}
