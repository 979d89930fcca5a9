//! Serial log link
//!
//! Opens the device's log stream and runs a `TelemetryReader` over it. The
//! reader publishes into the shared telemetry mailbox that the sensor checks
//! sample.

use std::io::BufRead;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::core::{LatestValueMailbox, TelemetryReader};
use crate::error::JigError;
use crate::stages::lock;
use crate::types::{StageError, TelemetrySample};

pub const SERIAL_ALREADY_ENABLED: &str = "SERIAL ALREADY ENABLED";
pub const SERIAL_DISABLED: &str = "SERIAL DISABLED";

type Opener = dyn Fn() -> Result<Box<dyn BufRead + Send>, JigError> + Send + Sync;

pub struct SerialLink {
    open: Box<Opener>,
    mailbox: Arc<LatestValueMailbox<TelemetrySample>>,
    reader: Mutex<Option<TelemetryReader>>,
}

impl SerialLink {
    pub fn new<F>(open: F, mailbox: Arc<LatestValueMailbox<TelemetrySample>>) -> Self
    where
        F: Fn() -> Result<Box<dyn BufRead + Send>, JigError> + Send + Sync + 'static,
    {
        Self {
            open: Box::new(open),
            mailbox,
            reader: Mutex::new(None),
        }
    }

    pub fn mailbox(&self) -> Arc<LatestValueMailbox<TelemetrySample>> {
        Arc::clone(&self.mailbox)
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.reader).is_some()
    }

    /// Open the stream and start the reader; stale samples are dropped first
    pub fn start(&self) -> Result<(), StageError> {
        let mut reader = lock(&self.reader);
        if reader.is_some() {
            warn!("Serial thread has already been enabled");
            return Err(StageError::failed(SERIAL_ALREADY_ENABLED));
        }
        self.mailbox.clear();
        let source = (self.open)()?;
        *reader = Some(TelemetryReader::start(source, Arc::clone(&self.mailbox))?);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), StageError> {
        match lock(&self.reader).take() {
            Some(mut reader) => {
                reader.stop();
                Ok(())
            }
            None => {
                warn!("Serial thread has not been enabled");
                Err(StageError::failed(SERIAL_DISABLED))
            }
        }
    }

    /// Stop the reader if one is running; no-op otherwise
    pub fn shutdown(&self) {
        if let Some(mut reader) = lock(&self.reader).take() {
            reader.stop();
            info!("Serial link closed");
        }
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn link() -> SerialLink {
        SerialLink::new(
            || Ok(Box::new(Cursor::new(b"{\"generator_freq\": 5}\n".to_vec())) as Box<dyn BufRead + Send>),
            Arc::new(LatestValueMailbox::new()),
        )
    }

    #[test]
    fn test_start_twice_fails() {
        let link = link();
        link.start().unwrap();
        assert_eq!(link.start(), Err(StageError::failed(SERIAL_ALREADY_ENABLED)));
        link.stop().unwrap();
        assert!(!link.is_enabled());
    }

    #[test]
    fn test_stop_without_start_fails() {
        assert_eq!(link().stop(), Err(StageError::failed(SERIAL_DISABLED)));
    }
}
