//! Logging trait for ByteForge client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows embedders to
//! capture every streamed turn passing through the [`ByteForge`] client.
//!
//! [`ByteForge`]: crate::ByteForge

use crate::types::{DonePayload, StreamFrame, StreamRequest};

/// A trait for logging ByteForge client operations.
///
/// # Example
///
/// ```rust,ignore
/// use byteforge::{ClientLogger, DonePayload, StreamFrame, StreamRequest};
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, request: &StreamRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_frame(&self, frame: &StreamFrame) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Frame: {}", serde_json::to_string(frame).unwrap()).unwrap();
///     }
///
///     fn log_turn_complete(&self, done: &DonePayload) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Done: {}", serde_json::to_string(done).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log the body of a turn-opening request before it is sent.
    fn log_request(&self, request: &StreamRequest);

    /// Log each frame parsed from a streamed response, terminal frames included.
    fn log_frame(&self, frame: &StreamFrame);

    /// Log the payload of a turn that ended with a `done` frame.
    ///
    /// Called once per successful turn, after the `done` frame itself has
    /// been passed to [`ClientLogger::log_frame`].
    fn log_turn_complete(&self, done: &DonePayload);
}
