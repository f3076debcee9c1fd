//! Live output from a running transform
//!
//! A [`ProcessRunner`](crate::runtime::ProcessRunner) hands every chunk read
//! from the child's stdout or stderr to an [`OutputCallback`] before
//! buffering it. Callbacks only observe progress; the buffered output is what
//! ends up in the session.

use std::fmt;

/// Which pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Callback for output chunks as they arrive
///
/// This trait is object-safe and can be used as `&dyn OutputCallback`.
pub trait OutputCallback: Send + Sync {
    fn on_output(&self, stream: OutputStream, chunk: &[u8]);
}

/// Callback that ignores everything
#[derive(Debug, Clone, Default)]
pub struct NoopCallback;

impl OutputCallback for NoopCallback {
    fn on_output(&self, _stream: OutputStream, _chunk: &[u8]) {}
}

impl<F> OutputCallback for F
where
    F: Fn(OutputStream, &[u8]) + Send + Sync,
{
    fn on_output(&self, stream: OutputStream, chunk: &[u8]) {
        self(stream, chunk)
    }
}
