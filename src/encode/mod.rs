//! Encoding sinks.
//!
//! A sink is one open encoding pipe that absorbs uploaded frames and produces a single output
//! file. Sinks are opened through a [`SinkFactory`] so the session never depends on a concrete
//! encoder.

/// `ffmpeg`-based sink (GIF/MP4 output via the system `ffmpeg`).
pub mod ffmpeg;
/// Recording in-memory sink for tests and dry runs.
pub mod memory;
/// Sink and factory traits.
pub mod sink;
