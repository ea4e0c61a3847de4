//! Timeline assembly: the ordered event buffer and its durable writer.

pub mod buffer;
pub mod writer;

pub use buffer::{BufferMetricsSnapshot, TimelineBuffer};
pub use writer::{
    render, spawn_flush_thread, TimelineFormat, TimelineWriter, CSV_HEADER,
};
