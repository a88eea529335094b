//! Buffering between the stream receive path and the periodic persistence tick.

pub mod drain_queue;
