//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`LruReplacer`] - Least-recently-used eviction, the buffer pool's
//!   active policy
//! - [`FifoReplacer`] - Simple FIFO, kept for comparison/testing

mod fifo;
mod lru;

pub use fifo::FifoReplacer;
pub use lru::LruReplacer;
