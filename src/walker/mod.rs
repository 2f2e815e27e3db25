//! Parallel directory walker
//!
//! Workers are spawned on demand while free slots remain; once the pool is
//! full, a worker keeps descending inline on its own thread. The coordinator
//! only watches the active count.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │    WalkCoordinator      │
//!                     │  - grants root slot     │
//!                     │  - polls active count   │
//!                     │  - finalizes output     │
//!                     └───────────┬─────────────┘
//!                                 │ spawn
//!                           ┌─────▼─────┐
//!                           │  Worker   │◄──── SlotPool (lock A)
//!                           │  (root)   │      slots + active count
//!                           └─────┬─────┘
//!              slot granted       │       no free slot
//!       ┌─────────────────────────┼─────────────────────────┐
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Worker   │             │  Worker   │             │  inline   │
//! │ own buffer│             │ own buffer│             │ recursion │
//! └─────┬─────┘             └─────┬─────┘             └───────────┘
//!       │ flush                   │ flush
//!       └────────────┬────────────┘
//!                    ▼
//!              OutputSink (lock B)
//! ```

pub mod coordinator;
pub mod pool;
pub mod worker;

pub use coordinator::{WalkCoordinator, WalkProgress, WalkResult};
pub use pool::{PoolStats, SlotId, SlotPool};
pub use worker::{WalkStats, WorkItem, WorkMode};
