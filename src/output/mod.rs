//! Output path: record encoding, per-worker buffering, the shared sink
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐  ┌───────────┐         ┌───────────┐
//! │ Worker 1  │  │ Worker 2  │   ...   │ Worker N  │
//! │ encode ─► │  │ encode ─► │         │ encode ─► │
//! │  buffer   │  │  buffer   │         │  buffer   │   no lock
//! └─────┬─────┘  └─────┬─────┘         └─────┬─────┘
//!       │ flush        │ flush               │ flush
//!       └──────────────┼─────────────────────┘
//!                      ▼
//!          ┌───────────────────────┐
//!          │      OutputSink       │   output lock
//!          │  zstd stream (opt.)   │
//!          │  file                 │
//!          └───────────────────────┘
//! ```

pub mod buffer;
pub mod compress;
pub mod reader;
pub mod record;
pub mod sink;

pub use buffer::RecordBuffer;
pub use compress::{Compression, CompressionStream, ZstdStream};
pub use reader::{parse_records, read_records, Record};
pub use record::{encode_record, extension, CSV_HEADER};
pub use sink::{OutputSink, SinkStats, SinkSummary};
