//! # Tally Engine
//!
//! The deterministic counting core of Tally, a clicker with a remotely
//! synchronized score.
//!
//! This crate owns the optimistic click-accumulation and flush protocol:
//! batching rapid local clicks, handing them to a remote increment one
//! flush at a time, and reconciling the live-update echoes the remote
//! store sends back, without ever double-counting or dropping a click.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of timers, network, or storage
//! - **Deterministic**: same inputs always produce the same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Three buckets
//!
//! [`ClickAccumulator`] splits the locally known count into:
//! - `remote` - the last server-confirmed value
//! - `pending` - clicks recorded locally, not yet part of a flush
//! - `in_flight` - clicks inside a flush awaiting server confirmation
//!
//! The displayed count is always the sum of the three. A delta moves
//! pending -> in-flight when a flush begins, in-flight -> remote when the
//! confirmed echo arrives, and in-flight -> pending when a flush fails.
//!
//! ### Local echoes
//!
//! Stores with latency compensation deliver a local echo of a write before
//! the server confirms it. Echoes carry [`SnapshotOrigin::LocalEcho`] and
//! are ignored; only [`SnapshotOrigin::Confirmed`] notifications settle
//! in-flight clicks. This is the core correctness mechanism.
//!
//! ### Single-flight
//!
//! At most one flush is outstanding per accumulator. A second
//! [`ClickAccumulator::begin_flush`] while one is outstanding returns
//! `None` - dropped, not queued.
//!
//! ## Quick Start
//!
//! ```rust
//! use tally_engine::{ClickAccumulator, SnapshotOrigin};
//!
//! let mut acc = ClickAccumulator::with_remote(10);
//!
//! // Three rapid clicks, then one flush for all of them.
//! acc.record_click();
//! acc.record_click();
//! acc.record_click();
//! let amount = acc.begin_flush(None).unwrap();
//! assert_eq!(amount, 3);
//! assert_eq!(acc.displayed(), 13);
//!
//! // The store echoes the write locally first - ignored.
//! acc.complete_flush();
//! assert!(!acc.observe(13, SnapshotOrigin::LocalEcho));
//!
//! // The confirmed value settles the in-flight clicks.
//! assert!(acc.observe(13, SnapshotOrigin::Confirmed));
//! assert_eq!(acc.displayed(), 13);
//! assert_eq!(acc.in_flight(), 0);
//! ```

pub mod accumulator;
pub mod error;
pub mod initials;

// Re-export main types at crate root
pub use accumulator::{ClickAccumulator, SnapshotOrigin};
pub use error::Error;
pub use initials::{normalize, Initials, MAX_INITIALS_LEN};

/// Type aliases for clarity
pub type Clicks = u64;
pub type Delta = u64;
