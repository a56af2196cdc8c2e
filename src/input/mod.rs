//! Input handling module
//!
//! The core keeps only the seat bookkeeping the transaction engine touches:
//! focused output, focused view, and cursor hover invalidation. Device
//! handling is a separate subsystem.

pub mod seat;

pub use seat::{Cursor, Seat, SeatManager};
