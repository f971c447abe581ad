//! Records of training metrics.
//!
//! Agents return a [`Record`] from each optimization step, for example
//! the losses of the critic and the actor. A [`Recorder`] consumes records,
//! for example [`BufferedRecorder`] keeps them in memory.
//!
//! ```rust
//! use forestfire_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss_critic", 0.5);
//! record.insert("loss_actor", RecordValue::Scalar(-1.2));
//! assert_eq!(record.get_scalar("loss_critic").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use recorder::Recorder;
