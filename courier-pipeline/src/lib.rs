//! The four pipeline workers and the scheduler that drives them.
//!
//! Each worker is a specialisation of one skeleton
//! ([`worker::Worker`]): query a batch of rows in the start status,
//! claim each row with an optimistic transition into the processing
//! status, run the variant's action, and record the terminal outcome.
//! Rows in a batch are processed concurrently; losing a claim is an
//! expected, quiet event.

pub mod callback;
pub mod intake;
pub mod scheduler;
pub mod sender;
pub mod worker;

pub use callback::{CallbackClient, CallbackConfig, CallbackPipe};
pub use intake::IntakePipe;
pub use scheduler::Scheduler;
pub use sender::{MessageSender, SenderPipe};
pub use worker::{Disposition, Pipe, Transition, Worker};
