//! Resumable batch processing over a work ledger: one invocation processes
//! the next unprocessed rows within its quota and checkpoints after each row.

pub mod ledger;
pub mod quota;
pub mod run;
pub mod source;
pub mod stability;
pub mod summary;
