//! CLI command handlers
//!
//! Each subcommand opens the cache from the persisted snapshot without
//! background tasks, does its work, and flushes on the way out.

pub mod helpers;
pub mod inspect;
pub mod lookup;
pub mod remember;
pub mod sync;
