//! Entity Models
//!
//! Hand-written entity definitions and their key/index query types.

mod user;

pub use user::{AgeOfUserRng, IdOfUserRng, MailboxPasswordOfUserUk, SexOfUserIdx, User};
