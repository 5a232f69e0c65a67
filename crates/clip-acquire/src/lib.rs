//! Clip acquisition for broadcaster accounts
//!
//! Composes a per-account cooldown gate, the credential lifecycle and the
//! Helix upstream into the "request a clip" workflow:
//!
//! 1. `CooldownGate::try_acquire()` rejects requests inside the window
//! 2. `CredentialManager::ensure()` hands out a non-expired credential
//! 3. The clip is created, retrying once after a refresh on 401
//! 4. Clip lookup is polled in the foreground until a URL appears
//! 5. The outcome is appended to the `ClipSink`
//! 6. On poll timeout a detached extended poll keeps looking and appends a
//!    later `ok` record if the clip materializes

pub mod cooldown;
pub mod credentials;
pub mod error;
pub mod extended;
pub mod orchestrator;
pub mod outcome;
pub mod sink;

#[cfg(test)]
mod test_support;

pub use cooldown::CooldownGate;
pub use credentials::CredentialManager;
pub use error::{Error, Result};
pub use extended::spawn_extended_poll;
pub use orchestrator::{AcquireSettings, Orchestrator, PollPolicy};
pub use outcome::{Clip, ClipOutcome, ClipRequest, ClipStatus};
pub use sink::ClipSink;
