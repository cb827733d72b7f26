// src/session/mod.rs

//! Interactive login sessions.
//!
//! Login is the one external process that does not run to completion in a
//! single call: it prints a URL, then waits for a token typed back by the
//! user. [`broker::SessionBroker`] parks such processes between the HTTP
//! request that showed the URL and the observer message that carries the
//! token. [`process`] holds the process abstraction and its real
//! implementation.

pub mod broker;
pub mod process;

pub use broker::{LoginTicket, SessionBroker};
pub use process::{InteractiveSession, ProcessSession, ProcessSpawner, SessionSpawner};
