//! Listener plumbing for the bootstrap.
//!
//! `server` owns the engine handoff: eager dual binds, per-interface TLS,
//! and the serve loop. `redirect` is the optional plain-HTTP listener that
//! forwards browsers to the HTTPS endpoint.

mod redirect;
mod server;

pub use server::serve;
