//! Thin top-level crate gluing the subsystem crates together: parses a
//! cluster config into the lock-guarded tables of `ridge_ctld::Controller`
//! and exposes the cold-start/reconfigure entry points a real controller
//! `main` would call. No daemon event loop or RPC dispatcher lives here --
//! those are out of scope (spec.md §1), this is the object such a loop
//! would hold.

mod bootstrap;

pub use bootstrap::{Ridge, RidgeConfig};

// Re-exported so a caller only needs this one crate on its own
// `[dependencies]` line to reach every subsystem.
pub use ridge_base as base;
pub use ridge_bcast as bcast;
pub use ridge_config as config;
pub use ridge_ctld as ctld;
pub use ridge_net as net;
pub use ridge_step as step;
