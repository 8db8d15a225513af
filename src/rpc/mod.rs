//! RPC client pool (C1, §4.1): failover across configured endpoints with
//! promote-on-success routing, plus a separate non-routing health prober.

pub mod health;
mod pool;

pub use pool::{RpcPool, RpcPoolError, SharedRpcPool};
