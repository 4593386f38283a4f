//! Non-blocking halo exchange: per-vector contexts and ghost-node scatter/accumulate.

pub mod context;
pub mod halo;

pub use context::{ContextState, ExchangeContext, ExchangeRegistry, VectorId};
pub use halo::{GhostExchange, GhostMode, HaloPlan, PeerLink, begin_ghost_exchange, exchange_ghosts};
