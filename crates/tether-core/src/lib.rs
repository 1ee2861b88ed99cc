//! # Tether Core
//!
//! The engine shared by every Tether crate: it turns asynchronous,
//! multi-peer chat transport into request/response calls.
//!
//! ## Components
//!
//! - **Correlation table** ([`CorrelationTable`]): one waiter or a bounded
//!   overflow buffer per correlation key.
//! - **Dispatcher** ([`Dispatcher`]): concurrent fan-out of a frame to every
//!   live [`Peer`], either aggregating failures or fire-and-forget.
//! - **Seams** ([`ConnectionHandler`], [`SettingsProvider`],
//!   [`StatsProvider`], [`IdentityResolver`]): what transports and
//!   protocol adapters plug into.
//!
//! ## Data Flow
//!
//! ```text
//! request ──▶ Dispatcher ──▶ peers ··· reply frame ──▶ ConnectionHandler
//!    │                                                      │
//!    └──────── Waiter::recv ◀── CorrelationTable::dispatch ◀┘
//! ```

pub mod broadcast;
pub mod correlation;
pub mod error;
pub mod peer;
pub mod provider;

pub use broadcast::{DispatchMode, Dispatcher};
pub use correlation::{
    CONTENT_BUDGET, ContentLength, CorrelationTable, Delivery, HISTORY_SEPARATOR,
    MAX_PENDING_PER_KEY, Waiter,
};
pub use error::{
    CorrelationError, CorrelationResult, DecodeError, DecodeResult, DispatchError, TransportError,
    TransportResult,
};
pub use peer::{BoxedConnectionHandler, BoxedPeer, ConnectionHandler, Peer};
pub use provider::{Counters, IdentityResolver, PassthroughIdentity, SettingsProvider, StatsProvider};
