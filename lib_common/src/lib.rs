//! Shared library of the price bot: HTTP retrieval, price feeds and the AI relay.
//! Each top-level module sits behind a cargo feature of the same name.

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "markets")]
pub mod markets;

#[cfg(feature = "assistant")]
pub mod assistant;
