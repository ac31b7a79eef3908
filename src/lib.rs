//! Friendship and trade consistency engine for a card-collecting product.
//!
//! Users, their cards, friend relations and open trade offers live in one
//! document per user. The two service layers (`friendship`, `trade`) keep
//! the redundant two-sided records consistent through the `reconcile`
//! two-write protocol, since the store offers no cross-document
//! transactions.

pub mod card;
pub mod error;
pub mod friendship;
pub mod reconcile;
pub mod store;
pub mod trade;
pub mod user;
pub mod utils;
