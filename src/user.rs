//! The user aggregate and its embedded relationship records.
//!
//! Friend relations and pending requests are stored redundantly on both
//! sides of a relationship. There is no joinable source of truth in a
//! document-per-aggregate store, so each aggregate carries its own copy and
//! the reconcile layer keeps the two copies in agreement.

use chrono::Utc;

use crate::card::Card;
use crate::error::EngineError;
use crate::trade::TradeOffer;
use crate::utils::{self, TimeStamp};

/// One half of the two-sided pending-request index. Never mutated in place;
/// resolved by deletion from both aggregates.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PendingFriendRequest {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub sender: String,
    #[n(2)]
    pub receiver: String,
    #[n(3)]
    pub sent_at: TimeStamp<Utc>,
}

impl PendingFriendRequest {
    pub fn new(sender: &str, receiver: &str) -> Self {
        Self {
            request_id: utils::new_request_id(),
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            sent_at: TimeStamp::new(),
        }
    }

    /// True when this request links the given unordered user pair. A prior
    /// request in the opposite direction counts as the same pair.
    pub fn links_pair(&self, a: &str, b: &str) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub cards: Vec<Card>,
    #[n(3)]
    pub friends: Vec<String>,
    #[n(4)]
    pub pending_friends: Vec<PendingFriendRequest>,
    #[n(5)]
    pub trading: Vec<TradeOffer>,
}

impl User {
    pub fn new(username: &str) -> Self {
        Self::with_id(&utils::new_user_id(), username)
    }

    /// Construct with a caller-chosen id. Ids are opaque to the engine, so
    /// tests and fixtures may use readable ones.
    pub fn with_id(id: &str, username: &str) -> Self {
        Self {
            id: id.to_owned(),
            username: username.to_owned(),
            cards: Vec::new(),
            friends: Vec::new(),
            pending_friends: Vec::new(),
            trading: Vec::new(),
        }
    }

    pub fn is_friend(&self, other: &str) -> bool {
        self.friends.iter().any(|f| f == other)
    }

    /// Adds to the friend set; refuses self-links and duplicates locally.
    pub fn add_friend(&mut self, other: &str) {
        if other != self.id && !self.is_friend(other) {
            self.friends.push(other.to_owned());
        }
    }

    /// The active pending request for the unordered pair, if any.
    pub fn pending_with(&self, a: &str, b: &str) -> Option<&PendingFriendRequest> {
        self.pending_friends.iter().find(|r| r.links_pair(a, b))
    }

    pub fn remove_pending_with(&mut self, a: &str, b: &str) -> Option<PendingFriendRequest> {
        let idx = self.pending_friends.iter().position(|r| r.links_pair(a, b))?;
        Some(self.pending_friends.remove(idx))
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    /// Removes and returns a card, leaving its fields untouched.
    pub fn take_card(&mut self, card_id: &str) -> Option<Card> {
        let idx = self.cards.iter().position(|c| c.id == card_id)?;
        Some(self.cards.remove(idx))
    }

    pub fn offer(&self, offer_id: &str) -> Option<&TradeOffer> {
        self.trading.iter().find(|o| o.offer_id == offer_id)
    }

    pub fn remove_offer(&mut self, offer_id: &str) -> Option<TradeOffer> {
        let idx = self.trading.iter().position(|o| o.offer_id == offer_id)?;
        Some(self.trading.remove(idx))
    }
}
