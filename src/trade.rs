//! Trade offers and the service layer API for trade workflow operations.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::card::Card;
use crate::error::EngineError;
use crate::reconcile::{self, PreparedWrite, RetryPolicy};
use crate::store::UserStore;
use crate::user::User;
use crate::utils::TimeStamp;

/// An open offer: two card snapshots captured at creation time. Stored in
/// the offering user's `trading` vector; resolved by deletion, so "open" is
/// simply "present".
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TradeOffer {
    #[n(0)]
    pub offer_id: String,
    #[n(1)]
    pub offered_card: Card,
    #[n(2)]
    pub requested_card: Card,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

// The offer id *is* the hash of this struct encoded into cbor.
#[derive(minicbor::Encode)]
struct OfferFingerprint {
    #[n(0)]
    offered_card: Card,
    #[n(1)]
    requested_card: Card,
    #[n(2)]
    created_at: TimeStamp<Utc>,
}

impl TradeOffer {
    /// Snapshots the two cards and derives the content-addressed offer id.
    pub fn new(offered_card: Card, requested_card: Card) -> Result<Self, EngineError> {
        let created_at = TimeStamp::new();
        let fingerprint = OfferFingerprint {
            offered_card: offered_card.clone(),
            requested_card: requested_card.clone(),
            created_at: created_at.clone(),
        };
        let cbor = minicbor::to_vec(&fingerprint).map_err(|e| EngineError::Codec(e.to_string()))?;
        let offer_id = sha256::digest(&cbor);

        Ok(Self {
            offer_id,
            offered_card,
            requested_card,
            created_at,
        })
    }

    /// The user who opened the offer (owner of the offered snapshot).
    pub fn offering_user(&self) -> &str {
        &self.offered_card.owner
    }

    /// The user the offer is addressed to (owner of the requested snapshot).
    pub fn counterpart_user(&self) -> &str {
        &self.requested_card.owner
    }
}

pub struct TradeService {
    store: Arc<UserStore>,
    policy: RetryPolicy,
}

impl TradeService {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<UserStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Looks a card up inside the aggregate that is claimed to own it.
    fn owned_card<'a>(user: &'a User, card_id: &str) -> Result<&'a Card, EngineError> {
        let card = user
            .card(card_id)
            .ok_or_else(|| EngineError::CardNotFound(card_id.to_owned()))?;
        if card.owner != user.id {
            return Err(EngineError::CardNotOwned {
                card: card_id.to_owned(),
                expected_owner: user.id.clone(),
            });
        }
        Ok(card)
    }

    /// Opens a trade offer: `offering_user_id` puts `offered_card_id` up
    /// against `requested_card_id` held by `counterpart_user_id`.
    ///
    /// Both cards must currently be tradeable. The cards keep displaying as
    /// tradeable to other potential partners while the offer is open; the
    /// same card may appear in several open offers, and the ownership check
    /// at accept time decides which one wins.
    pub fn create_offer(
        &self,
        offering_user_id: &str,
        offered_card_id: &str,
        counterpart_user_id: &str,
        requested_card_id: &str,
    ) -> Result<TradeOffer, EngineError> {
        if offering_user_id == counterpart_user_id {
            return Err(EngineError::InvalidTarget(
                "cannot open a trade with yourself".into(),
            ));
        }

        reconcile::with_retry(&self.policy, || {
            let offerer = self.store.require(offering_user_id)?;
            let counterpart = self.store.require(counterpart_user_id)?;

            let offered = Self::owned_card(&offerer.value, offered_card_id)?;
            let requested = Self::owned_card(&counterpart.value, requested_card_id)?;
            if !offered.is_tradeable() {
                return Err(EngineError::CardNotTradeable(offered_card_id.to_owned()));
            }
            if !requested.is_tradeable() {
                return Err(EngineError::CardNotTradeable(requested_card_id.to_owned()));
            }

            let offer = TradeOffer::new(offered.clone(), requested.clone())?;

            // the offer record lives on the offering side only
            let mut next = offerer.value.clone();
            next.trading.push(offer.clone());
            self.store.update(&next, offerer.version)?;

            debug!(offer_id = %offer.offer_id, %offering_user_id, %counterpart_user_id, "trade offer opened");
            Ok(offer)
        })
    }

    /// Accepts an open offer, swapping ownership of exactly the two
    /// referenced cards and removing the offer, as one logical unit across
    /// both aggregates.
    ///
    /// Only the counterpart may accept. An offer that is already resolved
    /// reports `OfferNotFound`; a card that changed hands since the snapshot
    /// was taken reports `OwnershipChanged` and nothing moves.
    pub fn accept_trade(
        &self,
        resolving_user_id: &str,
        offer: &TradeOffer,
    ) -> Result<(User, User), EngineError> {
        let offering_id = offer.offering_user().to_owned();
        let counterpart_id = offer.counterpart_user().to_owned();
        if resolving_user_id != counterpart_id {
            // the offering side should not be the one accepting
            return Err(EngineError::InvalidTarget(
                "only the requested card's owner may accept this trade".into(),
            ));
        }

        reconcile::with_retry(&self.policy, || {
            let offerer = self.store.require(&offering_id)?;
            let counterpart = self.store.require(&counterpart_id)?;

            if offerer.value.offer(&offer.offer_id).is_none() {
                return Err(EngineError::OfferNotFound(offer.offer_id.clone()));
            }
            Self::check_unmoved(&offerer.value, &offer.offered_card)?;
            Self::check_unmoved(&counterpart.value, &offer.requested_card)?;

            let mut next_offerer = offerer.value.clone();
            let mut next_counterpart = counterpart.value.clone();
            next_offerer.remove_offer(&offer.offer_id);

            let mut offered = next_offerer
                .take_card(&offer.offered_card.id)
                .ok_or_else(|| EngineError::OwnershipChanged {
                    card: offer.offered_card.id.clone(),
                })?;
            offered.owner = counterpart_id.clone();
            next_counterpart.cards.push(offered);

            let mut requested = next_counterpart
                .take_card(&offer.requested_card.id)
                .ok_or_else(|| EngineError::OwnershipChanged {
                    card: offer.requested_card.id.clone(),
                })?;
            requested.owner = offering_id.clone();
            next_offerer.cards.push(requested);

            let updated = reconcile::commit_pair(
                &self.store,
                PreparedWrite::new(next_offerer, offerer.version, offerer.value.clone()),
                PreparedWrite::new(next_counterpart, counterpart.version, counterpart.value.clone()),
            )?;

            debug!(offer_id = %offer.offer_id, "trade accepted, ownership swapped");
            Ok(updated)
        })
    }

    /// Removes an open offer without any ownership change. Either party may
    /// decline (the offerer withdraws, the counterpart rejects). Declining
    /// an offer that is already resolved is a no-op success.
    pub fn decline_trade(
        &self,
        resolving_user_id: &str,
        offer: &TradeOffer,
    ) -> Result<(), EngineError> {
        let offering_id = offer.offering_user().to_owned();
        let counterpart_id = offer.counterpart_user().to_owned();
        if resolving_user_id != offering_id && resolving_user_id != counterpart_id {
            return Err(EngineError::InvalidTarget(
                "only a party to the trade may decline it".into(),
            ));
        }

        reconcile::with_retry(&self.policy, || {
            let offerer = self.store.require(&offering_id)?;
            if offerer.value.offer(&offer.offer_id).is_none() {
                return Ok(());
            }

            let mut next = offerer.value.clone();
            next.remove_offer(&offer.offer_id);
            self.store.update(&next, offerer.version)?;

            debug!(offer_id = %offer.offer_id, %resolving_user_id, "trade offer declined");
            Ok(())
        })
    }

    /// The card referenced by the snapshot must still sit in `holder`'s
    /// aggregate with an agreeing owner field, otherwise an intervening
    /// trade disposed of it. Resolving anyway would duplicate the card.
    fn check_unmoved(holder: &User, snapshot: &Card) -> Result<(), EngineError> {
        match holder.card(&snapshot.id) {
            Some(current) if current.owner == snapshot.owner => Ok(()),
            _ => Err(EngineError::OwnershipChanged {
                card: snapshot.id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardDraft, Rarity};

    fn card(owner: &str, name: &str) -> Card {
        CardDraft::new()
            .set_name(name)
            .set_rarity(Rarity::Uncommon)
            .mint(owner)
            .unwrap()
    }

    #[test]
    fn offer_id_is_derived_from_content() {
        let offered = card("user_a", "Pothos");
        let requested = card("user_b", "Snake Plant");

        let offer = TradeOffer::new(offered.clone(), requested.clone()).unwrap();
        assert!(!offer.offer_id.is_empty());
        assert_eq!(offer.offering_user(), "user_a");
        assert_eq!(offer.counterpart_user(), "user_b");
    }

    #[test]
    fn distinct_offers_get_distinct_ids() {
        let offered = card("user_a", "Pothos");
        let requested = card("user_b", "Snake Plant");

        let one = TradeOffer::new(offered.clone(), requested.clone()).unwrap();
        let other = TradeOffer::new(requested, offered).unwrap();
        assert_ne!(one.offer_id, other.offer_id);
    }

    #[test]
    fn offer_cbor_roundtrip() {
        let offer = TradeOffer::new(card("user_a", "Pothos"), card("user_b", "Fern")).unwrap();

        let encoding = minicbor::to_vec(&offer).unwrap();
        let decoded: TradeOffer = minicbor::decode(&encoding).unwrap();

        assert_eq!(offer, decoded);
    }
}
