//! Property-based tests for the engine invariants.
//!
//! These verify that friendship resolution always ends symmetric and that an
//! accepted trade conserves cards (exactly two change hands, none are
//! duplicated or lost) across randomly generated collections and directions.
//! Every case runs against its own throwaway sled database.

use proptest::prelude::*;
use std::sync::Arc;
use tempfile::tempdir;

use card_exchange::{
    card::{Card, Rarity},
    error::EngineError,
    friendship::FriendshipService,
    store::UserStore,
    trade::TradeService,
    user::User,
};

fn open_store(dir: &tempfile::TempDir) -> Arc<UserStore> {
    let db = sled::open(dir.path().join("prop.db")).expect("failed to open test db");
    Arc::new(UserStore::new(Arc::new(db)))
}

fn card_with_id(id: &str, owner: &str, name: &str) -> Card {
    Card {
        id: id.to_owned(),
        creator: owner.to_owned(),
        owner: owner.to_owned(),
        trade_status: true,
        name: name.to_owned(),
        fact: String::new(),
        location: String::new(),
        rarity: Rarity::Common,
        links: Vec::new(),
    }
}

fn register_with_cards(store: &UserStore, id: &str, username: &str, count: usize) -> Vec<String> {
    let mut user = User::with_id(id, username);
    let mut card_ids = Vec::new();
    for i in 0..count {
        let card_id = format!("{id}-card-{i}");
        user.cards.push(card_with_id(&card_id, id, "Specimen"));
        card_ids.push(card_id);
    }
    store.insert(&user).expect("failed to register user");
    card_ids
}

/// Strategy for plausible usernames.
fn username_strategy() -> impl Strategy<Value = String> {
    "[a-z]{4,10}"
}

proptest! {
    // each case pays for a fresh sled database, keep the count moderate
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: whichever direction the request travels, a completed
    /// send+accept leaves both friend sets agreeing and no pending record,
    /// and a second resolution attempt reports the record gone.
    #[test]
    fn prop_send_accept_is_symmetric(
        name_a in username_strategy(),
        name_b in username_strategy(),
        a_sends in any::<bool>(),
    ) {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        register_with_cards(&store, "user_a", &format!("{name_a}-a"), 0);
        register_with_cards(&store, "user_b", &format!("{name_b}-b"), 0);

        let service = FriendshipService::new(store.clone());
        let (sender, receiver) = if a_sends {
            ("user_a", "user_b")
        } else {
            ("user_b", "user_a")
        };

        service.send_request(sender, receiver).unwrap();
        service.accept(receiver, sender).unwrap();

        let a = store.get("user_a").unwrap().value;
        let b = store.get("user_b").unwrap().value;
        prop_assert!(a.is_friend("user_b"));
        prop_assert!(b.is_friend("user_a"));
        prop_assert!(a.pending_friends.is_empty());
        prop_assert!(b.pending_friends.is_empty());

        let err = service.accept(receiver, sender).unwrap_err();
        let is_not_found = matches!(err, EngineError::RequestNotFound { .. });
        prop_assert!(is_not_found);
    }

    /// Property: an accepted trade swaps exactly the two referenced cards.
    /// The combined collection keeps the same size and the same card ids,
    /// each id held by exactly one user.
    #[test]
    fn prop_accept_trade_conserves_cards(
        count_a in 1usize..4,
        count_b in 1usize..4,
        pick_a in 0usize..4,
        pick_b in 0usize..4,
    ) {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let cards_a = register_with_cards(&store, "user_a", "ana", count_a);
        let cards_b = register_with_cards(&store, "user_b", "ben", count_b);
        let offered = &cards_a[pick_a % count_a];
        let requested = &cards_b[pick_b % count_b];

        let service = TradeService::new(store.clone());
        let offer = service
            .create_offer("user_a", offered, "user_b", requested)
            .unwrap();
        service.accept_trade("user_b", &offer).unwrap();

        let a = store.get("user_a").unwrap().value;
        let b = store.get("user_b").unwrap().value;

        // the two picked cards switched aggregates with agreeing owner fields
        prop_assert_eq!(b.card(offered).unwrap().owner.as_str(), "user_b");
        prop_assert_eq!(a.card(requested).unwrap().owner.as_str(), "user_a");
        prop_assert!(a.card(offered).is_none());
        prop_assert!(b.card(requested).is_none());

        // conservation: same total, every id exactly once
        prop_assert_eq!(a.cards.len() + b.cards.len(), count_a + count_b);
        let mut all: Vec<&str> = a
            .cards
            .iter()
            .chain(b.cards.iter())
            .map(|c| c.id.as_str())
            .collect();
        all.sort_unstable();
        all.dedup();
        prop_assert_eq!(all.len(), count_a + count_b);

        // every surviving card sits in the aggregate its owner field names
        for card in a.cards.iter() {
            prop_assert_eq!(card.owner.as_str(), "user_a");
        }
        for card in b.cards.iter() {
            prop_assert_eq!(card.owner.as_str(), "user_b");
        }
    }

    /// Property: declining never moves a card, no matter which party
    /// resolves the offer or how often they repeat it.
    #[test]
    fn prop_decline_trade_never_moves_cards(
        count_a in 1usize..4,
        count_b in 1usize..4,
        counterpart_declines in any::<bool>(),
        repeats in 1usize..3,
    ) {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let cards_a = register_with_cards(&store, "user_a", "ana", count_a);
        let cards_b = register_with_cards(&store, "user_b", "ben", count_b);

        let service = TradeService::new(store.clone());
        let offer = service
            .create_offer("user_a", &cards_a[0], "user_b", &cards_b[0])
            .unwrap();

        let resolver = if counterpart_declines { "user_b" } else { "user_a" };
        for _ in 0..repeats {
            service.decline_trade(resolver, &offer).unwrap();
        }

        let a = store.get("user_a").unwrap().value;
        let b = store.get("user_b").unwrap().value;
        prop_assert!(a.trading.is_empty());
        prop_assert_eq!(a.cards.len(), count_a);
        prop_assert_eq!(b.cards.len(), count_b);
        for card_id in cards_a.iter() {
            prop_assert_eq!(a.card(card_id).unwrap().owner.as_str(), "user_a");
        }
        for card_id in cards_b.iter() {
            prop_assert_eq!(b.card(card_id).unwrap().owner.as_str(), "user_b");
        }
    }
}
