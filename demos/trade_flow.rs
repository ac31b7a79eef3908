//! Walkthrough of the full friendship and trade flow against a local sled db.
//!
//! Run with `cargo run --example trade_flow`.

use anyhow::Context;
use std::sync::Arc;

use card_exchange::card::{CardDraft, Rarity};
use card_exchange::friendship::FriendshipService;
use card_exchange::store::UserStore;
use card_exchange::trade::TradeService;
use card_exchange::user::User;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let db = sled::open("trade_flow_db")?;
    if !db.is_empty() {
        db.clear()?;
    }
    let store = Arc::new(UserStore::new(Arc::new(db)));

    // two collectors, each minting one card
    let mut ivy = User::new("ivy");
    let monstera = CardDraft::new()
        .set_name("Monstera Deliciosa")
        .set_fact("splits its leaves to let light through to lower growth")
        .set_location("Kew Gardens")
        .set_rarity(Rarity::Rare)
        .add_link("https://example.org/monstera.jpg")
        .mint(&ivy.id)?;
    let monstera_id = monstera.id.clone();
    ivy.cards.push(monstera);

    let mut fern = User::new("fern");
    let aloe = CardDraft::new()
        .set_name("Aloe Vera")
        .set_fact("stores water in its leaves for months of drought")
        .set_location("Backyard")
        .set_rarity(Rarity::Common)
        .mint(&fern.id)?;
    let aloe_id = aloe.id.clone();
    fern.cards.push(aloe);

    store.insert(&ivy).context("failed to register ivy")?;
    store.insert(&fern).context("failed to register fern")?;

    // friend up first
    let friendship = FriendshipService::new(Arc::clone(&store));
    friendship.send_request(&ivy.id, &fern.id)?;
    let (fern_now, ivy_now) = friendship.accept(&fern.id, &ivy.id)?;
    println!(
        "{} and {} are now friends: {:?} / {:?}",
        ivy_now.username, fern_now.username, ivy_now.friends, fern_now.friends
    );

    // then swap the cards
    let trades = TradeService::new(Arc::clone(&store));
    let offer = trades.create_offer(&ivy.id, &monstera_id, &fern.id, &aloe_id)?;
    println!("offer {} is open", offer.offer_id);

    let (ivy_after, fern_after) = trades.accept_trade(&fern.id, &offer)?;
    println!(
        "after the trade {} holds {:?} and {} holds {:?}",
        ivy_after.username,
        ivy_after.cards.iter().map(|c| &c.name).collect::<Vec<_>>(),
        fern_after.username,
        fern_after.cards.iter().map(|c| &c.name).collect::<Vec<_>>(),
    );

    // declining an offer that is already resolved is a quiet no-op
    trades.decline_trade(&fern.id, &offer)?;

    Ok(())
}
