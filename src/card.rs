//! Card records and the minting draft.

use crate::error::EngineError;
use crate::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rarity {
    #[n(0)]
    Common,
    #[n(1)]
    Uncommon,
    #[n(2)]
    Rare,
    #[n(3)]
    Legendary,
}

/// A collectible card. Lives inside the `cards` vector of whichever user
/// currently owns it; `owner` mutates only through an accepted trade.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Card {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub creator: String, // immutable after minting
    #[n(2)]
    pub owner: String,
    #[n(3)]
    pub trade_status: bool, // eligible to appear in a *new* offer
    #[n(4)]
    pub name: String,
    #[n(5)]
    pub fact: String,
    #[n(6)]
    pub location: String,
    #[n(7)]
    pub rarity: Rarity,
    #[n(8)]
    pub links: Vec<String>,
}

impl Card {
    pub fn is_tradeable(&self) -> bool {
        self.trade_status
    }
}

// used for constructing drafts before a card exists
#[derive(Debug, Default)]
pub struct CardDraft {
    name: Option<String>,
    fact: Option<String>,
    location: Option<String>,
    rarity: Option<Rarity>,
    links: Vec<String>,
}

impl CardDraft {
    /// Construct a new draft object, this becomes the basis for a minted card
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }
    pub fn set_fact(mut self, fact: &str) -> Self {
        self.fact = Some(fact.to_owned());
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_owned());
        self
    }
    pub fn set_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = Some(rarity);
        self
    }
    pub fn add_link(mut self, link: &str) -> Self {
        self.links.push(link.to_owned());
        self
    }

    /// Checks fields, then mints the card with a fresh id. The creator is
    /// also the first owner and the card starts out tradeable.
    pub fn mint(self, creator_id: &str) -> Result<Card, EngineError> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(EngineError::Validation("card name is not set".into())),
        };
        let rarity = self
            .rarity
            .ok_or_else(|| EngineError::Validation("card rarity is not set".into()))?;

        Ok(Card {
            id: utils::new_card_id(),
            creator: creator_id.to_owned(),
            owner: creator_id.to_owned(),
            trade_status: true,
            name,
            fact: self.fact.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            rarity,
            links: self.links,
        })
    }
}
