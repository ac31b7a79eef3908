//! Id generation and wall-clock timestamps.
//!
//! Every aggregate and sub-record id is a uuid7 payload encoded as bech32m
//! with a human-readable prefix. Trade offers are the exception: their id is
//! a content hash (see `trade`).

use bech32::Bech32m;
use chrono::{DateTime, TimeZone, Utc};
use uuid7::uuid7;

pub const USER_HRP: &str = "user_";
pub const CARD_HRP: &str = "card_";
pub const REQUEST_HRP: &str = "freq_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

fn id_with_hrp(hrp: &str) -> String {
    let hrp = bech32::Hrp::parse_unchecked(hrp);
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .expect("bech32 encoding of a uuid payload cannot fail")
}

/// Fresh user aggregate id.
pub fn new_user_id() -> String {
    id_with_hrp(USER_HRP)
}

/// Fresh card id.
pub fn new_card_id() -> String {
    id_with_hrp(CARD_HRP)
}

/// Fresh friend request id.
pub fn new_request_id() -> String {
    id_with_hrp(REQUEST_HRP)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ids_carry_their_hrp() {
        assert!(new_user_id().starts_with(USER_HRP));
        assert!(new_card_id().starts_with(CARD_HRP));
        assert!(new_request_id().starts_with(REQUEST_HRP));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_user_id(), new_user_id());
        assert_ne!(new_card_id(), new_card_id());
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }
}
