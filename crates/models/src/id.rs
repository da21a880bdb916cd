/// An 8-byte identifier for jobs, outbox messages, review items, and prompt
/// templates. Stored as a Postgres `bigint` and rendered as 16 hex digits.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

/// The failure of reading an id from text.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid id: expected 16 hex digits")]
pub struct ParseIdError;

impl Id {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn from_hex(text: &str) -> Result<Self, ParseIdError> {
        if text.len() != 16 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseIdError);
        }
        u64::from_str_radix(text, 16).map(Id).map_err(|_| ParseIdError)
    }
}

impl std::str::FromStr for Id {
    type Err = ParseIdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Id::from_hex(text)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl serde::Serialize for Id {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        Id::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

// The database side is a signed bigint; the cast is a bit-for-bit reinterpret
// in both directions.
impl sqlx::Type<sqlx::Postgres> for Id {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for Id {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <i64 as sqlx::Encode<'_, sqlx::Postgres>>::encode_by_ref(&(self.0 as i64), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Id {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Id(<i64 as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)? as u64))
    }
}

/// Produces process-locally unique ids: the wall-clock millisecond in the
/// high bits, then a shard drawn per process, then a wrapping sequence
/// counter. Ordering across processes is approximate; uniqueness holds as
/// long as one shard mints at most 64 ids per millisecond.
pub struct IdGenerator {
    shard: u16,
    seq: u16,
}

impl IdGenerator {
    pub fn new(shard: u16) -> Self {
        Self {
            shard: shard & 0x3ff,
            seq: 0,
        }
    }

    pub fn next(&mut self) -> Id {
        let millis = chrono::Utc::now().timestamp_millis() as u64;
        let seq = u64::from(self.seq) & 0x3f;
        self.seq = self.seq.wrapping_add(1);
        Id((millis << 16) | (u64::from(self.shard) << 6) | seq)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn id_round_trips_through_hex() {
        let id = Id::new(0x0102030405060708);
        assert_eq!(id.to_string(), "0102030405060708");
        assert_eq!("0102030405060708".parse::<Id>().unwrap(), id);
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert_eq!(Id::from_hex("0102"), Err(ParseIdError));
        assert_eq!(Id::from_hex("010203040506070g"), Err(ParseIdError));
        assert_eq!(Id::from_hex("+102030405060708"), Err(ParseIdError));
    }

    #[test]
    fn high_bit_ids_survive_the_bigint_cast() {
        let id = Id::new(u64::MAX);
        assert_eq!(id.to_string(), "ffffffffffffffff");
        assert_eq!(Id::from_hex("ffffffffffffffff").unwrap(), id);
    }

    #[test]
    fn generator_produces_distinct_ids() {
        let mut gen = IdGenerator::new(7);
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }
}
