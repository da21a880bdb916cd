use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef, Postgres};

/// Wrapper that binds and reads a value against Postgres `JSON` columns,
/// never `JSONB`. The plain-text encoding keeps the document exactly as
/// serialized, which matters for checkpoint payloads that are compared and
/// re-read byte-for-byte.
#[derive(Copy, Clone, Debug, Serialize)]
pub struct TextJson<T>(pub T);

impl<T> TextJson<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for TextJson<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> std::ops::Deref for TextJson<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> sqlx::Type<Postgres> for TextJson<T> {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("JSON")
    }

    // Deliberately not compatible with JSONB.
    fn compatible(ty: &PgTypeInfo) -> bool {
        *ty == Self::type_info()
    }
}

impl<T: Serialize> sqlx::Encode<'_, Postgres> for TextJson<T> {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> sqlx::encode::IsNull {
        let raw = serde_json::to_vec(&self.0)
            .expect("TextJson value failed to serialize for the database");
        buf.extend_from_slice(&raw);
        sqlx::encode::IsNull::No
    }
}

impl<'r, T: Deserialize<'r> + 'r> sqlx::Decode<'r, Postgres> for TextJson<T> {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // The json type carries the document text unchanged in both the
        // text and the binary protocol.
        let raw = <&'r str as sqlx::Decode<'r, Postgres>>::decode(value)?;
        Ok(TextJson(serde_json::from_str(raw)?))
    }
}
