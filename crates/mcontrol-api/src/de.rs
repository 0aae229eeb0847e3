// Lenient scalar deserializers.
//
// Both the cloud and the gateway are inconsistent about whether numbers
// arrive as JSON numbers or strings ("24" vs 24, "200" vs 200).

use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s,
        }
    }
}

/// Required field that may be a number or a string, normalized to `String`.
pub(crate) fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(d).map(Scalar::into_string)
}

/// Optional field that may be a number or a string. `null` maps to `None`.
pub(crate) fn opt_string_or_number<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
}

/// Optional integer code that may arrive as `200` or `"200"`.
pub(crate) fn opt_code<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(d)? {
        None => Ok(None),
        Some(Scalar::Int(n)) => Ok(Some(n)),
        Some(Scalar::Float(f)) => Err(de::Error::custom(format!("non-integer code {f}"))),
        Some(Scalar::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(Scalar::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid code {s:?}"))),
    }
}

/// Integer in `0..=255` that may arrive as a number or a string.
pub(crate) fn u8_from_any<'de, D>(d: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Scalar::deserialize(d)?.into_string();
    raw.trim()
        .parse()
        .map_err(|_| de::Error::custom(format!("expected unit address 0-255, got {raw:?}")))
}
