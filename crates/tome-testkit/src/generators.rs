//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::model::{ChildObject, MyDocument};

/// Free text, including the empty string and non-ASCII characters.
pub fn content() -> impl Strategy<Value = String> {
    "\\PC{0,40}"
}

/// A decimal with up to six fractional digits.
pub fn decimal() -> impl Strategy<Value = Decimal> {
    (any::<i64>(), 0u32..=6).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// A UTC timestamp between 1970 and roughly 2100, at nanosecond precision.
pub fn date() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_default()
    })
}

/// A finite float. NaN never compares equal to itself, so it is left out.
pub fn double() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::SUBNORMAL
}

/// A JSON scalar.
pub fn json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ]
}

/// A JSON object nested at most two levels deep.
pub fn json_object() -> impl Strategy<Value = Value> {
    let leaf = json_scalar();
    let nested = prop::collection::btree_map("[A-Z][a-z]{0,7}", json_scalar(), 0..4)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()));
    prop::collection::btree_map("[A-Z][a-z]{0,7}", prop_oneof![leaf, nested], 0..5)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
}

pub fn child_object() -> impl Strategy<Value = ChildObject> {
    content().prop_map(|hello| ChildObject { hello })
}

/// A document without an id, so the store assigns one.
pub fn my_document() -> impl Strategy<Value = MyDocument> {
    (
        content(),
        any::<i32>(),
        double(),
        decimal(),
        date(),
        prop::collection::vec(content(), 0..5),
        prop::option::of(child_object()),
        json_object(),
        prop_oneof![Just(Value::Null), any::<bool>().prop_map(Value::Bool)],
    )
        .prop_map(
            |(content, integer, double, decimal, date, array, child_object, anonymous_object, boolean)| {
                MyDocument {
                    id: String::new(),
                    content,
                    integer,
                    double,
                    decimal,
                    date,
                    array,
                    child_object,
                    anonymous_object,
                    boolean,
                }
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_core::{canonical_bytes, decode_document, encode_document};

    proptest! {
        #[test]
        fn test_encoding_is_deterministic(doc in my_document()) {
            prop_assert_eq!(canonical_bytes(&doc).unwrap(), canonical_bytes(&doc.clone()).unwrap());
        }

        #[test]
        fn test_document_survives_encoding(doc in my_document()) {
            let back: MyDocument = decode_document(&encode_document(&doc).unwrap()).unwrap();
            prop_assert_eq!(back, doc);
        }
    }
}
