//! The sample document used throughout the tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tome_core::Document;

/// A nested object with a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChildObject {
    pub hello: String,
}

/// A document touching every kind of field the store carries.
///
/// `anonymous_object` and `boolean` are schemaless: any JSON-shaped value
/// is accepted and round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MyDocument {
    pub id: String,
    pub content: String,
    pub integer: i32,
    pub double: f64,
    pub decimal: Decimal,
    pub date: DateTime<Utc>,
    pub array: Vec<String>,
    pub child_object: Option<ChildObject>,
    pub anonymous_object: serde_json::Value,
    pub boolean: serde_json::Value,
}

impl Document for MyDocument {
    const COLLECTION: &'static str = "MyDocuments";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl MyDocument {
    /// A document with only `Content` set.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A fully populated document.
    pub fn sample() -> Self {
        Self {
            id: String::new(),
            content: "Some Content".into(),
            integer: 1,
            double: 1.0,
            decimal: Decimal::new(2, 0),
            date: Utc::now(),
            array: vec!["Item 1".into(), "Item 2".into()],
            child_object: Some(ChildObject {
                hello: "World!".into(),
            }),
            anonymous_object: json!({ "Thing": "Stuff" }),
            boolean: serde_json::Value::Null,
        }
    }
}
