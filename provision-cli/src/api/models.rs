//! Request and response bodies for the schema endpoints

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a new schema is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub page_id: String,
}

impl ParentRef {
    pub fn page(page_id: impl Into<String>) -> Self {
        Self {
            kind: "page_id".to_string(),
            page_id: page_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

/// Plain rich-text segment used for schema titles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: TextContent,
}

impl RichText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: TextContent {
                content: content.into(),
            },
        }
    }
}

/// `POST /databases`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSchemaRequest {
    pub parent: ParentRef,
    pub title: Vec<RichText>,
    pub properties: Map<String, Value>,
}

impl CreateSchemaRequest {
    pub fn new(parent_page_id: &str, title: &str, properties: Map<String, Value>) -> Self {
        Self {
            parent: ParentRef::page(parent_page_id),
            title: vec![RichText::plain(title)],
            properties,
        }
    }

    /// Concatenated plain title
    pub fn title_text(&self) -> String {
        self.title.iter().map(|t| t.text.content.as_str()).collect()
    }
}

/// `PATCH /databases/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSchemaRequest {
    pub properties: Map<String, Value>,
}

impl PatchSchemaRequest {
    /// Additive patch of a single property
    pub fn add_property(name: impl Into<String>, payload: Value) -> Self {
        let mut properties = Map::new();
        properties.insert(name.into(), payload);
        Self { properties }
    }
}

/// Raw database object as returned by the store
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseObject {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// What the pipeline needs from a create or patch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaResponse {
    pub id: String,
    /// Property names present on the schema after the call
    pub property_names: Vec<String>,
}

impl SchemaResponse {
    pub fn has_property(&self, name: &str) -> bool {
        self.property_names.iter().any(|p| p == name)
    }
}

impl From<DatabaseObject> for SchemaResponse {
    fn from(object: DatabaseObject) -> Self {
        Self {
            id: object.id,
            property_names: object.properties.keys().cloned().collect(),
        }
    }
}

/// Error body, e.g. `{"object":"error","status":400,"code":"validation_error","message":"..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct StoreErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
