use serde::{Deserialize, Serialize};

fn untitled() -> String {
    "Untitled".to_string()
}

/// Section node as the document store sends and receives it.
///
/// The store keeps sections positionally: there is no section id on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ApiSection {
    #[serde(default = "untitled")]
    pub title: String,

    /// Nesting depth. Missing means "one deeper than the parent".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub subsections: Vec<ApiSection>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PageContent {
    #[serde(default)]
    pub sections: Vec<ApiSection>,

    /// Scraper metadata; opaque to the editor, carried through on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApiPage {
    #[serde(default = "untitled")]
    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub content: PageContent,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DocumentContent {
    #[serde(default)]
    pub pages: Vec<ApiPage>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentData {
    pub id: i64,
    pub team_id: i64,
    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub content: DocumentContent,

    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl DocumentData {
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Response envelope used by every document endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DocumentEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<DocumentData>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Whole-document PUT body. There is no partial update endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UpdateDocumentRequest {
    pub title: String,
    pub content: DocumentContent,
}
