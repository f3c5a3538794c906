use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A caption row as stored in the `captions` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Caption {
    pub id: Uuid,
    pub content: String,
    pub created_datetime_utc: DateTime<Utc>,
    pub is_public: bool,
    pub profile_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<Uuid>,
}

/// An image row as stored in the `images` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    pub id: Uuid,
    pub url: String,
}

/// Fields supplied when inserting a caption. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewCaption {
    pub content: String,
    pub created_datetime_utc: DateTime<Utc>,
    pub is_public: bool,
    pub profile_id: Uuid,
    pub image_id: Option<Uuid>,
}

/// A caption inner-joined with its image. `image_url` is never blank.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CaptionWithImage {
    pub id: Uuid,
    pub content: String,
    pub created_datetime_utc: DateTime<Utc>,
    pub is_public: bool,
    pub profile_id: Uuid,
    pub image_id: Uuid,
    pub image_url: String,
}

/// One page of the public gallery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GalleryPage {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub captions: Vec<CaptionWithImage>,
}

/// The signed-in user as reported by the identity provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// A provider-issued session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Returns true when a URL is usable for display.
pub fn is_displayable_url(url: &str) -> bool {
    !url.trim().is_empty()
}
