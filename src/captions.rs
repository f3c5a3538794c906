use crate::{
    domain::GalleryRepository,
    errors::CaptionError,
    models::{Caption, NewCaption, User},
};
use chrono::Utc;
use serde::Deserialize;

/// Body of the caption creation form.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionForm {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

/// A form that passed local validation; fields are trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCaptionForm {
    pub content: String,
    pub image_url: String,
    pub is_public: bool,
}

impl CaptionForm {
    pub fn validate(&self) -> Result<ValidCaptionForm, CaptionError> {
        let content = self.content.trim();
        let image_url = self.image_url.trim();
        match (content.is_empty(), image_url.is_empty()) {
            (true, true) => Err(CaptionError::Validation("Caption text and image URL are required".into())),
            (true, false) => Err(CaptionError::Validation("Caption text is required".into())),
            (false, true) => Err(CaptionError::Validation("Image URL is required".into())),
            (false, false) => Ok(ValidCaptionForm {
                content: content.to_string(),
                image_url: image_url.to_string(),
                is_public: self.is_public,
            }),
        }
    }
}

/// Creates an image row and then a caption row pointing at it.
///
/// Validation happens before any store call. If the caption insert fails
/// the image row stays behind; it is reported in the error, not removed.
pub async fn create_caption(
    repo: &dyn GalleryRepository,
    user: &User,
    form: &CaptionForm,
) -> Result<Caption, CaptionError> {
    let form = form.validate()?;

    let image = repo
        .insert_image(&form.image_url)
        .await
        .map_err(CaptionError::ImageInsert)?;

    let caption = repo
        .insert_caption(NewCaption {
            content: form.content,
            created_datetime_utc: Utc::now(),
            is_public: form.is_public,
            profile_id: user.id,
            image_id: Some(image.id),
        })
        .await
        .map_err(|source| {
            tracing::warn!(image_id = %image.id, error = %source, "Caption insert failed after image insert");
            CaptionError::CaptionInsert { orphaned_image: image.id, source }
        })?;

    tracing::info!(caption_id = %caption.id, image_id = %image.id, user_id = %user.id, "Caption created");
    Ok(caption)
}
