use crate::{
    domain::GalleryRepository,
    errors::RepoError,
    models::{is_displayable_url, Caption, CaptionWithImage, Image, NewCaption},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    types::{AttributeValue, Select},
    Client as DynamoDbClient,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::future::Future;
use tracing::{self, info};
use uuid::Uuid;

/// Sparse global secondary index over captions that have a displayable image.
pub const GALLERY_INDEX: &str = "displayable-by-created";
/// Partition attribute of `GALLERY_INDEX`; only written on displayable captions.
pub const GALLERY_PK: &str = "gallery_pk";
const GALLERY_PARTITION: &str = "displayable";
// DynamoDB caps a single query page at 1 MB anyway.
const MAX_QUERY_PAGE: u64 = 1000;

#[derive(Debug, Clone)]
pub struct DynamoDbGalleryRepository {
    client: DynamoDbClient,
    captions_table: String,
    images_table: String,
}

impl DynamoDbGalleryRepository {
    pub fn new(client: DynamoDbClient, captions_table: String, images_table: String) -> Self {
        info!(%captions_table, %images_table, "Initializing DynamoDbGalleryRepository");
        Self { client, captions_table, images_table }
    }

    /// Looks up the URL of an image row, the write-time half of the join.
    async fn image_url(&self, image_id: Uuid) -> Result<String, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.images_table)
            .key("id", AttributeValue::S(image_id.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get image (id: {})", self.images_table, image_id))
            .map_err(RepoError::BackendError)?;

        let item = resp.item.ok_or(RepoError::ImageNotFound(image_id))?;
        item.get("url")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .ok_or_else(|| {
                RepoError::DataCorruption(format!(
                    "image {} in table '{}' has no url attribute",
                    image_id, self.images_table
                ))
            })
    }
}

#[async_trait]
impl GalleryRepository for DynamoDbGalleryRepository {
    /// Counts index members with `Select::Count`, following pagination.
    async fn count_displayable(&self) -> Result<u64, RepoError> {
        let total = count_index(|start_key| async move {
            let resp = self
                .client
                .query()
                .table_name(&self.captions_table)
                .index_name(GALLERY_INDEX)
                .key_condition_expression("#pk = :pk")
                .expression_attribute_names("#pk", GALLERY_PK)
                .expression_attribute_values(":pk", AttributeValue::S(GALLERY_PARTITION.to_string()))
                .select(Select::Count)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .context(format!("DynamoDB (table: {}): Failed to count displayable captions", self.captions_table))
                .map_err(RepoError::BackendError)?;
            Ok((resp.count, resp.last_evaluated_key))
        })
        .await?;

        tracing::debug!(table_name = %self.captions_table, total, "DynamoDB: Counted displayable captions");
        Ok(total)
    }

    /// Walks the index newest first, skipping `offset` rows.
    async fn list_displayable(&self, offset: u64, limit: u32) -> Result<Vec<CaptionWithImage>, RepoError> {
        let rows = walk_index(offset, limit, &self.captions_table, |page_limit, start_key| async move {
            let resp = self
                .client
                .query()
                .table_name(&self.captions_table)
                .index_name(GALLERY_INDEX)
                .key_condition_expression("#pk = :pk")
                .expression_attribute_names("#pk", GALLERY_PK)
                .expression_attribute_values(":pk", AttributeValue::S(GALLERY_PARTITION.to_string()))
                .scan_index_forward(false)
                .limit(page_limit)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .context(format!("DynamoDB (table: {}): Failed to query displayable captions", self.captions_table))
                .map_err(RepoError::BackendError)?;
            Ok(IndexPage {
                items: resp.items.unwrap_or_default(),
                last_evaluated_key: resp.last_evaluated_key,
            })
        })
        .await?;

        tracing::debug!(table_name = %self.captions_table, offset, returned = rows.len(), "DynamoDB: Listed displayable captions");
        Ok(rows)
    }

    async fn insert_image(&self, url: &str) -> Result<Image, RepoError> {
        let image = Image { id: Uuid::new_v4(), url: url.to_string() };
        self.client
            .put_item()
            .table_name(&self.images_table)
            .item("id", AttributeValue::S(image.id.to_string()))
            .item("url", AttributeValue::S(image.url.clone()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put image (id: {})", self.images_table, image.id))
            .map_err(RepoError::BackendError)?;
        Ok(image)
    }

    /// Stores the caption together with its image URL so the gallery index
    /// can answer joined reads without touching the images table.
    async fn insert_caption(&self, new_caption: NewCaption) -> Result<Caption, RepoError> {
        let image_url = match new_caption.image_id {
            Some(image_id) => Some(self.image_url(image_id).await?),
            None => None,
        };

        let caption = Caption {
            id: Uuid::new_v4(),
            content: new_caption.content,
            created_datetime_utc: new_caption.created_datetime_utc,
            is_public: new_caption.is_public,
            profile_id: new_caption.profile_id,
            image_id: new_caption.image_id,
        };

        self.client
            .put_item()
            .table_name(&self.captions_table)
            .set_item(Some(caption_item(&caption, image_url.as_deref())))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put caption (id: {})", self.captions_table, caption.id))
            .map_err(RepoError::BackendError)?;

        Ok(caption)
    }
}

type Item = HashMap<String, AttributeValue>;

/// One page of a gallery index query.
struct IndexPage {
    items: Vec<Item>,
    last_evaluated_key: Option<Item>,
}

/// Sums per-page counts until the index reports no further key.
async fn count_index<F, Fut>(mut fetch: F) -> Result<u64, RepoError>
where
    F: FnMut(Option<Item>) -> Fut,
    Fut: Future<Output = Result<(i32, Option<Item>), RepoError>>,
{
    let mut total: u64 = 0;
    let mut start_key: Option<Item> = None;
    loop {
        let (count, last_evaluated_key) = fetch(start_key.take()).await?;
        total += count.max(0) as u64;
        match last_evaluated_key {
            Some(key) => start_key = Some(key),
            None => return Ok(total),
        }
    }
}

/// Pages through the index, dropping the first `offset` items and stopping
/// once `limit` rows are collected. Each request asks only for what is
/// still missing, capped at `MAX_QUERY_PAGE`.
async fn walk_index<F, Fut>(offset: u64, limit: u32, table_name: &str, mut fetch: F) -> Result<Vec<CaptionWithImage>, RepoError>
where
    F: FnMut(i32, Option<Item>) -> Fut,
    Fut: Future<Output = Result<IndexPage, RepoError>>,
{
    let limit = limit as usize;
    let mut rows: Vec<CaptionWithImage> = Vec::with_capacity((limit as u64).min(MAX_QUERY_PAGE) as usize);
    if limit == 0 {
        return Ok(rows);
    }
    let mut skipped: u64 = 0;
    let mut start_key: Option<Item> = None;

    loop {
        let wanted = (offset - skipped) + (limit - rows.len()) as u64;
        let page = fetch(wanted.min(MAX_QUERY_PAGE) as i32, start_key.take()).await?;

        for item in page.items {
            if skipped < offset {
                skipped += 1;
                continue;
            }
            match item_to_caption_with_image(&item) {
                Some(row) => rows.push(row),
                None => {
                    let item_id = item.get("id").and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, %table_name, "DynamoDB: Failed to parse caption item");
                    return Err(RepoError::DataCorruption(format!(
                        "DynamoDB: Failed to parse caption {:?} in table '{}'",
                        item_id, table_name
                    )));
                }
            }
            if rows.len() == limit {
                return Ok(rows);
            }
        }

        match page.last_evaluated_key {
            Some(key) => start_key = Some(key),
            None => return Ok(rows),
        }
    }
}

/// Fixed-width RFC 3339 so that string order on the index matches time order.
pub fn timestamp_attr(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn caption_item(caption: &Caption, image_url: Option<&str>) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(caption.id.to_string()));
    item.insert("content".to_string(), AttributeValue::S(caption.content.clone()));
    item.insert(
        "created_datetime_utc".to_string(),
        AttributeValue::S(timestamp_attr(&caption.created_datetime_utc)),
    );
    item.insert("is_public".to_string(), AttributeValue::Bool(caption.is_public));
    item.insert("profile_id".to_string(), AttributeValue::S(caption.profile_id.to_string()));
    if let Some(image_id) = caption.image_id {
        item.insert("image_id".to_string(), AttributeValue::S(image_id.to_string()));
    }
    if let Some(url) = image_url {
        item.insert("image_url".to_string(), AttributeValue::S(url.to_string()));
        if is_displayable_url(url) {
            item.insert(GALLERY_PK.to_string(), AttributeValue::S(GALLERY_PARTITION.to_string()));
        }
    }
    item
}

// Helper function to convert an index item into a joined caption row.
fn item_to_caption_with_image(item: &HashMap<String, AttributeValue>) -> Option<CaptionWithImage> {
    let uuid_attr = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
    };
    let created_datetime_utc = item
        .get("created_datetime_utc")?
        .as_s()
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
        .with_timezone(&Utc);
    let image_url = item.get("image_url")?.as_s().ok()?.to_string();
    if !is_displayable_url(&image_url) {
        return None;
    }

    Some(CaptionWithImage {
        id: uuid_attr("id")?,
        content: item.get("content")?.as_s().ok()?.to_string(),
        created_datetime_utc,
        is_public: *item.get("is_public")?.as_bool().ok()?,
        profile_id: uuid_attr("profile_id")?,
        image_id: uuid_attr("image_id")?,
        image_url,
    })
}
