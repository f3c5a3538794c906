//! Page assembly for the public gallery and the per-view paging state.

use crate::{
    domain::GalleryRepository,
    errors::GalleryError,
    models::{CaptionWithImage, GalleryPage},
};
use std::sync::Arc;
use uuid::Uuid;

/// Produces gallery pages from the joined caption/image view of the store.
#[derive(Clone)]
pub struct GalleryAssembler {
    repo: Arc<dyn GalleryRepository>,
    page_size: u32,
}

impl GalleryAssembler {
    /// `page_size` of 0 is treated as 1.
    pub fn new(repo: Arc<dyn GalleryRepository>, page_size: u32) -> Self {
        Self { repo, page_size: page_size.max(1) }
    }

    /// Fetches page `page` (1-based). Count and data are read concurrently.
    pub async fn page(&self, page: u32) -> Result<GalleryPage, GalleryError> {
        if page == 0 {
            return Err(GalleryError::InvalidPage(page));
        }
        let offset = u64::from(page - 1) * u64::from(self.page_size);
        tracing::debug!(page, offset, page_size = self.page_size, "Assembling gallery page");

        let (total_count, captions) = tokio::try_join!(
            self.repo.count_displayable(),
            self.repo.list_displayable(offset, self.page_size),
        )?;

        Ok(GalleryPage {
            page,
            page_size: self.page_size,
            total_pages: total_pages(total_count, self.page_size),
            total_count,
            captions,
        })
    }
}

pub fn total_pages(total_count: u64, page_size: u32) -> u32 {
    let pages = total_count.div_ceil(u64::from(page_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// What a card shows in its image slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageState {
    Ready(String),
    /// The image failed to load in the client; a placeholder is shown.
    Failed,
}

impl ImageState {
    pub fn placeholder_text(&self) -> Option<&'static str> {
        match self {
            ImageState::Ready(_) => None,
            ImageState::Failed => Some("Image failed to load"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCard {
    pub caption: CaptionWithImage,
    pub image: ImageState,
}

impl CaptionCard {
    fn new(caption: CaptionWithImage) -> Self {
        let image = ImageState::Ready(caption.image_url.clone());
        Self { caption, image }
    }

    /// Creation date as shown under the caption.
    pub fn display_date(&self) -> String {
        self.caption.created_datetime_utc.format("%Y-%m-%d").to_string()
    }
}

/// Identifies the fetch a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub page: u32,
    generation: u64,
}

/// Outcome of handing a response to [`GalleryView::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Page,
    Failed,
    /// A newer fetch was issued after this one; the response was dropped.
    Stale,
}

/// Paging state owned by one gallery view.
///
/// Every fetch is tagged with a [`PageTicket`]; only the response for the
/// most recently issued ticket is applied, so a slow response for an older
/// page can never overwrite a newer one.
#[derive(Debug)]
pub struct GalleryView {
    current_page: u32,
    total_pages: u32,
    cards: Vec<CaptionCard>,
    loading: bool,
    last_error: Option<String>,
    generation: u64,
}

impl Default for GalleryView {
    fn default() -> Self {
        Self::new()
    }
}

impl GalleryView {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            total_pages: 0,
            cards: Vec::new(),
            loading: true,
            last_error: None,
            generation: 0,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn cards(&self) -> &[CaptionCard] {
        &self.cards
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn can_go_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Starts a (re)load of the current page.
    pub fn begin_load(&mut self) -> PageTicket {
        self.generation += 1;
        self.loading = true;
        PageTicket { page: self.current_page, generation: self.generation }
    }

    pub fn go_to_page(&mut self, page: u32) -> PageTicket {
        self.current_page = page.max(1);
        self.begin_load()
    }

    pub fn go_to_next(&mut self) -> Option<PageTicket> {
        if !self.can_go_next() {
            return None;
        }
        Some(self.go_to_page(self.current_page + 1))
    }

    pub fn go_to_prev(&mut self) -> Option<PageTicket> {
        if !self.can_go_prev() {
            return None;
        }
        Some(self.go_to_page(self.current_page - 1))
    }

    /// Applies the response for `ticket` unless a newer fetch superseded it.
    ///
    /// A failed read leaves an empty, not-loading view with the error kept
    /// as a diagnostic. Nothing is retried.
    pub fn apply(&mut self, ticket: PageTicket, result: Result<GalleryPage, GalleryError>) -> Applied {
        if ticket.generation != self.generation {
            tracing::debug!(page = ticket.page, current_page = self.current_page, "Dropping stale gallery response");
            return Applied::Stale;
        }
        self.loading = false;
        match result {
            Ok(page) => {
                self.total_pages = page.total_pages;
                self.cards = page.captions.into_iter().map(CaptionCard::new).collect();
                self.last_error = None;
                Applied::Page
            }
            Err(e) => {
                tracing::error!(page = ticket.page, error = %e, "Failed to load gallery page");
                self.cards.clear();
                self.last_error = Some(e.to_string());
                Applied::Failed
            }
        }
    }

    /// Fetches the current page and applies it.
    pub async fn load(&mut self, assembler: &GalleryAssembler) -> Applied {
        let ticket = self.begin_load();
        let result = assembler.page(ticket.page).await;
        self.apply(ticket, result)
    }

    /// Switches a single card to its placeholder after a client-side load error.
    pub fn image_failed(&mut self, caption_id: Uuid) {
        if let Some(card) = self.cards.iter_mut().find(|c| c.caption.id == caption_id) {
            tracing::debug!(%caption_id, url = %card.caption.image_url, "Image failed to load");
            card.image = ImageState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GalleryRepository;
    use crate::memory::InMemoryGalleryRepository;
    use crate::models::NewCaption;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::Ordering;

    async fn add(repo: &InMemoryGalleryRepository, content: &str, minute: i64, url: Option<&str>) {
        let image_id = match url {
            Some(url) => Some(repo.insert_image(url).await.unwrap().id),
            None => None,
        };
        repo.insert_caption(NewCaption {
            content: content.to_string(),
            created_datetime_utc: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::minutes(minute),
            is_public: true,
            profile_id: Uuid::nil(),
            image_id,
        })
        .await
        .unwrap();
    }

    fn contents(page: &GalleryPage) -> Vec<&str> {
        page.captions.iter().map(|c| c.content.as_str()).collect()
    }

    async fn four_caption_store() -> Arc<InMemoryGalleryRepository> {
        let repo = Arc::new(InMemoryGalleryRepository::new());
        add(&repo, "C1", 1, Some("https://img.example.com/1.png")).await;
        add(&repo, "C2", 2, None).await;
        add(&repo, "C3", 3, Some("https://img.example.com/3.png")).await;
        add(&repo, "C4", 4, Some("https://img.example.com/4.png")).await;
        repo
    }

    #[tokio::test]
    async fn pages_skip_captions_without_images() {
        let repo = four_caption_store().await;
        let assembler = GalleryAssembler::new(repo, 2);

        let first = assembler.page(1).await.unwrap();
        assert_eq!(contents(&first), vec!["C4", "C3"]);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.total_count, 3);

        let second = assembler.page(2).await.unwrap();
        assert_eq!(contents(&second), vec!["C1"]);
        assert_eq!(second.total_pages, 2);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let assembler = GalleryAssembler::new(four_caption_store().await, 2);
        let page = assembler.page(7).await.unwrap();
        assert!(page.captions.is_empty());
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn page_zero_is_rejected() {
        let assembler = GalleryAssembler::new(four_caption_store().await, 2);
        assert!(matches!(assembler.page(0).await, Err(GalleryError::InvalidPage(0))));
    }

    #[tokio::test]
    async fn every_page_respects_size_order_and_image_invariant() {
        let repo = Arc::new(InMemoryGalleryRepository::new());
        for i in 0..11 {
            let url = match i % 3 {
                0 => None,
                1 => Some(" "),
                _ => Some("https://img.example.com/ok.png"),
            };
            add(&repo, &format!("c{}", i), i, url).await;
        }
        let valid = (0..11).filter(|i| i % 3 == 2).count() as u64;
        assert_eq!(repo.count_displayable().await.unwrap(), valid);

        for page_size in 1..=4u32 {
            let assembler = GalleryAssembler::new(repo.clone(), page_size);
            let first = assembler.page(1).await.unwrap();
            let pages = first.total_pages as u64;
            assert!(pages * page_size as u64 >= valid);
            assert!(pages.saturating_sub(1) * (page_size as u64) < valid);

            let mut seen = 0u64;
            for n in 1..=first.total_pages {
                let page = assembler.page(n).await.unwrap();
                assert!(page.captions.len() <= page_size as usize);
                assert!(page.captions.iter().all(|c| !c.image_url.trim().is_empty()));
                assert!(page
                    .captions
                    .windows(2)
                    .all(|w| w[0].created_datetime_utc >= w[1].created_datetime_utc));
                seen += page.captions.len() as u64;
            }
            assert_eq!(seen, valid);
        }
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 36), 0);
        assert_eq!(total_pages(1, 36), 1);
        assert_eq!(total_pages(36, 36), 1);
        assert_eq!(total_pages(37, 36), 2);
    }

    #[tokio::test]
    async fn view_loads_and_pages_forward() {
        let assembler = GalleryAssembler::new(four_caption_store().await, 2);
        let mut view = GalleryView::new();
        assert!(view.is_loading());

        assert_eq!(view.load(&assembler).await, Applied::Page);
        assert!(!view.is_loading());
        assert_eq!(view.total_pages(), 2);
        assert!(!view.can_go_prev());

        let ticket = view.go_to_next().expect("second page exists");
        let result = assembler.page(ticket.page).await;
        assert_eq!(view.apply(ticket, result), Applied::Page);
        assert_eq!(view.current_page(), 2);
        assert_eq!(view.cards().len(), 1);
        assert!(view.go_to_next().is_none());
    }

    #[tokio::test]
    async fn stale_response_is_dropped() {
        let assembler = GalleryAssembler::new(four_caption_store().await, 2);
        let mut view = GalleryView::new();
        view.load(&assembler).await;

        let to_second = view.go_to_next().unwrap();
        let back_to_first = view.go_to_prev().unwrap();

        let first = assembler.page(back_to_first.page).await;
        assert_eq!(view.apply(back_to_first, first), Applied::Page);

        // The page-2 response arrives late and must not replace page 1.
        let second = assembler.page(to_second.page).await;
        assert_eq!(view.apply(to_second, second), Applied::Stale);
        assert_eq!(view.current_page(), 1);
        let shown: Vec<&str> = view.cards().iter().map(|c| c.caption.content.as_str()).collect();
        assert_eq!(shown, vec!["C4", "C3"]);
    }

    #[tokio::test]
    async fn read_failure_leaves_empty_idle_view() {
        let repo = four_caption_store().await;
        let assembler = GalleryAssembler::new(repo.clone(), 2);
        let mut view = GalleryView::new();
        view.load(&assembler).await;
        assert_eq!(view.cards().len(), 2);

        repo.fail_reads.store(true, Ordering::Relaxed);
        let calls_before = repo.store_calls();
        assert_eq!(view.load(&assembler).await, Applied::Failed);
        assert!(view.cards().is_empty());
        assert!(!view.is_loading());
        assert!(view.last_error().is_some());
        // At most one attempt per query, no retries.
        let attempts = repo.store_calls() - calls_before;
        assert!((1..=2).contains(&attempts));
    }

    #[tokio::test]
    async fn broken_image_falls_back_per_card() {
        let assembler = GalleryAssembler::new(four_caption_store().await, 2);
        let mut view = GalleryView::new();
        view.load(&assembler).await;

        let broken = view.cards()[0].caption.id;
        view.image_failed(broken);

        assert_eq!(view.cards()[0].image, ImageState::Failed);
        assert_eq!(view.cards()[0].image.placeholder_text(), Some("Image failed to load"));
        assert!(matches!(view.cards()[1].image, ImageState::Ready(_)));
        assert_eq!(view.cards()[1].display_date(), "2025-06-01");
    }
}
