use std::collections::HashSet;
use std::ops::Range;

use anyhow::Result;

use crate::content::{ListQuery, Post, PostListing};
use crate::data::PostService;

/// Consecutive scroll-triggered fetches allowed before an explicit
/// "load more" press is required to re-arm automatic loading.
pub const AUTO_LOAD_LIMIT: u32 = 5;

/// Distance from the bottom of the document (in layout units) at which a
/// scroll position counts as "near the bottom".
pub const BOTTOM_PROXIMITY: u32 = 300;

pub const MSG_FETCH_ERROR: &str = "पोस्ट प्राप्त करने में त्रुटि हुई।";
pub const MSG_NO_POSTS: &str = "कोई पोस्ट नहीं मिली।";
pub const MSG_ALL_SEEN: &str = "🎉 आपने सभी पोस्ट देख लीं।";

/// City / tag constraints sourced from navigation at mount, fixed for the
/// lifetime of one feed view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilters {
    pub city: Option<String>,
    pub tag_id: Option<String>,
}

/// Single-flight fetch state. A new fetch is only accepted while `Idle`;
/// the outcome of a finished fetch is recorded in the controller fields and
/// the phase returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPhase {
    Idle,
    Loading { page: u32, append: bool },
}

/// User-facing outcome of the last completed fetch. `Error` renders as a
/// banner; `NoResults` as the quiet empty-state text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMessage {
    Error,
    NoResults,
}

impl FeedMessage {
    pub fn text(&self) -> &'static str {
        match self {
            FeedMessage::Error => MSG_FETCH_ERROR,
            FeedMessage::NoResults => MSG_NO_POSTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub language: String,
    pub location: String,
    pub per_page: u32,
    pub filters: FeedFilters,
    /// Ask the server to group the listing by month labels.
    pub group_by_month: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            language: crate::content::DEFAULT_LANGUAGE.to_string(),
            location: "c2".to_string(),
            per_page: crate::content::DEFAULT_PAGE_SIZE,
            filters: FeedFilters::default(),
            group_by_month: false,
        }
    }
}

/// A contiguous run of accumulated posts sharing one month label, for
/// rendering month headings over a grouped feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGroup {
    pub month: Option<String>,
    pub range: Range<usize>,
}

/// Paginated post feed controller: fetches listing pages, merges them into an
/// accumulated sequence without duplicate ids, tracks pagination cursors and
/// drives the scroll-triggered auto-load throttle.
pub struct FeedController {
    language: String,
    location: String,
    per_page: u32,
    filters: FeedFilters,
    group_by_month: bool,
    posts: Vec<Post>,
    grouped: bool,
    phase: FetchPhase,
    message: Option<FeedMessage>,
    current_page: u32,
    last_page: u32,
    auto_load_count: u32,
    auto_load_enabled: bool,
    loaded_once: bool,
}

impl FeedController {
    pub fn new(options: FeedOptions) -> Self {
        Self {
            language: options.language,
            location: options.location,
            per_page: options.per_page.max(1),
            filters: options.filters,
            group_by_month: options.group_by_month,
            posts: Vec::new(),
            grouped: false,
            phase: FetchPhase::Idle,
            message: None,
            current_page: 1,
            last_page: 1,
            auto_load_count: 0,
            auto_load_enabled: true,
            loaded_once: false,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn grouped(&self) -> bool {
        self.grouped
    }

    pub fn filters(&self) -> &FeedFilters {
        &self.filters
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn last_page(&self) -> u32 {
        self.last_page
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, FetchPhase::Loading { .. })
    }

    pub fn message(&self) -> Option<FeedMessage> {
        self.message
    }

    pub fn auto_load_enabled(&self) -> bool {
        self.auto_load_enabled
    }

    pub fn auto_load_count(&self) -> u32 {
        self.auto_load_count
    }

    pub fn has_more(&self) -> bool {
        self.current_page < self.last_page
    }

    /// The feed is exhausted once the server-reported last page has been
    /// reached and something was actually loaded. Distinct from the
    /// "no results" state.
    pub fn is_exhausted(&self) -> bool {
        !self.is_loading() && self.current_page == self.last_page && !self.posts.is_empty()
    }

    /// Zero posts after a completed replace fetch.
    pub fn no_results(&self) -> bool {
        !self.is_loading() && self.loaded_once && self.posts.is_empty()
    }

    /// Starts a fetch if none is in flight. Returns the listing query for the
    /// caller to execute; the outcome must be fed back through [`apply`].
    ///
    /// [`apply`]: FeedController::apply
    pub fn begin(&mut self, page: u32, append: bool) -> Option<ListQuery> {
        if self.is_loading() {
            return None;
        }
        let page = page.max(1);
        self.phase = FetchPhase::Loading { page, append };
        self.message = None;
        Some(ListQuery {
            language: self.language.clone(),
            page,
            per_page: self.per_page,
            location: self.location.clone(),
            city: self.filters.city.clone(),
            tag_id: self.filters.tag_id.clone(),
            group_by_month: self.group_by_month,
        })
    }

    /// Records the outcome of the fetch started by [`begin`] and returns the
    /// phase to idle.
    ///
    /// [`begin`]: FeedController::begin
    pub fn apply(&mut self, outcome: Result<PostListing>) {
        let FetchPhase::Loading { append, .. } = self.phase else {
            return;
        };
        self.phase = FetchPhase::Idle;

        let listing = match outcome {
            Ok(listing) => listing,
            Err(_) => {
                self.message = Some(FeedMessage::Error);
                if !append {
                    self.posts.clear();
                    self.grouped = false;
                    self.loaded_once = true;
                }
                return;
            }
        };

        let flat = listing.posts.flatten();
        if !listing.success || flat.posts.is_empty() {
            self.message = Some(FeedMessage::NoResults);
            if !append {
                self.posts.clear();
                self.grouped = false;
                self.loaded_once = true;
            }
            return;
        }

        self.grouped = flat.grouped;
        self.merge(flat.posts, append);

        let pagination = listing.pagination.unwrap_or_default();
        self.current_page = pagination.current_page.max(1);
        self.last_page = pagination.last_page.max(1).max(self.current_page);
        if !append {
            self.loaded_once = true;
        }
    }

    /// Drops an in-flight fetch (view unmount, filter change); accumulated
    /// state is left untouched.
    pub fn abort(&mut self) {
        self.phase = FetchPhase::Idle;
    }

    /// Full fetch-and-merge contract: request `page`, merge into (append) or
    /// replace the accumulation. Failures never propagate to the caller;
    /// they are recorded as the feed message. Returns whether a fetch ran.
    pub fn load_page(&mut self, service: &dyn PostService, page: u32, append: bool) -> bool {
        let Some(query) = self.begin(page, append) else {
            return false;
        };
        let outcome = service.list_posts(&query);
        self.apply(outcome);
        true
    }

    fn near_bottom(scroll_position: u32, viewport_height: u32, document_height: u32) -> bool {
        scroll_position + viewport_height + BOTTOM_PROXIMITY >= document_height
    }

    /// Starts the next auto-load if eligible, charging the throttle counter.
    /// The returned query must be executed and fed back through [`apply`].
    ///
    /// [`apply`]: FeedController::apply
    pub fn begin_auto_load(
        &mut self,
        scroll_position: u32,
        viewport_height: u32,
        document_height: u32,
    ) -> Option<ListQuery> {
        if self.is_loading()
            || !self.has_more()
            || !self.auto_load_enabled
            || !Self::near_bottom(scroll_position, viewport_height, document_height)
        {
            return None;
        }
        let query = self.begin(self.current_page + 1, true)?;
        self.auto_load_count += 1;
        if self.auto_load_count >= AUTO_LOAD_LIMIT {
            self.auto_load_enabled = false;
        }
        Some(query)
    }

    /// Starts a manual load-more, unconditionally re-arming auto-load. No-op
    /// unless `current_page < last_page`.
    pub fn begin_manual_load(&mut self) -> Option<ListQuery> {
        if self.is_loading() || !self.has_more() {
            return None;
        }
        let query = self.begin(self.current_page + 1, true)?;
        self.auto_load_count = 0;
        self.auto_load_enabled = true;
        Some(query)
    }

    /// Scroll-trigger entry point: fires `load_page(current + 1, append)`
    /// when not loading, more pages remain, auto-load is armed and the
    /// position is within [`BOTTOM_PROXIMITY`] of the document bottom.
    pub fn trigger_auto_load_if_eligible(
        &mut self,
        service: &dyn PostService,
        scroll_position: u32,
        viewport_height: u32,
        document_height: u32,
    ) -> bool {
        let Some(query) =
            self.begin_auto_load(scroll_position, viewport_height, document_height)
        else {
            return false;
        };
        let outcome = service.list_posts(&query);
        self.apply(outcome);
        true
    }

    /// Manual "load more": the only way to re-arm auto-load once the cap is
    /// hit.
    pub fn load_more_manually(&mut self, service: &dyn PostService) -> bool {
        let Some(query) = self.begin_manual_load() else {
            return false;
        };
        let outcome = service.list_posts(&query);
        self.apply(outcome);
        true
    }

    /// Merge policy: append concatenates after the accumulation, replace
    /// discards it; either way duplicates by id are dropped keeping the
    /// first occurrence, so an entry from an earlier fetch survives a
    /// re-fetched copy.
    fn merge(&mut self, incoming: Vec<Post>, append: bool) {
        let mut combined = if append {
            std::mem::take(&mut self.posts)
        } else {
            Vec::new()
        };
        combined.extend(incoming);

        let mut seen = HashSet::with_capacity(combined.len());
        combined.retain(|post| seen.insert(post.id.clone()));
        self.posts = combined;
    }

    /// Consecutive month runs over the accumulation, for rendering grouped
    /// feeds with a heading per month.
    pub fn month_groups(&self) -> Vec<MonthGroup> {
        let mut groups: Vec<MonthGroup> = Vec::new();
        for (index, post) in self.posts.iter().enumerate() {
            match groups.last_mut() {
                Some(group) if group.month == post.month => {
                    group.range.end = index + 1;
                }
                _ => groups.push(MonthGroup {
                    month: post.month.clone(),
                    range: index..index + 1,
                }),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Pagination, PostId, PostListing, PostsPayload};
    use anyhow::anyhow;
    use std::sync::Mutex;

    fn post(id: i64, title: &str) -> Post {
        Post {
            id: PostId::Int(id),
            title: title.to_string(),
            short_description: String::new(),
            description: String::new(),
            image_url: String::new(),
            create_date: String::new(),
            tags: String::new(),
            color: None,
            month: None,
        }
    }

    fn listing(posts: Vec<Post>, current: u32, last: u32) -> PostListing {
        PostListing {
            success: true,
            pagination: Some(Pagination {
                current_page: current,
                last_page: last,
            }),
            posts: PostsPayload::Flat(posts),
        }
    }

    /// Serves one scripted response per requested page number.
    struct ScriptedService {
        pages: Mutex<Vec<(u32, Result<PostListing>)>>,
    }

    impl ScriptedService {
        fn new(pages: Vec<(u32, Result<PostListing>)>) -> Self {
            Self {
                pages: Mutex::new(pages),
            }
        }
    }

    impl PostService for ScriptedService {
        fn list_posts(&self, query: &ListQuery) -> Result<PostListing> {
            let mut pages = self.pages.lock().unwrap();
            let position = pages
                .iter()
                .position(|(page, _)| *page == query.page)
                .unwrap_or_else(|| panic!("unexpected fetch for page {}", query.page));
            pages.remove(position).1
        }
    }

    fn near_bottom_trigger(feed: &mut FeedController, service: &dyn PostService) -> bool {
        feed.trigger_auto_load_if_eligible(service, 900, 100, 1200)
    }

    #[test]
    fn first_occurrence_wins_across_pages() {
        let service = ScriptedService::new(vec![
            (1, Ok(listing(vec![post(1, "पहला"), post(2, "दूसरा")], 1, 2))),
            (2, Ok(listing(vec![post(2, "बदला हुआ"), post(3, "तीसरा")], 2, 2))),
        ]);
        let mut feed = FeedController::new(FeedOptions::default());

        assert!(feed.load_page(&service, 1, false));
        assert!(feed.load_page(&service, 2, true));

        let ids: Vec<_> = feed.posts().iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(feed.posts()[1].title, "दूसरा");
    }

    #[test]
    fn replace_mode_dedupes_against_itself() {
        let service = ScriptedService::new(vec![(
            1,
            Ok(listing(vec![post(1, "a"), post(1, "b"), post(2, "c")], 1, 1)),
        )]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 1, false);
        assert_eq!(feed.posts().len(), 2);
        assert_eq!(feed.posts()[0].title, "a");
    }

    #[test]
    fn auto_load_stops_after_five_consecutive_fetches() {
        let mut pages = Vec::new();
        for page in 2..=7 {
            pages.push((
                page,
                Ok(listing(vec![post(page as i64 * 100, "p")], page, 10)),
            ));
        }
        let service = ScriptedService::new(pages);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.apply_seed(listing(vec![post(1, "seed")], 1, 10));

        for expected_page in 2..=6 {
            assert!(near_bottom_trigger(&mut feed, &service));
            assert_eq!(feed.current_page(), expected_page);
        }
        assert_eq!(feed.auto_load_count(), 5);
        assert!(!feed.auto_load_enabled());

        // Sixth scroll trigger performs no fetch.
        assert!(!near_bottom_trigger(&mut feed, &service));
        assert_eq!(feed.current_page(), 6);
    }

    #[test]
    fn manual_load_rearms_auto_load() {
        let service = ScriptedService::new(vec![
            (2, Ok(listing(vec![post(20, "p2")], 2, 10))),
            (3, Ok(listing(vec![post(30, "p3")], 3, 10))),
        ]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.apply_seed(listing(vec![post(1, "seed")], 1, 10));
        feed.auto_load_count = 5;
        feed.auto_load_enabled = false;

        assert!(feed.load_more_manually(&service));
        assert_eq!(feed.auto_load_count(), 0);
        assert!(feed.auto_load_enabled());

        // Auto-load works again after the manual reset.
        assert!(near_bottom_trigger(&mut feed, &service));
        assert_eq!(feed.current_page(), 3);
    }

    #[test]
    fn manual_load_noops_when_exhausted() {
        let service = ScriptedService::new(Vec::new());
        let mut feed = FeedController::new(FeedOptions::default());
        feed.apply_seed(listing(vec![post(1, "only")], 1, 1));
        assert!(!feed.load_more_manually(&service));
    }

    #[test]
    fn grouped_response_flattens_in_month_order() {
        let raw = r#"{
            "success": true,
            "data": {
                "pagination": {"current_page": 1, "last_page": 1},
                "posts": {
                    "जनवरी": [{"id": 1, "title": "p1"}, {"id": 2, "title": "p2"}],
                    "फ़रवरी": [{"id": 3, "title": "p3"}]
                }
            }
        }"#;
        #[derive(serde::Deserialize)]
        struct Raw {
            success: bool,
            data: RawData,
        }
        #[derive(serde::Deserialize)]
        struct RawData {
            pagination: Pagination,
            posts: PostsPayload,
        }
        let raw: Raw = serde_json::from_str(raw).unwrap();
        let listing = PostListing {
            success: raw.success,
            pagination: Some(raw.data.pagination),
            posts: raw.data.posts,
        };

        let mut feed = FeedController::new(FeedOptions::default());
        feed.apply_seed(listing);

        assert!(feed.grouped());
        let months: Vec<_> = feed
            .posts()
            .iter()
            .map(|p| p.month.clone().unwrap())
            .collect();
        assert_eq!(months, ["जनवरी", "जनवरी", "फ़रवरी"]);

        let groups = feed.month_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].month.as_deref(), Some("जनवरी"));
        assert_eq!(groups[0].range, 0..2);
        assert_eq!(groups[1].range, 2..3);
    }

    #[test]
    fn exhaustion_is_distinct_from_no_results() {
        let service = ScriptedService::new(vec![(
            3,
            Ok(listing(vec![post(1, "अंतिम")], 3, 3)),
        )]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 3, false);

        assert!(feed.is_exhausted());
        assert!(!feed.no_results());
        assert!(!feed.is_loading());
    }

    #[test]
    fn empty_first_page_reports_no_results_not_error() {
        let service = ScriptedService::new(vec![(
            1,
            Ok(PostListing {
                success: false,
                pagination: None,
                posts: PostsPayload::Flat(Vec::new()),
            }),
        )]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 1, false);

        assert!(feed.posts().is_empty());
        assert_eq!(feed.message(), Some(FeedMessage::NoResults));
        assert!(feed.no_results());
        assert!(!feed.is_exhausted());
    }

    #[test]
    fn transport_failure_keeps_accumulation_in_append_mode() {
        let service = ScriptedService::new(vec![
            (1, Ok(listing(vec![post(1, "रखा")], 1, 2))),
            (2, Err(anyhow!("timeout"))),
        ]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 1, false);
        feed.load_page(&service, 2, true);

        assert_eq!(feed.posts().len(), 1);
        assert_eq!(feed.message(), Some(FeedMessage::Error));
        assert!(!feed.is_loading());
    }

    #[test]
    fn transport_failure_clears_accumulation_in_replace_mode() {
        let service = ScriptedService::new(vec![
            (1, Ok(listing(vec![post(1, "रखा")], 1, 1))),
            (1, Err(anyhow!("timeout"))),
        ]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 1, false);
        feed.load_page(&service, 1, false);

        assert!(feed.posts().is_empty());
        assert_eq!(feed.message(), Some(FeedMessage::Error));
    }

    #[test]
    fn begin_carries_the_month_grouping_flag() {
        let mut feed = FeedController::new(FeedOptions {
            group_by_month: true,
            ..FeedOptions::default()
        });
        assert!(feed.begin(1, false).unwrap().group_by_month);

        let mut feed = FeedController::new(FeedOptions::default());
        assert!(!feed.begin(1, false).unwrap().group_by_month);
    }

    #[test]
    fn only_one_fetch_in_flight() {
        let mut feed = FeedController::new(FeedOptions::default());
        assert!(feed.begin(1, false).is_some());
        assert!(feed.begin(2, true).is_none());
        assert!(feed.begin_manual_load().is_none());
        assert!(feed.begin_auto_load(900, 100, 1200).is_none());

        feed.abort();
        assert!(!feed.is_loading());
        assert!(feed.begin(1, false).is_some());
    }

    #[test]
    fn far_from_bottom_is_not_eligible() {
        let mut feed = FeedController::new(FeedOptions::default());
        feed.apply_seed(listing(vec![post(1, "seed")], 1, 5));
        assert!(feed.begin_auto_load(0, 100, 5000).is_none());
        assert_eq!(feed.auto_load_count(), 0);
    }

    #[test]
    fn pagination_defaults_to_single_page_when_absent() {
        let service = ScriptedService::new(vec![(
            1,
            Ok(PostListing {
                success: true,
                pagination: None,
                posts: PostsPayload::Flat(vec![post(1, "p")]),
            }),
        )]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 1, false);
        assert_eq!(feed.current_page(), 1);
        assert_eq!(feed.last_page(), 1);
        assert!(feed.is_exhausted());
    }

    #[test]
    fn thirty_one_plus_thirty_one_with_five_duplicates() {
        let page1: Vec<Post> = (1..=31).map(|id| post(id, "p")).collect();
        // Five ids overlap with page one.
        let page2: Vec<Post> = (27..=57).map(|id| post(id, "p")).collect();
        let service = ScriptedService::new(vec![
            (1, Ok(listing(page1, 1, 2))),
            (2, Ok(listing(page2, 2, 2))),
        ]);
        let mut feed = FeedController::new(FeedOptions::default());
        feed.load_page(&service, 1, false);
        assert_eq!(feed.posts().len(), 31);

        assert!(near_bottom_trigger(&mut feed, &service));
        assert_eq!(feed.posts().len(), 57);
        assert_eq!(feed.current_page(), 2);
        assert!(feed.is_exhausted());
    }

    impl FeedController {
        /// Test helper: feed a listing through begin/apply as a replace
        /// fetch.
        fn apply_seed(&mut self, listing: PostListing) {
            let _ = self.begin(1, false);
            self.apply(Ok(listing));
        }
    }
}
