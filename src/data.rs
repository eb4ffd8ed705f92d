use std::sync::Arc;

use anyhow::{Context, Result};

use crate::content::{
    self, ListQuery, Pagination, Portal, Post, PostId, PostListing, PostsPayload,
    SubscriptionRequest, TagCatalog,
};
use crate::subscribe::{self, City};

pub trait PostService: Send + Sync {
    fn list_posts(&self, query: &ListQuery) -> Result<PostListing>;
}

pub trait PostDetailService: Send + Sync {
    fn load_post(&self, language: &str, id: &PostId) -> Result<Option<Post>>;
}

pub trait PortalService: Send + Sync {
    fn load_portal(&self, slug: &str) -> Result<Option<Portal>>;
}

pub trait TagService: Send + Sync {
    fn load_tags(&self, language: &str, location: &str) -> Result<TagCatalog>;
}

pub trait CityService: Send + Sync {
    fn list_cities(&self, locale: &str) -> Result<Vec<City>>;
}

pub trait SubscriptionService: Send + Sync {
    fn subscribe(&self, request: &SubscriptionRequest) -> Result<()>;
}

pub struct PrarangPostService {
    client: Arc<content::Client>,
}

impl PrarangPostService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl PostService for PrarangPostService {
    fn list_posts(&self, query: &ListQuery) -> Result<PostListing> {
        self.client.list_posts(query).context("fetch post listing")
    }
}

pub struct PrarangPostDetailService {
    client: Arc<content::Client>,
}

impl PrarangPostDetailService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl PostDetailService for PrarangPostDetailService {
    fn load_post(&self, language: &str, id: &PostId) -> Result<Option<Post>> {
        self.client.post(language, id).context("fetch post")
    }
}

pub struct PrarangPortalService {
    client: Arc<content::Client>,
}

impl PrarangPortalService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl PortalService for PrarangPortalService {
    fn load_portal(&self, slug: &str) -> Result<Option<Portal>> {
        self.client.portal(slug).context("fetch portal")
    }
}

pub struct PrarangTagService {
    client: Arc<content::Client>,
}

impl PrarangTagService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl TagService for PrarangTagService {
    fn load_tags(&self, language: &str, location: &str) -> Result<TagCatalog> {
        self.client
            .tags(language, location)
            .context("fetch tag catalog")
    }
}

pub struct PrarangCityService {
    client: Arc<content::Client>,
}

impl PrarangCityService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl CityService for PrarangCityService {
    fn list_cities(&self, locale: &str) -> Result<Vec<City>> {
        let grouped = self.client.cities(locale).context("fetch city list")?;
        Ok(subscribe::flatten_cities(&grouped))
    }
}

pub struct PrarangSubscriptionService {
    client: Arc<content::Client>,
}

impl PrarangSubscriptionService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl SubscriptionService for PrarangSubscriptionService {
    fn subscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        self.client.subscribe(request).context("submit subscription")
    }
}

#[derive(Default)]
pub struct MockPostService;

impl PostService for MockPostService {
    fn list_posts(&self, _query: &ListQuery) -> Result<PostListing> {
        Ok(PostListing {
            success: true,
            pagination: Some(Pagination {
                current_page: 1,
                last_page: 1,
            }),
            posts: PostsPayload::Flat(vec![mock_post(
                1,
                "प्रारंग में आपका स्वागत है",
                "<p>नेटवर्क उपलब्ध न होने पर यह नमूना पोस्ट दिखाई देती है।</p>",
            )]),
        })
    }
}

#[derive(Default)]
pub struct MockPostDetailService;

impl PostDetailService for MockPostDetailService {
    fn load_post(&self, _language: &str, id: &PostId) -> Result<Option<Post>> {
        Ok(Some(mock_post(
            match id {
                PostId::Int(value) => *value,
                PostId::Text(_) => 0,
            },
            "नमूना पोस्ट",
            "<p>ऑफ़लाइन मोड में पोस्ट का पूरा विवरण उपलब्ध नहीं है।</p>",
        )))
    }
}

#[derive(Default)]
pub struct MockPortalService;

impl PortalService for MockPortalService {
    fn load_portal(&self, slug: &str) -> Result<Option<Portal>> {
        Ok(Some(Portal {
            slug: slug.to_string(),
            city_slogan: "ज्ञान के रंग".to_string(),
            ..Portal::default()
        }))
    }
}

#[derive(Default)]
pub struct MockTagService;

impl TagService for MockTagService {
    fn load_tags(&self, _language: &str, _location: &str) -> Result<TagCatalog> {
        Ok(TagCatalog::default())
    }
}

#[derive(Default)]
pub struct MockCityService;

impl CityService for MockCityService {
    fn list_cities(&self, _locale: &str) -> Result<Vec<City>> {
        Ok(vec![City {
            id: "c2".to_string(),
            name: "मेरठ".to_string(),
            english_name: "Meerut".to_string(),
            state: "उत्तर प्रदेश".to_string(),
            slug: "meerut".to_string(),
        }])
    }
}

#[derive(Default)]
pub struct MockSubscriptionService;

impl SubscriptionService for MockSubscriptionService {
    fn subscribe(&self, _request: &SubscriptionRequest) -> Result<()> {
        Ok(())
    }
}

fn mock_post(id: i64, title: &str, body: &str) -> Post {
    Post {
        id: PostId::Int(id),
        title: title.to_string(),
        short_description: body.to_string(),
        description: body.to_string(),
        image_url: String::new(),
        create_date: String::new(),
        tags: "पोस्ट".to_string(),
        color: None,
        month: None,
    }
}
