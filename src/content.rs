use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

pub const DEFAULT_PORTAL_BASE: &str = "https://www.prarang.in/api/v1/";
pub const DEFAULT_ANALYTICS_BASE: &str = "https://api.prarang.in/api/v1/";
pub const DEFAULT_LANGUAGE: &str = "hi";
pub const DEFAULT_PAGE_SIZE: u32 = 31;

#[derive(Debug, Error)]
pub enum Error {
    #[error("portal api: transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("portal api: unauthorized")]
    Unauthorized,
    #[error("portal api: rate limited: {0}")]
    RateLimited(String),
    #[error("portal api: status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("portal api: invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub portal_base: Option<String>,
    pub analytics_base: Option<String>,
    pub auth_token: String,
    pub auth_type: String,
    pub http_client: Option<HttpClient>,
}

/// Which of the two API hosts a request goes to. The portal host serves
/// content; the analytics host serves the city list and subscription capture
/// and expects the static auth headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Host {
    Portal,
    Analytics,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    portal_base: Url,
    analytics_base: Url,
    auth_token: String,
    auth_type: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let portal_base = Url::parse(
            config
                .portal_base
                .as_deref()
                .unwrap_or(DEFAULT_PORTAL_BASE),
        )?;
        let analytics_base = Url::parse(
            config
                .analytics_base
                .as_deref()
                .unwrap_or(DEFAULT_ANALYTICS_BASE),
        )?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(8))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            portal_base,
            analytics_base,
            auth_token: config.auth_token,
            auth_type: if config.auth_type.is_empty() {
                "WEB".to_string()
            } else {
                config.auth_type
            },
        })
    }

    pub fn list_posts(&self, query: &ListQuery) -> Result<PostListing> {
        let params = query.to_params();
        let resp = self.request(Host::Portal, Method::GET, "daily-posts/list", &params, None)?;
        let envelope: Envelope<ListData> = resp.json()?;
        let data = envelope.data.unwrap_or_default();
        Ok(PostListing {
            success: envelope.success,
            pagination: data.pagination,
            posts: data.posts,
        })
    }

    pub fn post(&self, language: &str, id: &PostId) -> Result<Option<Post>> {
        let params = vec![
            ("language".to_string(), language.to_string()),
            ("id".to_string(), id.to_string()),
        ];
        let resp = self.request(Host::Portal, Method::GET, "post", &params, None)?;
        let envelope: Envelope<Post> = resp.json()?;
        if !envelope.success {
            return Ok(None);
        }
        Ok(envelope.data)
    }

    pub fn portal(&self, slug: &str) -> Result<Option<Portal>> {
        let params = vec![("slug".to_string(), slug.to_string())];
        let resp = self.request(Host::Portal, Method::GET, "portal", &params, None)?;
        let envelope: Envelope<PortalData> = resp.json()?;
        Ok(envelope.data.and_then(|data| data.portal))
    }

    pub fn tags(&self, language: &str, location: &str) -> Result<TagCatalog> {
        let params = vec![
            ("language".to_string(), language.to_string()),
            ("location".to_string(), location.to_string()),
        ];
        let resp = self.request(Host::Portal, Method::GET, "tags", &params, None)?;
        let envelope: Envelope<TagCatalog> = resp.json()?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// Cities come back grouped by state id; callers flatten.
    pub fn cities(&self, locale: &str) -> Result<Map<String, Value>> {
        let params = vec![
            ("locale".to_string(), locale.to_string()),
            ("group".to_string(), "1".to_string()),
        ];
        let resp = self.request(Host::Analytics, Method::GET, "cities", &params, None)?;
        let envelope: Envelope<CityData> = resp.json()?;
        Ok(envelope.data.map(|data| data.cities).unwrap_or_default())
    }

    pub fn subscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        let body = serde_json::to_value(request).unwrap_or(Value::Null);
        self.request(Host::Analytics, Method::POST, "subscribe", &[], Some(body))?;
        Ok(())
    }

    fn request(
        &self,
        host: Host,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Response> {
        let base = match host {
            Host::Portal => &self.portal_base,
            Host::Analytics => &self.analytics_base,
        };
        let mut url = base.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        req = req.header(CONTENT_TYPE, "application/json");
        if host == Host::Analytics {
            req = req.headers(self.auth_headers());
        }
        if let Some(json) = body {
            req = req.json(&json);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                401 | 403 => Err(Error::Unauthorized),
                429 => Err(Error::RateLimited(body)),
                _ => Err(Error::Status {
                    status: status.as_u16(),
                    body,
                }),
            }
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.auth_token) {
            headers.insert("api-auth-token", value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.auth_type) {
            headers.insert("api-auth-type", value);
        }
        headers
    }
}

/// Query parameters for the content-listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub language: String,
    pub page: u32,
    pub per_page: u32,
    pub location: String,
    pub city: Option<String>,
    pub tag_id: Option<String>,
    pub group_by_month: bool,
}

impl ListQuery {
    fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("language".to_string(), self.language.clone()),
            ("page".to_string(), self.page.to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
            ("location".to_string(), self.location.clone()),
        ];
        if let Some(city) = &self.city {
            params.push(("city".to_string(), city.clone()));
        }
        if let Some(tag_id) = &self.tag_id {
            params.push(("tag_id".to_string(), tag_id.clone()));
        }
        if self.group_by_month {
            params.push(("group_by_month".to_string(), "1".to_string()));
        }
        params
    }
}

/// Post ids are opaque and arrive as either a JSON string or an integer,
/// stable across pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostId {
    Int(i64),
    Text(String),
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Int(id) => write!(f, "{}", id),
            PostId::Text(id) => f.write_str(id),
        }
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        PostId::Text(value.to_string())
    }
}

impl From<i64> for PostId {
    fn from(value: i64) -> Self {
        PostId::Int(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, rename = "createDate")]
    pub create_date: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub last_page: u32,
}

/// The listing endpoint returns posts in one of two shapes depending on
/// server-side grouping: a flat ordered array, or a map from month label to
/// array. The shape is decided per response, so it is decoded into a tagged
/// union at the boundary and consumed by a single `flatten` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PostsPayload {
    Flat(Vec<Post>),
    Grouped(Map<String, Value>),
    Other(Value),
}

impl Default for PostsPayload {
    fn default() -> Self {
        PostsPayload::Other(Value::Null)
    }
}

impl PostsPayload {
    /// Flattens either shape into one ordered sequence. Grouped entries keep
    /// the map's key order and every post is stamped with its month label.
    /// Non-array group values and unknown shapes yield no posts.
    pub fn flatten(self) -> FlatPosts {
        match self {
            PostsPayload::Flat(posts) => FlatPosts {
                grouped: false,
                posts,
            },
            PostsPayload::Grouped(groups) => {
                let mut posts = Vec::new();
                for (month, value) in groups {
                    let Ok(month_posts) = serde_json::from_value::<Vec<Post>>(value) else {
                        continue;
                    };
                    for mut post in month_posts {
                        post.month = Some(month.clone());
                        posts.push(post);
                    }
                }
                FlatPosts {
                    grouped: true,
                    posts,
                }
            }
            PostsPayload::Other(_) => FlatPosts {
                grouped: false,
                posts: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlatPosts {
    pub grouped: bool,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Default)]
pub struct PostListing {
    pub success: bool,
    pub pagination: Option<Pagination>,
    pub posts: PostsPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Portal {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub city_slogan: String,
    #[serde(default)]
    pub header_image: String,
    #[serde(default)]
    pub image_base: String,
    #[serde(default)]
    pub local_matrics: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TagCatalog {
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub tags: Map<String, Value>,
}

impl TagCatalog {
    /// Tag lists are keyed `tag_<category id>`; missing keys mean the
    /// category has no tags.
    pub fn tags_for(&self, category_id: &str) -> Vec<TagEntry> {
        let key = format!("tag_{}", category_id);
        self.tags
            .get(&key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Categories {
    #[serde(default)]
    pub maincategories: Map<String, Value>,
    #[serde(default)]
    pub subcategories: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Category {
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub parent_category: Option<String>,
}

impl Categories {
    pub fn main(&self) -> Vec<(String, Category)> {
        decode_categories(&self.maincategories)
    }

    pub fn sub(&self) -> Vec<(String, Category)> {
        decode_categories(&self.subcategories)
    }
}

fn decode_categories(raw: &Map<String, Value>) -> Vec<(String, Category)> {
    raw.iter()
        .filter_map(|(id, value)| {
            serde_json::from_value::<Category>(value.clone())
                .ok()
                .map(|category| (id.clone(), category))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TagEntry {
    #[serde(default, rename = "tagId")]
    pub tag_id: String,
    #[serde(default, rename = "tagName")]
    pub tag_name: String,
    #[serde(default, rename = "tagIcon")]
    pub tag_icon: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub name: String,
    pub mobile: String,
    pub city: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ListData {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    posts: PostsPayload,
}

#[derive(Debug, Clone, Deserialize)]
struct PortalData {
    #[serde(default)]
    portal: Option<Portal>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct CityData {
    #[serde(default)]
    cities: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_payload_decodes() {
        let raw = r#"[
            {"id": 1, "title": "पहला", "short_description": "<p>एक</p>"},
            {"id": "p-2", "title": "दूसरा"}
        ]"#;
        let payload: PostsPayload = serde_json::from_str(raw).unwrap();
        let flat = payload.flatten();
        assert!(!flat.grouped);
        assert_eq!(flat.posts.len(), 2);
        assert_eq!(flat.posts[0].id, PostId::Int(1));
        assert_eq!(flat.posts[1].id, PostId::from("p-2"));
        assert!(flat.posts.iter().all(|post| post.month.is_none()));
    }

    #[test]
    fn grouped_payload_keeps_key_order_and_stamps_months() {
        let raw = r#"{
            "जनवरी": [{"id": 1, "title": "a"}, {"id": 2, "title": "b"}],
            "फ़रवरी": [{"id": 3, "title": "c"}]
        }"#;
        let payload: PostsPayload = serde_json::from_str(raw).unwrap();
        let flat = payload.flatten();
        assert!(flat.grouped);
        let months: Vec<_> = flat
            .posts
            .iter()
            .map(|post| post.month.as_deref().unwrap())
            .collect();
        assert_eq!(months, ["जनवरी", "जनवरी", "फ़रवरी"]);
        let ids: Vec<_> = flat.posts.iter().map(|post| post.id.to_string()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn grouped_payload_skips_non_array_values() {
        let raw = r#"{"जनवरी": [{"id": 1, "title": "a"}], "meta": 42}"#;
        let payload: PostsPayload = serde_json::from_str(raw).unwrap();
        let flat = payload.flatten();
        assert_eq!(flat.posts.len(), 1);
    }

    #[test]
    fn unknown_payload_shape_is_empty() {
        let payload: PostsPayload = serde_json::from_str("\"nothing\"").unwrap();
        let flat = payload.flatten();
        assert!(!flat.grouped);
        assert!(flat.posts.is_empty());
    }

    #[test]
    fn listing_envelope_decodes() {
        let raw = r#"{
            "success": true,
            "data": {
                "pagination": {"current_page": 2, "last_page": 5},
                "posts": [{"id": 7, "title": "x", "createDate": "12 मार्च 2024"}]
            }
        }"#;
        let envelope: Envelope<ListData> = serde_json::from_str(raw).unwrap();
        assert!(envelope.success);
        let data = envelope.data.unwrap();
        let pagination = data.pagination.unwrap();
        assert_eq!(pagination.current_page, 2);
        assert_eq!(pagination.last_page, 5);
        let flat = data.posts.flatten();
        assert_eq!(flat.posts[0].create_date, "12 मार्च 2024");
    }

    #[test]
    fn envelope_decodes_payloads_without_default_impls() {
        let raw = r#"{"success": true, "data": {"id": 9, "title": "शीर्षक"}}"#;
        let envelope: Envelope<Post> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.unwrap().id, PostId::Int(9));

        let raw = r#"{"success": true, "data": {"portal": {"slug": "meerut"}}}"#;
        let envelope: Envelope<PortalData> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.unwrap().portal.unwrap().slug, "meerut");

        let envelope: Envelope<Post> = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(envelope.data.is_none());
    }

    #[test]
    fn post_id_display_is_wire_value() {
        assert_eq!(PostId::Int(42).to_string(), "42");
        assert_eq!(PostId::from("abc").to_string(), "abc");
    }
}
