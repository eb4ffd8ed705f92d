use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fragment;

pub const DEFAULT_FEED_URL: &str = "https://www.amarujala.com/rss/meerut.xml";
pub const MAX_ITEMS: usize = 30;
pub const TICK_INTERVAL: Duration = Duration::from_secs(3);

const FETCH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub description: String,
}

pub trait NewsService: Send + Sync {
    fn latest(&self) -> Result<Vec<NewsItem>>;
}

/// Pulls the local-news RSS feed and keeps the newest items.
pub struct RssNewsService {
    http: reqwest::blocking::Client,
    url: String,
    max_items: usize,
}

impl RssNewsService {
    pub fn new(user_agent: &str, url: String, max_items: usize) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("build news http client")?;
        Ok(Self {
            http,
            url,
            max_items,
        })
    }
}

impl NewsService for RssNewsService {
    fn latest(&self) -> Result<Vec<NewsItem>> {
        let body = self
            .http
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .context("fetch news feed")?;
        Ok(parse_feed(&body, self.max_items))
    }
}

#[derive(Default)]
pub struct MockNewsService;

impl NewsService for MockNewsService {
    fn latest(&self) -> Result<Vec<NewsItem>> {
        Ok(vec![NewsItem {
            title: "स्थानीय समाचार उपलब्ध नहीं हैं".to_string(),
            link: String::new(),
            description: "नेटवर्क उपलब्ध होने पर समाचार यहाँ दिखाई देंगे।".to_string(),
        }])
    }
}

static ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<item[\s>](.*?)</item>").expect("item regex"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("title regex"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<link>(.*?)</link>").expect("link regex"));
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<description>(.*?)</description>").expect("description regex"));

/// Extracts up to `max_items` entries from an RSS document. Items missing a
/// title are dropped; CDATA wrappers and embedded markup are stripped.
pub fn parse_feed(xml: &str, max_items: usize) -> Vec<NewsItem> {
    ITEM.captures_iter(xml)
        .filter_map(|item| {
            let body = item.get(1)?.as_str();
            let title = field(body, &TITLE)?;
            Some(NewsItem {
                title,
                link: field(body, &LINK).unwrap_or_default(),
                description: field(body, &DESCRIPTION).unwrap_or_default(),
            })
        })
        .take(max_items)
        .collect()
}

fn field(body: &str, pattern: &Regex) -> Option<String> {
    let raw = pattern.captures(body)?.get(1)?.as_str();
    let raw = raw
        .trim()
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .unwrap_or(raw);
    let text = fragment::plain_text(raw);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Vertical one-item-at-a-time ticker. Advances on a fixed interval, wraps
/// back to the top after the last item, and holds still while hovered.
pub struct Ticker {
    position: usize,
    len: usize,
    paused: bool,
    last_tick: Instant,
    interval: Duration,
}

impl Ticker {
    pub fn new(now: Instant) -> Self {
        Self {
            position: 0,
            len: 0,
            paused: false,
            last_tick: now,
            interval: TICK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        if self.position >= len {
            self.position = 0;
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        if self.len == 0 || self.paused {
            self.last_tick = now;
            return false;
        }
        if now.duration_since(self.last_tick) < self.interval {
            return false;
        }
        self.last_tick = now;
        self.position += 1;
        if self.position >= self.len {
            self.position = 0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>चैनल</title>
  <item>
    <title><![CDATA[मेरठ में नई परियोजना]]></title>
    <link>https://example.com/one</link>
    <description><![CDATA[<p>विवरण &amp; ब्यौरा</p>]]></description>
  </item>
  <item>
    <title>दूसरी ख़बर</title>
    <link>https://example.com/two</link>
  </item>
  <item>
    <description>शीर्षक नहीं है</description>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_items_with_cdata_and_markup() {
        let items = parse_feed(FEED, MAX_ITEMS);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "मेरठ में नई परियोजना");
        assert_eq!(items[0].link, "https://example.com/one");
        assert_eq!(items[0].description, "विवरण & ब्यौरा");
        assert_eq!(items[1].title, "दूसरी ख़बर");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn caps_the_item_count() {
        let many: String = (0..40)
            .map(|n| format!("<item><title>ख़बर {n}</title></item>"))
            .collect();
        assert_eq!(parse_feed(&many, MAX_ITEMS).len(), 30);
    }

    #[test]
    fn ticker_wraps_to_the_top() {
        let now = Instant::now();
        let mut ticker = Ticker::new(now).with_interval(Duration::from_secs(3));
        ticker.set_len(3);

        assert!(!ticker.tick(now + Duration::from_secs(1)));
        assert!(ticker.tick(now + Duration::from_secs(3)));
        assert!(ticker.tick(now + Duration::from_secs(6)));
        assert_eq!(ticker.position(), 2);
        assert!(ticker.tick(now + Duration::from_secs(9)));
        assert_eq!(ticker.position(), 0);
    }

    #[test]
    fn ticker_holds_while_paused() {
        let now = Instant::now();
        let mut ticker = Ticker::new(now).with_interval(Duration::from_secs(3));
        ticker.set_len(5);
        ticker.set_paused(true);

        assert!(!ticker.tick(now + Duration::from_secs(10)));
        assert_eq!(ticker.position(), 0);

        // Unpausing restarts the interval instead of firing immediately.
        ticker.set_paused(false);
        assert!(!ticker.tick(now + Duration::from_secs(11)));
        assert!(ticker.tick(now + Duration::from_secs(13)));
        assert_eq!(ticker.position(), 1);
    }
}
