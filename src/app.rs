use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::content;
use crate::data::{
    self, CityService, PortalService, PostDetailService, PostService, SubscriptionService,
    TagService,
};
use crate::feed::{FeedFilters, FeedOptions};
use crate::news::{self, NewsService};
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let user_agent = if !cfg.portal.user_agent.trim().is_empty() {
        cfg.portal.user_agent.clone()
    } else {
        format!("prarang-tui/{}", crate::VERSION)
    };

    let post_service: Option<Arc<dyn PostService>>;
    let detail_service: Option<Arc<dyn PostDetailService>>;
    let portal_service: Option<Arc<dyn PortalService>>;
    let tag_service: Option<Arc<dyn TagService>>;
    let city_service: Option<Arc<dyn CityService>>;
    let subscription_service: Option<Arc<dyn SubscriptionService>>;

    let status: String;
    match content::Client::new(content::ClientConfig {
        user_agent: user_agent.clone(),
        portal_base: Some(cfg.portal.portal_base.clone()),
        analytics_base: Some(cfg.portal.analytics_base.clone()),
        auth_token: cfg.portal.auth_token.clone(),
        auth_type: cfg.portal.auth_type.clone(),
        http_client: None,
    }) {
        Ok(client) => {
            let client = Arc::new(client);
            post_service = Some(Arc::new(data::PrarangPostService::new(client.clone())));
            detail_service = Some(Arc::new(data::PrarangPostDetailService::new(
                client.clone(),
            )));
            portal_service = Some(Arc::new(data::PrarangPortalService::new(client.clone())));
            tag_service = Some(Arc::new(data::PrarangTagService::new(client.clone())));
            city_service = Some(Arc::new(data::PrarangCityService::new(client.clone())));
            subscription_service = Some(Arc::new(data::PrarangSubscriptionService::new(client)));
            status = "पोस्ट लोड हो रही हैं…".to_string();
        }
        Err(_) => {
            post_service = Some(Arc::new(data::MockPostService));
            detail_service = Some(Arc::new(data::MockPostDetailService));
            portal_service = Some(Arc::new(data::MockPortalService));
            tag_service = Some(Arc::new(data::MockTagService));
            city_service = Some(Arc::new(data::MockCityService));
            subscription_service = Some(Arc::new(data::MockSubscriptionService));
            status = "पोर्टल से संपर्क नहीं हो सका। नमूना सामग्री दिखाई जा रही है।".to_string();
        }
    }

    let news_service: Option<Arc<dyn NewsService>> = match news::RssNewsService::new(
        &user_agent,
        cfg.news.feed_url.clone(),
        cfg.news.max_items,
    ) {
        Ok(service) => Some(Arc::new(service)),
        Err(_) => Some(Arc::new(news::MockNewsService)),
    };

    let feed_options = FeedOptions {
        language: cfg.portal.language.clone(),
        location: cfg.portal.location.clone(),
        per_page: cfg.portal.page_size,
        filters: FeedFilters::default(),
        group_by_month: false,
    };

    let options = ui::Options {
        status_message: status,
        feed_options,
        language: cfg.portal.language.clone(),
        portal_slug: cfg.portal.city_slug.clone(),
        theme: cfg.ui.theme.clone(),
        autoplay_delay: cfg.carousel.autoplay_delay,
        news_interval: cfg.news.tick_interval,
        post_service,
        detail_service,
        portal_service,
        tag_service,
        city_service,
        subscription_service,
        news_service,
    };

    let mut model = ui::Model::new(options);
    model.run()
}
