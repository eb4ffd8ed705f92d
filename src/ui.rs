use std::cell::Cell;
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseEvent,
    MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::carousel::Carousel;
use crate::content::{ListQuery, Portal, Post, PostId, PostListing, TagEntry};
use crate::data::{
    CityService, PortalService, PostDetailService, PostService, SubscriptionService, TagService,
};
use crate::feed::{self, FeedController, FeedOptions};
use crate::fragment;
use crate::news::{NewsItem, NewsService, Ticker};
use crate::subscribe::{self, City, Field, SubscriptionForm};

/// Colour set picked by the `ui.theme` config value.
#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_focused_bg: Color,
    panel_selected_bg: Color,
    border_idle: Color,
    border_focused: Color,
    text_primary: Color,
    text_secondary: Color,
    accent: Color,
    error: Color,
}

const DARK_PALETTE: Palette = Palette {
    bg: Color::Rgb(30, 30, 46),
    panel_bg: Color::Rgb(24, 24, 36),
    panel_focused_bg: Color::Rgb(49, 50, 68),
    panel_selected_bg: Color::Rgb(69, 71, 90),
    border_idle: Color::Rgb(49, 50, 68),
    border_focused: Color::Rgb(137, 180, 250),
    text_primary: Color::Rgb(205, 214, 244),
    text_secondary: Color::Rgb(166, 173, 200),
    accent: Color::Rgb(137, 180, 250),
    error: Color::Rgb(243, 139, 168),
};

const LIGHT_PALETTE: Palette = Palette {
    bg: Color::Rgb(239, 241, 245),
    panel_bg: Color::Rgb(230, 233, 239),
    panel_focused_bg: Color::Rgb(220, 224, 232),
    panel_selected_bg: Color::Rgb(204, 208, 218),
    border_idle: Color::Rgb(172, 176, 190),
    border_focused: Color::Rgb(30, 102, 245),
    text_primary: Color::Rgb(76, 79, 105),
    text_secondary: Color::Rgb(108, 111, 133),
    accent: Color::Rgb(30, 102, 245),
    error: Color::Rgb(210, 15, 57),
};

impl Palette {
    /// Unknown names fall back to the dark palette.
    fn named(theme: &str) -> Self {
        match theme {
            "light" => LIGHT_PALETTE,
            _ => DARK_PALETTE,
        }
    }
}

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const PORTAL_WEB_BASE: &str = "https://www.prarang.in";

/// Layout units per terminal row when translating the list position into the
/// scroll geometry the feed controller's bottom-proximity check expects.
const ROW_UNITS: u32 = 24;

/// Rows each post occupies in the list (title plus preview).
const POST_ROW_HEIGHT: usize = 2;

const CAROUSEL_ITEMS: usize = 10;

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Tags,
    Posts,
    Content,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Tags => Pane::Posts,
            Pane::Posts => Pane::Content,
            Pane::Content => Pane::Tags,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Pane::Tags => "विषय",
            Pane::Posts => "पोस्ट",
            Pane::Content => "विवरण",
        }
    }
}

/// One rendered row of the post list: either a month heading over a grouped
/// feed or the first row of a post entry.
#[derive(Clone, PartialEq, Eq)]
enum ListRow {
    Heading(String),
    Post(usize),
}

struct PendingPosts {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

struct PendingDetail {
    request_id: u64,
    id: PostId,
    cancel_flag: Arc<AtomicBool>,
}

enum AsyncResponse {
    Posts {
        request_id: u64,
        result: Result<PostListing>,
    },
    Detail {
        request_id: u64,
        id: PostId,
        result: Result<Option<Post>>,
    },
    Portal {
        result: Result<Option<Portal>>,
    },
    Tags {
        result: Result<Vec<TagEntry>>,
    },
    Cities {
        result: Result<Vec<City>>,
    },
    Subscribed {
        result: Result<()>,
    },
    News {
        result: Result<Vec<NewsItem>>,
    },
}

pub struct Options {
    pub status_message: String,
    pub feed_options: FeedOptions,
    pub language: String,
    pub portal_slug: String,
    pub theme: String,
    pub autoplay_delay: Duration,
    pub news_interval: Duration,
    pub post_service: Option<Arc<dyn PostService>>,
    pub detail_service: Option<Arc<dyn PostDetailService>>,
    pub portal_service: Option<Arc<dyn PortalService>>,
    pub tag_service: Option<Arc<dyn TagService>>,
    pub city_service: Option<Arc<dyn CityService>>,
    pub subscription_service: Option<Arc<dyn SubscriptionService>>,
    pub news_service: Option<Arc<dyn NewsService>>,
}

pub struct Model {
    status_message: String,
    language: String,
    portal_slug: String,
    palette: Palette,
    feed_options: FeedOptions,
    feed: FeedController,
    selected_post: usize,
    post_offset: Cell<usize>,
    post_view_height: Cell<u16>,
    content: Text<'static>,
    content_scroll: u16,
    renderer: fragment::Renderer,
    portal: Option<Portal>,
    tags: Vec<TagEntry>,
    tag_index: usize,
    active_tag: Option<String>,
    carousel: Carousel,
    news_items: Vec<NewsItem>,
    ticker: Ticker,
    news_paused: bool,
    cities: Vec<City>,
    form: SubscriptionForm,
    form_visible: bool,
    form_focus: Field,
    form_submitting: bool,
    city_query: String,
    city_index: usize,
    focused_pane: Pane,
    spinner: Spinner,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    pending_posts: Option<PendingPosts>,
    pending_detail: Option<PendingDetail>,
    post_service: Option<Arc<dyn PostService>>,
    detail_service: Option<Arc<dyn PostDetailService>>,
    portal_service: Option<Arc<dyn PortalService>>,
    tag_service: Option<Arc<dyn TagService>>,
    city_service: Option<Arc<dyn CityService>>,
    subscription_service: Option<Arc<dyn SubscriptionService>>,
    news_service: Option<Arc<dyn NewsService>>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let now = Instant::now();
        Self {
            status_message: options.status_message,
            language: options.language,
            portal_slug: options.portal_slug,
            palette: Palette::named(&options.theme),
            feed: FeedController::new(options.feed_options.clone()),
            feed_options: options.feed_options,
            selected_post: 0,
            post_offset: Cell::new(0),
            post_view_height: Cell::new(0),
            content: Text::default(),
            content_scroll: 0,
            renderer: fragment::Renderer::new(),
            portal: None,
            tags: Vec::new(),
            tag_index: 0,
            active_tag: None,
            carousel: Carousel::new(now).with_autoplay_delay(options.autoplay_delay),
            news_items: Vec::new(),
            ticker: Ticker::new(now).with_interval(options.news_interval),
            news_paused: false,
            cities: Vec::new(),
            form: SubscriptionForm::new(),
            form_visible: false,
            form_focus: Field::Name,
            form_submitting: false,
            city_query: String::new(),
            city_index: 0,
            focused_pane: Pane::Posts,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
            next_request_id: 0,
            pending_posts: None,
            pending_detail: None,
            post_service: options.post_service,
            detail_service: options.detail_service,
            portal_service: options.portal_service,
            tag_service: options.tag_service,
            city_service: options.city_service,
            subscription_service: options.subscription_service,
            news_service: options.news_service,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.start_initial_fetches();
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("त्रुटि: {err}");
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                let now = Instant::now();
                let mut ticked = false;
                if self.is_loading() && self.spinner.advance() {
                    ticked = true;
                } else if !self.is_loading() {
                    self.spinner.reset();
                }
                if self.carousel.tick(now) {
                    ticked = true;
                }
                self.ticker.set_paused(self.news_paused);
                if self.ticker.tick(now) {
                    ticked = true;
                }
                if ticked {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.pending_posts.is_some() || self.pending_detail.is_some() || self.form_submitting
    }

    fn start_initial_fetches(&mut self) {
        if let Some(query) = self.feed.begin(1, false) {
            self.spawn_posts(query);
        }
        self.spawn_portal();
        self.spawn_tags();
        self.spawn_cities();
        self.spawn_news();
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn spawn_posts(&mut self, query: ListQuery) {
        let Some(service) = self.post_service.clone() else {
            self.feed.abort();
            return;
        };
        if let Some(pending) = self.pending_posts.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        let request_id = self.take_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_posts = Some(PendingPosts {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.spinner.reset();
        self.status_message = format!("पृष्ठ {} लोड हो रहा है…", query.page);

        let tx = self.response_tx.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.list_posts(&query);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Posts { request_id, result });
        });
    }

    fn spawn_detail(&mut self, id: PostId) {
        let Some(service) = self.detail_service.clone() else {
            return;
        };
        if let Some(pending) = self.pending_detail.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        let request_id = self.take_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_detail = Some(PendingDetail {
            request_id,
            id: id.clone(),
            cancel_flag: cancel_flag.clone(),
        });

        let tx = self.response_tx.clone();
        let language = self.language.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.load_post(&language, &id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Detail {
                request_id,
                id,
                result,
            });
        });
    }

    fn spawn_portal(&mut self) {
        let Some(service) = self.portal_service.clone() else {
            return;
        };
        let tx = self.response_tx.clone();
        let slug = self.portal_slug.clone();
        thread::spawn(move || {
            let result = service.load_portal(&slug);
            let _ = tx.send(AsyncResponse::Portal { result });
        });
    }

    fn spawn_tags(&mut self) {
        let Some(service) = self.tag_service.clone() else {
            return;
        };
        let tx = self.response_tx.clone();
        let language = self.language.clone();
        let location = self.feed_options.location.clone();
        thread::spawn(move || {
            let result = service
                .load_tags(&language, &location)
                .map(|catalog| catalog.tags_for(&location));
            let _ = tx.send(AsyncResponse::Tags { result });
        });
    }

    fn spawn_cities(&mut self) {
        let Some(service) = self.city_service.clone() else {
            return;
        };
        let tx = self.response_tx.clone();
        let language = self.language.clone();
        thread::spawn(move || {
            let result = service.list_cities(&language);
            let _ = tx.send(AsyncResponse::Cities { result });
        });
    }

    fn spawn_news(&mut self) {
        let Some(service) = self.news_service.clone() else {
            return;
        };
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.latest();
            let _ = tx.send(AsyncResponse::News { result });
        });
    }

    fn spawn_subscription(&mut self) {
        let Some(request) = self.form.request() else {
            return;
        };
        let Some(service) = self.subscription_service.clone() else {
            return;
        };
        self.form_submitting = true;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.subscribe(&request);
            let _ = tx.send(AsyncResponse::Subscribed { result });
        });
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Posts { request_id, result } => {
                let Some(pending) = &self.pending_posts else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst) || pending.request_id != request_id {
                    return;
                }
                self.pending_posts = None;
                self.feed.apply(result);
                self.after_feed_change();
            }
            AsyncResponse::Detail {
                request_id,
                id,
                result,
            } => {
                let Some(pending) = &self.pending_detail else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst)
                    || pending.request_id != request_id
                    || pending.id != id
                {
                    return;
                }
                self.pending_detail = None;
                match result {
                    Ok(Some(post)) => {
                        let selected = self
                            .feed
                            .posts()
                            .get(self.selected_post)
                            .is_some_and(|current| current.id == post.id);
                        if selected {
                            self.content = self.renderer.render(&post.description);
                            self.content_scroll = 0;
                        }
                    }
                    Ok(None) => {
                        self.status_message = "पोस्ट उपलब्ध नहीं है।".to_string();
                    }
                    Err(_) => {
                        self.status_message = feed::MSG_FETCH_ERROR.to_string();
                    }
                }
            }
            AsyncResponse::Portal { result } => {
                if let Ok(portal) = result {
                    self.portal = portal;
                }
            }
            AsyncResponse::Tags { result } => {
                if let Ok(tags) = result {
                    self.tags = tags;
                    self.tag_index = 0;
                }
            }
            AsyncResponse::Cities { result } => {
                if let Ok(cities) = result {
                    self.cities = cities;
                    if self.form.city.is_none() {
                        if let Some(city) = subscribe::default_city(&self.cities, &self.portal_slug)
                        {
                            self.form.select_city(city.clone());
                            self.city_query = city.name.clone();
                        }
                    }
                }
            }
            AsyncResponse::Subscribed { result } => {
                self.form_submitting = false;
                match result {
                    Ok(()) => {
                        self.status_message =
                            "🎉 सदस्यता सफल रही। आपको जल्द ही अपडेट मिलेंगे।".to_string();
                        self.form.reset();
                        self.city_query.clear();
                        self.form_visible = false;
                    }
                    Err(_) => {
                        self.status_message =
                            "सब्सक्रिप्शन में त्रुटि हुई। कृपया पुनः प्रयास करें।".to_string();
                    }
                }
            }
            AsyncResponse::News { result } => {
                if let Ok(items) = result {
                    self.news_items = items;
                    self.ticker.set_len(self.news_items.len());
                }
            }
        }
    }

    /// Refreshes selection, carousel and status after the feed controller
    /// absorbed a fetch outcome.
    fn after_feed_change(&mut self) {
        let len = self.feed.posts().len();
        if len == 0 {
            self.selected_post = 0;
            self.content = Text::default();
        } else if self.selected_post >= len {
            self.selected_post = len - 1;
        }
        self.carousel.set_len(len.min(CAROUSEL_ITEMS));
        self.sync_content_from_selection();

        self.status_message = if let Some(message) = self.feed.message() {
            message.text().to_string()
        } else if self.feed.is_exhausted() {
            feed::MSG_ALL_SEEN.to_string()
        } else {
            format!(
                "पृष्ठ {} / {} ({} पोस्ट)",
                self.feed.current_page(),
                self.feed.last_page(),
                len
            )
        };
    }

    fn sync_content_from_selection(&mut self) {
        let Some(post) = self.feed.posts().get(self.selected_post) else {
            return;
        };
        let body = if post.description.is_empty() {
            &post.short_description
        } else {
            &post.description
        };
        let mut text = Text::default();
        text.lines.push(Line::from(Span::styled(
            post.title.clone(),
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD),
        )));
        if !post.create_date.is_empty() {
            text.lines.push(Line::from(Span::styled(
                post.create_date.clone(),
                Style::default().fg(self.palette.text_secondary),
            )));
        }
        text.lines.push(Line::default());
        text.lines.extend(self.renderer.render(body).lines);
        self.content = text;
        self.content_scroll = 0;

        if post.description.is_empty() {
            self.spawn_detail(post.id.clone());
        }
    }

    /// Rows of the post list in draw order, with a heading before each month
    /// run when the server grouped the payload.
    fn list_rows(&self) -> Vec<ListRow> {
        let mut rows = Vec::new();
        if self.feed.grouped() {
            for group in self.feed.month_groups() {
                if let Some(month) = &group.month {
                    rows.push(ListRow::Heading(month.clone()));
                }
                for index in group.range {
                    rows.push(ListRow::Post(index));
                }
            }
        } else {
            for index in 0..self.feed.posts().len() {
                rows.push(ListRow::Post(index));
            }
        }
        rows
    }

    fn selected_row(&self, rows: &[ListRow]) -> usize {
        rows.iter()
            .position(|row| *row == ListRow::Post(self.selected_post))
            .unwrap_or(0)
    }

    /// Scroll geometry in layout units for the auto-load eligibility check.
    fn feed_geometry(&self) -> (u32, u32, u32) {
        let rows = self.list_rows();
        let mut total_rows = 0usize;
        for row in &rows {
            total_rows += match row {
                ListRow::Heading(_) => 1,
                ListRow::Post(_) => POST_ROW_HEIGHT,
            };
        }
        let scroll = self.post_offset.get() as u32 * ROW_UNITS;
        let viewport = u32::from(self.post_view_height.get()) * ROW_UNITS;
        let document = total_rows as u32 * ROW_UNITS;
        (scroll, viewport, document)
    }

    fn maybe_auto_load(&mut self) {
        let (scroll, viewport, document) = self.feed_geometry();
        if let Some(query) = self.feed.begin_auto_load(scroll, viewport, document) {
            self.spawn_posts(query);
        }
    }

    fn load_more(&mut self) {
        if let Some(query) = self.feed.begin_manual_load() {
            self.spawn_posts(query);
        } else if self.feed.is_exhausted() {
            self.status_message = feed::MSG_ALL_SEEN.to_string();
        }
    }

    fn refresh_feed(&mut self) {
        if let Some(pending) = self.pending_posts.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
            self.feed.abort();
        }
        let mut options = self.feed_options.clone();
        options.filters.tag_id = self.active_tag.clone();
        self.feed = FeedController::new(options);
        self.selected_post = 0;
        self.post_offset.set(0);
        if let Some(query) = self.feed.begin(1, false) {
            self.spawn_posts(query);
        }
    }

    fn select_tag(&mut self) {
        // Entry zero is the unfiltered feed.
        let tag = if self.tag_index == 0 {
            None
        } else {
            self.tags
                .get(self.tag_index - 1)
                .map(|tag| tag.tag_id.clone())
        };
        if tag == self.active_tag {
            return;
        }
        self.active_tag = tag;
        self.refresh_feed();
    }

    fn open_permalink(&mut self) -> Result<()> {
        let Some(post) = self.feed.posts().get(self.selected_post) else {
            return Ok(());
        };
        let slug = post.title.split_whitespace().collect::<Vec<_>>().join("-");
        let encoded = utf8_percent_encode(&slug, NON_ALPHANUMERIC);
        let url = format!("{PORTAL_WEB_BASE}/posts/{}/{encoded}", post.id);
        webbrowser::open(&url)?;
        self.status_message = "ब्राउज़र में खोला गया।".to_string();
        Ok(())
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.feed.posts().len();
        if len == 0 {
            return;
        }
        let current = self.selected_post as i64;
        self.selected_post = (current + delta).clamp(0, len as i64 - 1) as usize;
        self.ensure_selection_visible();
        self.sync_content_from_selection();
        self.maybe_auto_load();
    }

    fn ensure_selection_visible(&self) {
        let rows = self.list_rows();
        let selected = self.selected_row(&rows);
        let view = usize::from(self.post_view_height.get()).max(1) / POST_ROW_HEIGHT;
        let view = view.max(1);
        let offset = self.post_offset.get();
        if selected < offset {
            self.post_offset.set(selected);
        } else if selected >= offset + view {
            self.post_offset.set(selected + 1 - view);
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollDown => {
                if self.focused_pane == Pane::Posts {
                    self.move_selection(1);
                } else if self.focused_pane == Pane::Content {
                    self.content_scroll = self.content_scroll.saturating_add(1);
                }
                self.mark_dirty();
            }
            MouseEventKind::ScrollUp => {
                if self.focused_pane == Pane::Posts {
                    self.move_selection(-1);
                } else if self.focused_pane == Pane::Content {
                    self.content_scroll = self.content_scroll.saturating_sub(1);
                }
                self.mark_dirty();
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.form_visible {
            self.handle_form_key(code);
            self.mark_dirty();
            return Ok(false);
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Char('j') | KeyCode::Down => match self.focused_pane {
                Pane::Posts => self.move_selection(1),
                Pane::Tags => {
                    if self.tag_index + 1 <= self.tags.len() {
                        self.tag_index += 1;
                    }
                }
                Pane::Content => {
                    self.content_scroll = self.content_scroll.saturating_add(1);
                }
            },
            KeyCode::Char('k') | KeyCode::Up => match self.focused_pane {
                Pane::Posts => self.move_selection(-1),
                Pane::Tags => {
                    self.tag_index = self.tag_index.saturating_sub(1);
                }
                Pane::Content => {
                    self.content_scroll = self.content_scroll.saturating_sub(1);
                }
            },
            KeyCode::Char('g') => {
                if self.focused_pane == Pane::Posts {
                    self.selected_post = 0;
                    self.post_offset.set(0);
                    self.sync_content_from_selection();
                }
            }
            KeyCode::Char('G') => {
                if self.focused_pane == Pane::Posts {
                    let len = self.feed.posts().len();
                    if len > 0 {
                        self.selected_post = len - 1;
                        self.ensure_selection_visible();
                        self.sync_content_from_selection();
                        self.maybe_auto_load();
                    }
                }
            }
            KeyCode::Enter => {
                if self.focused_pane == Pane::Tags {
                    self.select_tag();
                }
            }
            KeyCode::Char('m') => self.load_more(),
            KeyCode::Char('r') => self.refresh_feed(),
            KeyCode::Char('o') => self.open_permalink()?,
            KeyCode::Char('s') => {
                self.form_visible = true;
                self.form_focus = Field::Name;
            }
            KeyCode::Char('p') => {
                self.news_paused = !self.news_paused;
            }
            KeyCode::Char(ch @ '1'..='9') => {
                self.carousel.go_to(ch as usize - '1' as usize, Instant::now());
            }
            KeyCode::Char('h') | KeyCode::Left => {
                self.carousel.retreat(Instant::now());
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.carousel.advance(Instant::now());
            }
            _ => return Ok(false),
        }

        self.mark_dirty();
        Ok(false)
    }

    fn handle_form_key(&mut self, code: KeyCode) {
        if self.form_submitting {
            return;
        }
        match code {
            KeyCode::Esc => {
                self.form_visible = false;
            }
            KeyCode::Tab => {
                self.form_focus = match self.form_focus {
                    Field::Name => Field::Mobile,
                    Field::Mobile => Field::City,
                    Field::City => Field::Name,
                };
            }
            KeyCode::Char(ch) => match self.form_focus {
                Field::Name => self.form.push_name_char(ch),
                Field::Mobile => self.form.push_mobile_char(ch),
                Field::City => {
                    self.city_query.push(ch);
                    self.city_index = 0;
                }
            },
            KeyCode::Backspace => match self.form_focus {
                Field::Name => self.form.pop_name_char(),
                Field::Mobile => self.form.pop_mobile_char(),
                Field::City => {
                    self.city_query.pop();
                    self.city_index = 0;
                }
            },
            KeyCode::Down => {
                if self.form_focus == Field::City {
                    let matches = subscribe::filter_cities(&self.cities, &self.city_query).len();
                    if matches > 0 && self.city_index + 1 < matches {
                        self.city_index += 1;
                    }
                }
            }
            KeyCode::Up => {
                if self.form_focus == Field::City {
                    self.city_index = self.city_index.saturating_sub(1);
                }
            }
            KeyCode::Enter => {
                if self.form_focus == Field::City {
                    let matches = subscribe::filter_cities(&self.cities, &self.city_query);
                    if let Some(city) = matches.get(self.city_index) {
                        let city = (*city).clone();
                        self.city_query = city.name.clone();
                        self.form.select_city(city);
                        self.form_focus = Field::Name;
                    }
                } else if self.form.validate() {
                    self.spawn_subscription();
                }
            }
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(self.palette.bg)), full);
        self.carousel.set_viewport_width(full.width);

        let show_carousel = !self.carousel.is_empty() && full.height >= 16;
        let constraints = if show_carousel {
            vec![
                Constraint::Length(1),
                Constraint::Length(4),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
        } else {
            vec![
                Constraint::Length(1),
                Constraint::Length(0),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
        };
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(full);

        let status_text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(self.palette.text_primary)
                .bg(self.palette.panel_focused_bg)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        if show_carousel {
            self.draw_carousel(frame, layout[1]);
        }

        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(24),
                Constraint::Percentage(42),
                Constraint::Min(0),
            ])
            .split(layout[2]);
        self.draw_tags(frame, main_chunks[0]);
        self.draw_posts(frame, main_chunks[1]);
        self.draw_content(frame, main_chunks[2]);

        self.draw_news(frame, layout[3]);

        let footer = Paragraph::new(
            "q छोड़ें · Tab पैन बदलें · j/k चुनें · m और लोड करें · r ताज़ा करें · o ब्राउज़र · s सदस्यता",
        )
        .style(
            Style::default()
                .fg(self.palette.text_secondary)
                .bg(self.palette.panel_bg)
                .add_modifier(Modifier::ITALIC),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[4]);

        if self.form_visible {
            self.draw_form(frame, layout[2]);
        }
    }

    fn pane_block(&self, pane: Pane) -> Block<'static> {
        let focused = self.focused_pane == pane;
        Block::default()
            .title(pane.title())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused {
                self.palette.border_focused
            } else {
                self.palette.border_idle
            }))
            .style(Style::default().bg(self.palette.panel_bg))
    }

    fn draw_carousel(&self, frame: &mut Frame<'_>, area: Rect) {
        let posts = self.feed.posts();
        let visible = self.carousel.visible();
        if visible.is_empty() || area.width < 10 {
            return;
        }
        let card_width = (area.width / visible.len() as u16).max(1);
        let mut spans = Vec::new();
        for (slot, index) in visible.iter().enumerate() {
            let Some(post) = posts.get(*index) else {
                continue;
            };
            let width = usize::from(card_width).saturating_sub(3).max(4);
            let title = truncate_to_width(&post.title, width);
            let style = if slot == 0 {
                Style::default()
                    .fg(self.palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.palette.text_primary)
            };
            spans.push(Span::styled(format!(" {title} "), style));
            spans.push(Span::styled("│", Style::default().fg(self.palette.border_idle)));
        }

        let mut dots = String::new();
        for dot in 0..self.carousel.len() {
            dots.push(if dot == self.carousel.active_dot() {
                '●'
            } else {
                '○'
            });
            dots.push(' ');
        }

        let text = Text::from(vec![
            Line::from(spans),
            Line::from(Span::styled(
                dots,
                Style::default().fg(self.palette.text_secondary),
            ))
            .alignment(Alignment::Center),
        ]);
        let strip = Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.palette.border_idle))
                .title("हाल की पोस्ट"),
        );
        frame.render_widget(strip, area);
    }

    fn draw_tags(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(Pane::Tags);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut lines = Vec::new();
        let mut entries: Vec<(String, bool)> = vec![("सभी पोस्ट".to_string(), self.active_tag.is_none())];
        for tag in &self.tags {
            let selected = self
                .active_tag
                .as_deref()
                .is_some_and(|active| active == tag.tag_id);
            let label = if tag.count > 0 {
                format!("{} {} ({})", tag.tag_icon, tag.tag_name, tag.count)
            } else {
                format!("{} {}", tag.tag_icon, tag.tag_name)
            };
            entries.push((label, selected));
        }

        for (index, (label, selected)) in entries.iter().enumerate() {
            let highlighted = index == self.tag_index && self.focused_pane == Pane::Tags;
            let mut style = Style::default().fg(if *selected {
                self.palette.accent
            } else {
                self.palette.text_primary
            });
            if highlighted {
                style = style.bg(self.palette.panel_selected_bg).add_modifier(Modifier::BOLD);
            }
            let label = truncate_to_width(label, usize::from(inner.width));
            lines.push(Line::from(Span::styled(label, style)));
        }

        if let Some(portal) = &self.portal {
            if !portal.city_slogan.is_empty() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    portal.city_slogan.clone(),
                    Style::default()
                        .fg(self.palette.text_secondary)
                        .add_modifier(Modifier::ITALIC),
                )));
            }
        }

        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_posts(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(Pane::Posts);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.post_view_height.set(inner.height);

        let posts = self.feed.posts();
        if posts.is_empty() {
            let empty = if self.feed.no_results() {
                feed::MSG_NO_POSTS
            } else if self.feed.is_loading() {
                "लोड हो रहा है…"
            } else {
                ""
            };
            frame.render_widget(
                Paragraph::new(empty).style(Style::default().fg(self.palette.text_secondary)),
                inner,
            );
            return;
        }

        let rows = self.list_rows();
        self.ensure_selection_visible();
        let offset = self.post_offset.get().min(rows.len().saturating_sub(1));
        let width = usize::from(inner.width);

        let mut lines: Vec<Line<'static>> = Vec::new();
        for row in rows.iter().skip(offset) {
            if lines.len() + 1 > usize::from(inner.height) {
                break;
            }
            match row {
                ListRow::Heading(month) => {
                    lines.push(Line::from(Span::styled(
                        format!("── {month} ──"),
                        Style::default()
                            .fg(self.palette.accent)
                            .add_modifier(Modifier::BOLD),
                    )));
                }
                ListRow::Post(index) => {
                    let Some(post) = posts.get(*index) else {
                        continue;
                    };
                    let selected = *index == self.selected_post;
                    let title_style = if selected {
                        Style::default()
                            .fg(self.palette.text_primary)
                            .bg(self.palette.panel_selected_bg)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(self.palette.text_primary)
                    };
                    let marker = if selected { "▌ " } else { "  " };
                    lines.push(Line::from(vec![
                        Span::styled(marker.to_string(), Style::default().fg(self.palette.accent)),
                        Span::styled(
                            truncate_to_width(&post.title, width.saturating_sub(2)),
                            title_style,
                        ),
                    ]));
                    if lines.len() < usize::from(inner.height) {
                        let preview = fragment::plain_text(&post.short_description);
                        let preview = textwrap::wrap(&preview, width.saturating_sub(4).max(8))
                            .first()
                            .map(|line| line.to_string())
                            .unwrap_or_default();
                        lines.push(Line::from(Span::styled(
                            format!("    {preview}"),
                            Style::default().fg(self.palette.text_secondary),
                        )));
                    }
                }
            }
        }

        if self.feed.is_exhausted() && lines.len() < usize::from(inner.height) {
            lines.push(Line::from(Span::styled(
                feed::MSG_ALL_SEEN,
                Style::default().fg(self.palette.text_secondary),
            )));
        } else if !self.feed.auto_load_enabled()
            && self.feed.has_more()
            && lines.len() < usize::from(inner.height)
        {
            lines.push(Line::from(Span::styled(
                "और पोस्ट के लिए m दबाएँ",
                Style::default().fg(self.palette.text_secondary),
            )));
        }

        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_content(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(Pane::Content);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        let body = Paragraph::new(self.content.clone())
            .style(Style::default().fg(self.palette.text_primary))
            .wrap(Wrap { trim: false })
            .scroll((self.content_scroll, 0));
        frame.render_widget(body, inner);
    }

    fn draw_news(&self, frame: &mut Frame<'_>, area: Rect) {
        let line = if let Some(item) = self.news_items.get(self.ticker.position()) {
            let marker = if self.news_paused { "⏸" } else { "📰" };
            format!("{marker} {}", item.title)
        } else {
            String::new()
        };
        let ticker = Paragraph::new(truncate_to_width(&line, usize::from(area.width)))
            .style(Style::default().fg(self.palette.text_secondary).bg(self.palette.panel_bg));
        frame.render_widget(ticker, area);
    }

    fn draw_form(&self, frame: &mut Frame<'_>, area: Rect) {
        let popup = centered_rect(60, 70, area);
        frame.render_widget(Clear, popup);
        let block = Block::default()
            .title("📬 सब्सक्राइब करें")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.palette.border_focused))
            .style(Style::default().bg(self.palette.panel_bg));
        let inner = block.inner(popup);
        frame.render_widget(block, popup);

        let mut lines = Vec::new();
        lines.push(self.form_field_line(Field::Name, "नाम", &self.form.name));
        if let Some(error) = self.form.error(Field::Name) {
            lines.push(self.error_line(error));
        }
        lines.push(self.form_field_line(
            Field::Mobile,
            "मोबाइल (+91)",
            &self.form.mobile,
        ));
        if let Some(error) = self.form.error(Field::Mobile) {
            lines.push(self.error_line(error));
        }
        lines.push(self.form_field_line(Field::City, "शहर", &self.city_query));
        if let Some(error) = self.form.error(Field::City) {
            lines.push(self.error_line(error));
        }

        if self.form_focus == Field::City {
            let matches = subscribe::filter_cities(&self.cities, &self.city_query);
            if matches.is_empty() {
                lines.push(Line::from(Span::styled(
                    "  कोई शहर नहीं मिला",
                    Style::default().fg(self.palette.text_secondary),
                )));
            }
            for (index, city) in matches.iter().take(6).enumerate() {
                let style = if index == self.city_index {
                    Style::default()
                        .fg(self.palette.text_primary)
                        .bg(self.palette.panel_selected_bg)
                } else {
                    Style::default().fg(self.palette.text_secondary)
                };
                lines.push(Line::from(Span::styled(
                    format!("  {} · {} · {}", city.name, city.english_name, city.state),
                    style,
                )));
            }
        }

        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            if self.form_submitting {
                "सबमिट हो रहा है…"
            } else {
                "Enter सबमिट · Tab फ़ील्ड बदलें · Esc बंद करें"
            },
            Style::default()
                .fg(self.palette.text_secondary)
                .add_modifier(Modifier::ITALIC),
        )));

        frame.render_widget(Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }), inner);
    }

    fn form_field_line(&self, field: Field, label: &str, value: &str) -> Line<'static> {
        let focused = self.form_focus == field;
        let marker = if focused { "▌ " } else { "  " };
        let cursor = if focused { "_" } else { "" };
        Line::from(vec![
            Span::styled(marker.to_string(), Style::default().fg(self.palette.accent)),
            Span::styled(
                format!("{label}: "),
                Style::default()
                    .fg(self.palette.text_secondary)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{value}{cursor}"),
                Style::default().fg(self.palette.text_primary),
            ),
        ])
    }

    fn error_line(&self, message: &'static str) -> Line<'static> {
        Line::from(Span::styled(
            format!("    {message}"),
            Style::default().fg(self.palette.error),
        ))
    }
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width + 1 > width {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Pagination, PostsPayload};
    use crate::data::MockPostService;

    fn options_with_posts() -> Options {
        Options {
            status_message: String::new(),
            feed_options: FeedOptions::default(),
            language: "hi".to_string(),
            portal_slug: "meerut".to_string(),
            theme: "default".to_string(),
            autoplay_delay: Duration::from_secs(3),
            news_interval: Duration::from_secs(3),
            post_service: Some(Arc::new(MockPostService)),
            detail_service: None,
            portal_service: None,
            tag_service: None,
            city_service: None,
            subscription_service: None,
            news_service: None,
        }
    }

    fn seeded_model(count: usize, last_page: u32) -> Model {
        let mut model = Model::new(options_with_posts());
        let posts = (1..=count as i64)
            .map(|id| Post {
                id: PostId::Int(id),
                title: format!("पोस्ट {id}"),
                short_description: String::new(),
                description: String::new(),
                image_url: String::new(),
                create_date: String::new(),
                tags: String::new(),
                color: None,
                month: None,
            })
            .collect();
        let _ = model.feed.begin(1, false);
        model.feed.apply(Ok(PostListing {
            success: true,
            pagination: Some(Pagination {
                current_page: 1,
                last_page,
            }),
            posts: PostsPayload::Flat(posts),
        }));
        model.after_feed_change();
        model
    }

    #[test]
    fn geometry_scales_rows_into_layout_units() {
        let model = seeded_model(10, 3);
        model.post_view_height.set(20);
        model.post_offset.set(4);
        let (scroll, viewport, document) = model.feed_geometry();
        assert_eq!(scroll, 4 * ROW_UNITS);
        assert_eq!(viewport, 20 * ROW_UNITS);
        assert_eq!(document, 10 * POST_ROW_HEIGHT as u32 * ROW_UNITS);
    }

    #[test]
    fn scrolling_near_the_bottom_queues_an_auto_load() {
        let mut model = seeded_model(10, 3);
        model.post_view_height.set(16);
        model.post_offset.set(8);
        model.maybe_auto_load();
        assert!(model.feed.is_loading());
        assert!(model.pending_posts.is_some());
    }

    #[test]
    fn top_of_a_long_list_does_not_auto_load() {
        let mut model = seeded_model(40, 3);
        model.post_view_height.set(10);
        model.post_offset.set(0);
        model.maybe_auto_load();
        assert!(!model.feed.is_loading());
        assert!(model.pending_posts.is_none());
    }

    #[test]
    fn truncation_respects_display_width() {
        assert_eq!(truncate_to_width("हिन्दी", 40), "हिन्दी");
        let cut = truncate_to_width("एक बहुत ही लंबा शीर्षक जो कटेगा", 10);
        assert!(cut.ends_with('…'));
        assert!(cut.width() <= 10);
    }

    #[test]
    fn theme_selects_the_palette() {
        assert_eq!(Palette::named("light").bg, LIGHT_PALETTE.bg);
        assert_eq!(Palette::named("default").bg, DARK_PALETTE.bg);
        assert_eq!(Palette::named("no-such-theme").bg, DARK_PALETTE.bg);

        let mut options = options_with_posts();
        options.theme = "light".to_string();
        let model = Model::new(options);
        assert_eq!(model.palette.text_primary, LIGHT_PALETTE.text_primary);
    }

    #[test]
    fn number_keys_jump_the_carousel() {
        let mut model = seeded_model(5, 3);
        assert_eq!(model.carousel.active_dot(), 0);
        model.handle_key(KeyCode::Char('3')).unwrap();
        assert_eq!(model.carousel.active_dot(), 2);

        // Out-of-range digits leave the strip where it is.
        model.handle_key(KeyCode::Char('9')).unwrap();
        assert_eq!(model.carousel.active_dot(), 2);
    }

    #[test]
    fn stale_post_responses_are_ignored() {
        let mut model = seeded_model(5, 3);
        let query = model.feed.begin(2, true).unwrap();
        model.spawn_posts(query);
        let stale_id = model.pending_posts.as_ref().unwrap().request_id + 1;
        model.handle_async_response(AsyncResponse::Posts {
            request_id: stale_id,
            result: Err(anyhow::anyhow!("stale")),
        });
        // The pending fetch is still live and the feed untouched.
        assert!(model.pending_posts.is_some());
        assert_eq!(model.feed.posts().len(), 5);
    }
}
