use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::content::SubscriptionRequest;

/// A subscribable city, flattened out of the state-grouped payload the
/// analytics host serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct City {
    pub id: String,
    pub name: String,
    pub english_name: String,
    pub state: String,
    pub slug: String,
}

#[derive(Deserialize)]
struct CityRecord {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    city: String,
    #[serde(default)]
    local_name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    city_slug: String,
}

/// Flattens the `state id -> [city]` map into one list sorted by Hindi
/// name. Entries that fail to decode are skipped rather than failing the
/// whole list.
pub fn flatten_cities(grouped: &Map<String, Value>) -> Vec<City> {
    let mut cities = Vec::new();
    for value in grouped.values() {
        let Some(entries) = value.as_array() else {
            continue;
        };
        for entry in entries {
            let Ok(record) = serde_json::from_value::<CityRecord>(entry.clone()) else {
                continue;
            };
            cities.push(City {
                id: match &record.id {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    _ => continue,
                },
                name: record.city,
                english_name: record.local_name,
                state: record.state,
                slug: record.city_slug,
            });
        }
    }
    cities.sort_by(|a, b| a.name.cmp(&b.name));
    cities
}

/// The city pre-selected when the form opens.
pub fn default_city<'a>(cities: &'a [City], preferred_slug: &str) -> Option<&'a City> {
    cities
        .iter()
        .find(|city| city.slug.eq_ignore_ascii_case(preferred_slug))
        .or_else(|| cities.first())
}

/// Fuzzy search over city name, English name and state. An empty query
/// returns everything in list order; otherwise matches come back best
/// first.
pub fn filter_cities<'a>(cities: &'a [City], query: &str) -> Vec<&'a City> {
    let query = query.trim();
    if query.is_empty() {
        return cities.iter().collect();
    }
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &City)> = cities
        .iter()
        .filter_map(|city| {
            let score = [&city.name, &city.english_name, &city.state]
                .into_iter()
                .filter_map(|field| matcher.fuzzy_match(field, query))
                .max()?;
            Some((score, city))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, city)| city).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Mobile,
    City,
}

/// Subscription form state with per-field validation messages.
#[derive(Default)]
pub struct SubscriptionForm {
    pub name: String,
    pub mobile: String,
    pub city: Option<City>,
    name_error: Option<&'static str>,
    mobile_error: Option<&'static str>,
    city_error: Option<&'static str>,
}

static NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s\u{0900}-\u{097F}]+$").expect("name regex"));
static MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").expect("mobile regex"));

impl SubscriptionForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_name_char(&mut self, ch: char) {
        self.name.push(ch);
        self.name_error = None;
    }

    /// Mobile input accepts digits only, capped at ten.
    pub fn push_mobile_char(&mut self, ch: char) {
        if ch.is_ascii_digit() && self.mobile.len() < 10 {
            self.mobile.push(ch);
            self.mobile_error = None;
        }
    }

    pub fn pop_name_char(&mut self) {
        self.name.pop();
    }

    pub fn pop_mobile_char(&mut self) {
        self.mobile.pop();
    }

    pub fn select_city(&mut self, city: City) {
        self.city = Some(city);
        self.city_error = None;
    }

    pub fn error(&self, field: Field) -> Option<&'static str> {
        match field {
            Field::Name => self.name_error,
            Field::Mobile => self.mobile_error,
            Field::City => self.city_error,
        }
    }

    /// Runs every field check and records the messages. Returns true when
    /// the form is ready to submit.
    pub fn validate(&mut self) -> bool {
        let name = self.name.trim();
        self.name_error = if name.is_empty() {
            Some("कृपया अपना नाम दर्ज करें")
        } else if name.chars().count() < 2 {
            Some("नाम कम से कम 2 अक्षर का होना चाहिए")
        } else if !NAME_CHARS.is_match(name) {
            Some("नाम में केवल अक्षर होने चाहिए")
        } else {
            None
        };

        let mobile = self.mobile.trim();
        self.mobile_error = if mobile.is_empty() {
            Some("कृपया अपना मोबाइल नंबर दर्ज करें")
        } else if !MOBILE.is_match(mobile) {
            Some("कृपया वैध 10 अंकों का मोबाइल नंबर दर्ज करें")
        } else {
            None
        };

        self.city_error = if self.city.is_none() {
            Some("कृपया अपना शहर चुनें")
        } else {
            None
        };

        self.name_error.is_none() && self.mobile_error.is_none() && self.city_error.is_none()
    }

    /// The request to submit; only meaningful after a passing `validate`.
    pub fn request(&self) -> Option<SubscriptionRequest> {
        let city = self.city.as_ref()?;
        Some(SubscriptionRequest {
            name: self.name.trim().to_string(),
            mobile: self.mobile.trim().to_string(),
            city: city.name.clone(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
