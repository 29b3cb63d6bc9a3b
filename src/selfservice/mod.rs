pub mod auth;
pub mod calendar;
pub mod captcha;
pub mod extractor;
pub mod fetcher;
pub mod session;
pub mod toggle;

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, FixedOffset};
use reqwest::Client;

pub use auth::login;
pub use captcha::{CaptchaSolver, TesseractSolver};
pub use session::Session;
pub use toggle::toggle_food_reservation;

use crate::{
    constants::{
        CAPTCHA_PATH, DEFAULT_TIMEOUT, LOGIN_ACTION_PATH, LOGIN_PAGE_PATH, PORTAL_BASE_URL,
        RESERVATION_PATH,
    },
    data_types::samad_data_types::{MealEntry, MealStatus},
    errors::SelfServiceError,
};

/// Endpoints of one portal deployment plus the per-request timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub login_page_url: String,
    pub login_action_url: String,
    pub captcha_url: String,
    pub reservation_url: String,
    pub timeout: Duration,
}

impl PortalConfig {
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        PortalConfig {
            login_page_url: format!("{}{}", base, LOGIN_PAGE_PATH),
            login_action_url: format!("{}{}", base, LOGIN_ACTION_PATH),
            captcha_url: format!("{}{}", base, CAPTCHA_PATH),
            reservation_url: format!("{}{}", base, RESERVATION_PATH),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A fresh client with its own cookie jar.
    pub fn build_client(&self) -> Result<Client, SelfServiceError> {
        Ok(Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()?)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig::with_base_url(PORTAL_BASE_URL)
    }
}

/// Reservable and reserved meals of this and next week, keyed by serving time.
pub async fn get_available_foods(
    session: &mut Session,
) -> Result<BTreeMap<DateTime<FixedOffset>, Vec<MealEntry>>, SelfServiceError> {
    let (current_html, current) = fetcher::fetch_current_week(session).await?;
    let (_, next) = fetcher::fetch_next_week(session, &current_html).await?;

    Ok(merge_weeks(current, next))
}

/// Remaining credit in Rial.
pub async fn get_credit(session: &mut Session) -> Result<i64, SelfServiceError> {
    let (html, _) = fetcher::fetch_current_week(session).await?;
    extractor::extract_credit(&html)
}

fn group_by_date(meals: Vec<MealEntry>) -> BTreeMap<DateTime<FixedOffset>, Vec<MealEntry>> {
    let mut groups: BTreeMap<_, Vec<_>> = BTreeMap::new();
    for meal in meals {
        if meal.status == MealStatus::Unavailable {
            continue;
        }
        groups.entry(meal.date).or_default().push(meal);
    }
    groups
}

/// Next week's groups replace this week's where both pages render the same slot.
fn merge_weeks(
    current: Vec<MealEntry>,
    next: Vec<MealEntry>,
) -> BTreeMap<DateTime<FixedOffset>, Vec<MealEntry>> {
    let mut merged = group_by_date(current);
    merged.extend(group_by_date(next));
    merged
}
