use std::{collections::BTreeMap, time::Instant};

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Weekday};
use rand::Rng;
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
    utils::markdown,
};

use crate::{
    constants::{ERROR_MSG, LOGIN_FAILED_MSG, NOT_FOUND_MSG, NO_DB_MSG},
    data_types::samad_data_types::{MealEntry, MealStatus, MealTime},
    db_operations::CredentialStore,
    errors::{AuthError, SelfServiceError},
    selfservice::calendar::{gregorian_to_jalali, portal_timezone},
    session_cache::{SessionCache, SharedSession},
};

const EMOJIS: [&str; 7] = ["☀️", "🦀", "🍛", "☕️", "🥙", "🌤️", "🥦"];

const TOGGLE_PREFIX: &str = "t";

fn persian_weekday(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sat => "شنبه",
        Weekday::Sun => "یکشنبه",
        Weekday::Mon => "دوشنبه",
        Weekday::Tue => "سه‌شنبه",
        Weekday::Wed => "چهارشنبه",
        Weekday::Thu => "پنجشنبه",
        Weekday::Fri => "جمعه",
    }
}

fn meal_time_name(meal_time: MealTime) -> &'static str {
    match meal_time {
        MealTime::Breakfast => "صبحانه",
        MealTime::Lunch => "ناهار",
        MealTime::Dinner => "شام",
    }
}

fn status_marker(status: MealStatus) -> &'static str {
    match status {
        MealStatus::Reserved => "🔵",
        MealStatus::Reservable => "🔴",
        MealStatus::SecondOptionReserved => "🟡",
        MealStatus::Unavailable => "⚫️",
    }
}

/// e.g. `شنبه 1396/07/29`
pub fn jalali_day_fmt(date: &DateTime<FixedOffset>) -> String {
    let (year, month, day) = gregorian_to_jalali(date.date_naive());
    format!(
        "{} {}/{:02}/{:02}",
        persian_weekday(date.weekday()),
        year,
        month,
        day
    )
}

pub fn toman_fmt(rial: i64) -> String {
    format!("{} تومان", rial / 10)
}

/// MarkdownV2 listing of all meals, grouped by day.
pub fn build_menu_message(foods: &BTreeMap<DateTime<FixedOffset>, Vec<MealEntry>>) -> String {
    let rand_emoji = EMOJIS[rand::thread_rng().gen_range(0..EMOJIS.len())];
    let mut msg = format!(
        "{} {} {}\n",
        rand_emoji,
        markdown::bold("منوی سلف"),
        rand_emoji
    );

    if foods.is_empty() {
        msg += &markdown::italic("\nغذایی برای رزرو وجود ندارد\\.\n");
        return msg;
    }

    let mut last_day = None;
    for (date, meals) in foods {
        if last_day != Some(date.date_naive()) {
            last_day = Some(date.date_naive());
            msg += &format!("\n{}\n", markdown::bold(&markdown::escape(&jalali_day_fmt(date))));
        }

        for meal in meals {
            msg += &format!(
                "{} {}: {}",
                status_marker(meal.status),
                meal_time_name(meal.meal_time),
                markdown::underline(&markdown::escape(&meal.name))
            );
            if let Some(side_dish) = &meal.side_dish {
                msg += &format!(" \\+ {}", markdown::italic(&markdown::escape(side_dish)));
            }
            msg += &format!("  {}\n", markdown::escape(&toman_fmt(meal.price)));
        }
    }

    msg += &markdown::italic("\n🔵 رزرو شده  🔴 قابل رزرو  🟡 انتخاب دوم\n");
    msg
}

/// One toggle button per meal.
pub fn make_menu_keyboard(
    foods: &BTreeMap<DateTime<FixedOffset>, Vec<MealEntry>>,
) -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = foods
        .iter()
        .flat_map(|(date, meals)| meals.iter().map(move |meal| (date, meal)))
        .map(|(date, meal)| {
            vec![InlineKeyboardButton::callback(
                format!(
                    "{} {} {}: {}",
                    status_marker(meal.status),
                    persian_weekday(date.weekday()),
                    meal_time_name(meal.meal_time),
                    meal.name
                ),
                toggle_callback_data(&meal.id, date),
            )]
        })
        .collect();

    InlineKeyboardMarkup::new(keyboard)
}

pub fn toggle_callback_data(meal_id: &str, date: &DateTime<FixedOffset>) -> String {
    format!("{}:{}:{}", TOGGLE_PREFIX, meal_id, date.timestamp())
}

/// Inverse of [`toggle_callback_data`].
pub fn parse_toggle_callback(data: &str) -> Option<(String, DateTime<FixedOffset>)> {
    let (prefix, rest) = data.split_once(':')?;
    if prefix != TOGGLE_PREFIX {
        return None;
    }
    let (meal_id, unix) = rest.rsplit_once(':')?;
    if meal_id.is_empty() {
        return None;
    }
    let date = portal_timezone()
        .timestamp_opt(unix.parse().ok()?, 0)
        .single()?;

    Some((meal_id.to_string(), date))
}

/// What the user gets to see for an engine error.
pub fn user_error_msg(err: &SelfServiceError) -> &'static str {
    match err {
        SelfServiceError::Auth(AuthError::LoginRejected(_)) => LOGIN_FAILED_MSG,
        SelfServiceError::MealNotFound { .. } => NOT_FOUND_MSG,
        _ => ERROR_MSG,
    }
}

/// Logged in session of the chat. Tells the user what went wrong and returns `None` if there is
/// no registration or the login failed.
pub async fn session_or_notify(
    bot: &Bot,
    chat_id: ChatId,
    store: &CredentialStore,
    cache: &SessionCache,
) -> Result<Option<SharedSession>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(credentials) = store.get_credentials(chat_id.0)? else {
        bot.send_message(chat_id, NO_DB_MSG).await?;
        return Ok(None);
    };

    let now = Instant::now();
    match cache.get_or_login(chat_id.0, &credentials).await {
        Ok(session) => {
            log::debug!("Session for {}: {:.2?}", chat_id.0, now.elapsed());
            Ok(Some(session))
        }
        Err(e) => {
            report_engine_error(bot, chat_id, cache, &e).await?;
            Ok(None)
        }
    }
}

/// Drops the cached session, which may be out of sync with the portal now, and informs the user.
pub async fn report_engine_error(
    bot: &Bot,
    chat_id: ChatId,
    cache: &SessionCache,
    err: &SelfServiceError,
) -> Result<(), teloxide::RequestError> {
    log::warn!("Samad request for {} failed: {}", chat_id.0, err);
    cache.evict(chat_id.0).await;
    bot.send_message(chat_id, user_error_msg(err)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selfservice::calendar::meal_date;
    use chrono::NaiveDate;

    fn meal(id: &str, name: &str, status: MealStatus, date: DateTime<FixedOffset>) -> MealEntry {
        MealEntry {
            id: id.to_string(),
            name: name.to_string(),
            side_dish: Some("ماست".to_string()),
            price: 5500,
            meal_time: MealTime::Lunch,
            date,
            status,
        }
    }

    fn lunch_on(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
        meal_date(NaiveDate::from_ymd_opt(y, m, d).unwrap(), MealTime::Lunch).unwrap()
    }

    #[test]
    fn callback_data_round_trip() {
        let date = lunch_on(2017, 10, 21);
        let data = toggle_callback_data("userWeekReserves3", &date);

        assert_eq!(data, "t:userWeekReserves3:1508572800");
        assert!(data.len() <= 64);
        assert_eq!(
            parse_toggle_callback(&data),
            Some(("userWeekReserves3".to_string(), date))
        );
    }

    #[test]
    fn foreign_callback_data_is_ignored() {
        assert_eq!(parse_toggle_callback("m_upd:Mensa"), None);
        assert_eq!(parse_toggle_callback("t::1508572800"), None);
        assert_eq!(parse_toggle_callback("t:abc:tomorrow"), None);
        assert_eq!(parse_toggle_callback("t"), None);
    }

    #[test]
    fn jalali_day_names() {
        assert_eq!(jalali_day_fmt(&lunch_on(2017, 10, 21)), "شنبه 1396/07/29");
        assert_eq!(jalali_day_fmt(&lunch_on(2024, 3, 20)), "چهارشنبه 1403/01/01");
    }

    #[test]
    fn credit_in_toman() {
        assert_eq!(toman_fmt(245490), "24549 تومان");
        assert_eq!(toman_fmt(-5000), "-500 تومان");
    }

    #[test]
    fn menu_lists_every_meal_with_marker() {
        let first = lunch_on(2017, 10, 21);
        let second = lunch_on(2017, 10, 22);
        let foods = BTreeMap::from([
            (
                first,
                vec![
                    meal("a", "چلو کباب", MealStatus::Reserved, first),
                    meal("b", "قورمه سبزی", MealStatus::SecondOptionReserved, first),
                ],
            ),
            (second, vec![meal("c", "عدس پلو", MealStatus::Reservable, second)]),
        ]);

        let msg = build_menu_message(&foods);
        assert!(msg.contains("🔵 ناهار: __چلو کباب__"));
        assert!(msg.contains("🟡 ناهار: __قورمه سبزی__"));
        assert!(msg.contains("🔴 ناهار: __عدس پلو__"));
        assert!(msg.contains("1396/07/29"));
        assert!(msg.contains("1396/07/30"));
        assert!(msg.contains("550 تومان"));

        let keyboard = make_menu_keyboard(&foods);
        assert_eq!(keyboard.inline_keyboard.len(), 3);
    }

    #[test]
    fn empty_menu() {
        let msg = build_menu_message(&BTreeMap::new());
        assert!(msg.contains("غذایی برای رزرو وجود ندارد"));
        assert!(make_menu_keyboard(&BTreeMap::new()).inline_keyboard.is_empty());
    }

    #[test]
    fn errors_map_to_user_messages() {
        assert_eq!(
            user_error_msg(&AuthError::LoginRejected("captcha".into()).into()),
            LOGIN_FAILED_MSG
        );
        assert_eq!(
            user_error_msg(&SelfServiceError::MealNotFound {
                id: "x".into(),
                date: lunch_on(2017, 10, 21)
            }),
            NOT_FOUND_MSG
        );
        assert_eq!(user_error_msg(&SelfServiceError::scrape("x")), ERROR_MSG);
    }
}
