use std::{env, error::Error, time::Instant};

use teloxide::{
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup},
};
use teloxide_core::types::ParseMode;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::{
    bot_command_helpers::{
        build_menu_message, make_menu_keyboard, parse_toggle_callback, report_engine_error,
        session_or_notify,
    },
    constants::{NOT_RESERVABLE_MSG, TOGGLE_SUCCESS_MSG},
    db_operations::CredentialStore,
    selfservice::{get_available_foods, toggle_food_reservation},
    session_cache::SessionCache,
};

/// Info for everything, debug for `crate_name` if `RUST_LOG=debug`.
pub fn logger_init(crate_name: &str) {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .filter_module(
            crate_name,
            if env::var(pretty_env_logger::env_logger::DEFAULT_FILTER_ENV).unwrap_or_default()
                == "debug"
            {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .init();
}

pub fn make_commands_keyrow() -> KeyboardMarkup {
    let keyboard = vec![vec![
        KeyboardButton::new("/menu"),
        KeyboardButton::new("/credit"),
    ]];
    KeyboardMarkup::new(keyboard).resize_keyboard()
}

/// Drops idle portal sessions every minute.
pub async fn start_session_purge_job(
    sched: &JobScheduler,
    cache: SessionCache,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 * * * * *", move |_uuid, mut _l| {
        let cache = cache.clone();
        Box::pin(async move {
            let purged = cache.purge_expired().await;
            if purged > 0 {
                log::debug!(target: "samad_telegram_rs::TaskSched", "Purged {} idle sessions", purged);
            }
        })
    })?;

    sched.add(job).await?;
    Ok(())
}

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    store: CredentialStore,
    cache: SessionCache,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let Some(q_data) = q.data else {
        return Ok(());
    };

    // acknowledge callback query to remove the loading alert
    bot.answer_callback_query(q.id).await?;

    let Some(message) = q.message else {
        return Ok(());
    };
    let id = message.id();
    let chat_id = message.chat().id;

    let Some((meal_id, date)) = parse_toggle_callback(&q_data) else {
        log::warn!("Unknown callback query data: {}", q_data);
        return Ok(());
    };

    let Some(session) = session_or_notify(&bot, chat_id, &store, &cache).await? else {
        return Ok(());
    };
    let mut session = session.lock().await;

    let now = Instant::now();
    let outcome = match toggle_food_reservation(&mut session, &date, &meal_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            drop(session);
            report_engine_error(&bot, chat_id, &cache, &e).await?;
            return Ok(());
        }
    };
    log::debug!("Toggle {} for {}: {:.2?}", meal_id, chat_id.0, now.elapsed());

    if let Some(rejection) = outcome.rejection {
        bot.send_message(chat_id, rejection.message).await?;
        return Ok(());
    }
    if !outcome.toggled {
        bot.send_message(chat_id, NOT_RESERVABLE_MSG).await?;
        return Ok(());
    }
    bot.send_message(chat_id, TOGGLE_SUCCESS_MSG).await?;

    // refresh the menu the button belonged to, ids changed with the write
    match get_available_foods(&mut session).await {
        Ok(foods) => {
            bot.edit_message_text(chat_id, id, build_menu_message(&foods))
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(make_menu_keyboard(&foods))
                .await?;
        }
        Err(e) => {
            drop(session);
            log::warn!("Menu refresh for {} failed: {}", chat_id.0, e);
            cache.evict(chat_id.0).await;
        }
    }

    Ok(())
}
