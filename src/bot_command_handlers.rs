use std::time::Instant;

use teloxide::{prelude::*, types::ParseMode};

use crate::{
    bot_command_helpers::{
        build_menu_message, make_menu_keyboard, report_engine_error, session_or_notify, toman_fmt,
    },
    constants::{
        ENTER_PASSWORD_MSG, ENTER_STUDENT_ID_MSG, PROFILE_DELETED_MSG, PROFILE_SAVED_MSG,
        WELCOME_MSG,
    },
    data_types::{samad_data_types::Credentials, DialogueState, DialogueType, HandlerResult},
    db_operations::CredentialStore,
    selfservice::{get_available_foods, get_credit},
    session_cache::SessionCache,
    shared_main::make_commands_keyrow,
};

pub async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, WELCOME_MSG)
        .reply_markup(make_commands_keyrow())
        .await?;
    Ok(())
}

pub async fn menu(
    bot: Bot,
    msg: Message,
    store: CredentialStore,
    cache: SessionCache,
) -> HandlerResult {
    let Some(session) = session_or_notify(&bot, msg.chat.id, &store, &cache).await? else {
        return Ok(());
    };

    let now = Instant::now();
    let foods = get_available_foods(&mut *session.lock().await).await;
    let foods = match foods {
        Ok(foods) => foods,
        Err(e) => {
            report_engine_error(&bot, msg.chat.id, &cache, &e).await?;
            return Ok(());
        }
    };
    log::debug!("Fetch menu for {}: {:.2?}", msg.chat.id.0, now.elapsed());

    bot.send_message(msg.chat.id, build_menu_message(&foods))
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(make_menu_keyboard(&foods))
        .await?;
    Ok(())
}

pub async fn credit(
    bot: Bot,
    msg: Message,
    store: CredentialStore,
    cache: SessionCache,
) -> HandlerResult {
    let Some(session) = session_or_notify(&bot, msg.chat.id, &store, &cache).await? else {
        return Ok(());
    };

    let credit = get_credit(&mut *session.lock().await).await;
    match credit {
        Ok(rial) => {
            bot.send_message(msg.chat.id, format!("اعتبار: {}", toman_fmt(rial)))
                .await?;
        }
        Err(e) => report_engine_error(&bot, msg.chat.id, &cache, &e).await?,
    }
    Ok(())
}

pub async fn start_register_dialogue(
    bot: Bot,
    msg: Message,
    dialogue: DialogueType,
) -> HandlerResult {
    bot.send_message(msg.chat.id, ENTER_STUDENT_ID_MSG).await?;
    dialogue.update(DialogueState::AwaitStudentId).await?;
    Ok(())
}

pub async fn reply_student_id_dialogue(
    bot: Bot,
    msg: Message,
    dialogue: DialogueType,
) -> HandlerResult {
    match msg.text().map(str::trim).filter(|text| !text.is_empty()) {
        Some(student_id) => {
            bot.send_message(msg.chat.id, ENTER_PASSWORD_MSG).await?;
            dialogue
                .update(DialogueState::AwaitPassword {
                    student_id: student_id.to_string(),
                })
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, ENTER_STUDENT_ID_MSG).await?;
        }
    }
    Ok(())
}

pub async fn reply_password_dialogue(
    bot: Bot,
    msg: Message,
    dialogue: DialogueType,
    student_id: String,
    store: CredentialStore,
    cache: SessionCache,
) -> HandlerResult {
    let Some(password) = msg.text().filter(|text| !text.is_empty()) else {
        bot.send_message(msg.chat.id, ENTER_PASSWORD_MSG).await?;
        return Ok(());
    };

    let credentials = Credentials {
        student_id,
        password: password.to_string(),
    };

    // the password should not stay in the chat history
    if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
        log::warn!("Could not delete password message of {}: {}", msg.chat.id.0, e);
    }

    store.save_credentials(msg.chat.id.0, &credentials)?;
    cache.evict(msg.chat.id.0).await;
    dialogue.exit().await?;

    log::info!("Registered {} for chat {}", credentials.student_id, msg.chat.id.0);
    bot.send_message(msg.chat.id, PROFILE_SAVED_MSG)
        .reply_markup(make_commands_keyrow())
        .await?;
    Ok(())
}

pub async fn forget(
    bot: Bot,
    msg: Message,
    dialogue: DialogueType,
    store: CredentialStore,
    cache: SessionCache,
) -> HandlerResult {
    store.delete_credentials(msg.chat.id.0)?;
    cache.evict(msg.chat.id.0).await;
    dialogue.exit().await?;

    bot.send_message(msg.chat.id, PROFILE_DELETED_MSG).await?;
    Ok(())
}
