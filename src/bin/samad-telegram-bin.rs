use samad_telegram_rs::bot_command_handlers::{
    credit, forget, menu, reply_password_dialogue, reply_student_id_dialogue, start,
    start_register_dialogue,
};
use samad_telegram_rs::constants::{
    DEFAULT_SESSION_TTL, DEFAULT_TIMEOUT, PORTAL_BASE_URL, SAMAD_DB,
};
use samad_telegram_rs::data_types::{Command, DialogueState, HandlerResult};
use samad_telegram_rs::db_operations::CredentialStore;
use samad_telegram_rs::selfservice::{CaptchaSolver, PortalConfig, TesseractSolver};
use samad_telegram_rs::session_cache::SessionCache;
use samad_telegram_rs::shared_main::{callback_handler, logger_init, start_session_purge_job};

use anyhow::Context;
use clap::Parser;
use log::log_enabled;
use std::{path::PathBuf, sync::Arc, time::Duration};
use teloxide::{
    dispatching::{
        dialogue::{self, InMemStorage},
        UpdateHandler,
    },
    prelude::*,
};
use tokio_cron_scheduler::JobScheduler;

/// Telegram bot to reserve meals on the Samad cafeteria portal.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// The telegram bot token to be used
    #[arg(short, long, env = "TELOXIDE_TOKEN")]
    token: String,
    /// sqlite file holding the registered credentials
    #[arg(long, env = "SAMAD_DB", default_value = SAMAD_DB)]
    db: PathBuf,
    /// Base URL of the portal
    #[arg(long, env = "SAMAD_URL", default_value = PORTAL_BASE_URL)]
    portal_url: String,
    /// Timeout of every portal request, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,
    /// Idle minutes after which a logged in session is dropped
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL.as_secs() / 60)]
    session_ttl_mins: u64,
    /// tesseract executable used to read the login captcha
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract: String,
    /// enable verbose logging (mostly performance metrics){n}[SETS env: RUST_LOG=debug]
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    //// Args setup
    let args = Args::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    logger_init("samad_telegram_rs");
    log::info!("Starting bot...");

    if !(log_enabled!(log::Level::Debug) || log_enabled!(log::Level::Trace)) {
        log::info!("Enable verbose logging for performance metrics");
    }

    //// DB setup
    let store = CredentialStore::new(&args.db);
    store
        .check_or_create_db_tables()
        .with_context(|| format!("could not open {}", args.db.display()))?;

    let portal = PortalConfig::with_base_url(&args.portal_url)
        .timeout(Duration::from_secs(args.timeout_secs));
    let solver: Arc<dyn CaptchaSolver> = Arc::new(TesseractSolver::new(args.tesseract));
    let cache = SessionCache::new(
        portal,
        solver,
        Duration::from_secs(args.session_ttl_mins * 60),
    );

    let sched = JobScheduler::new().await?;
    start_session_purge_job(&sched, cache.clone()).await?;
    sched.start().await?;
    log::info!(target: "samad_telegram_rs::TaskSched", "Ready.");

    let bot = Bot::new(args.token);

    let command_handler_deps = dptree::deps![
        InMemStorage::<DialogueState>::new(),
        store,
        cache
    ];
    Dispatcher::builder(bot, schema())
        .dependencies(command_handler_deps)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Menu].endpoint(menu))
        .branch(case![Command::Credit].endpoint(credit))
        .branch(case![Command::Register].endpoint(start_register_dialogue))
        .branch(case![Command::Forget].endpoint(forget));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![DialogueState::AwaitStudentId].endpoint(reply_student_id_dialogue))
        .branch(case![DialogueState::AwaitPassword { student_id }].endpoint(reply_password_dialogue))
        .branch(dptree::endpoint(invalid_cmd));

    let callback_query_handler = Update::filter_callback_query().endpoint(callback_handler);

    dialogue::enter::<Update, InMemStorage<DialogueState>, DialogueState, _>()
        .branch(message_handler)
        .branch(callback_query_handler)
}

async fn invalid_cmd(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "That is not a command. Try /start.")
        .await?;
    Ok(())
}
