use samad_telegram_rs::constants::{DEFAULT_TIMEOUT, PORTAL_BASE_URL};
use samad_telegram_rs::selfservice::{
    calendar::portal_timezone, get_available_foods, get_credit, login, toggle_food_reservation,
    CaptchaSolver, PortalConfig, TesseractSolver,
};
use samad_telegram_rs::shared_main::logger_init;

use anyhow::{anyhow, Context};
use chrono::TimeZone;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::{sync::Arc, time::Duration};

/// Command line access to the Samad cafeteria portal.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Samad username (student id)
    #[arg(short, long, env = "SAMAD_USER")]
    user: String,
    #[arg(short, long, env = "SAMAD_PASSWORD", hide_env_values = true)]
    password: String,
    /// Base URL of the portal
    #[arg(long, env = "SAMAD_URL", default_value = PORTAL_BASE_URL)]
    portal_url: String,
    /// Timeout of every portal request, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,
    /// tesseract executable used to read the login captcha
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract: String,
    /// enable verbose logging{n}[SETS env: RUST_LOG=debug]
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Print the meals of this and next week as JSON
    Menu,
    /// Print the remaining credit in Rial
    Credit,
    /// Reserve a meal, or cancel it if it is reserved
    Toggle {
        /// meal id as printed by `menu`
        #[arg(long)]
        id: String,
        /// serving time as unix seconds, as printed by `menu`
        #[arg(long)]
        at: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    logger_init("samad_telegram_rs");

    let portal = PortalConfig::with_base_url(&args.portal_url)
        .timeout(Duration::from_secs(args.timeout_secs));
    let solver: Arc<dyn CaptchaSolver> = Arc::new(TesseractSolver::new(args.tesseract));

    let mut session = login(&portal, solver, &args.user, &args.password)
        .await
        .context("login failed")?;

    match args.command {
        CliCommand::Menu => {
            let foods = get_available_foods(&mut session).await?;
            let listing: Vec<_> = foods
                .values()
                .flatten()
                .map(|meal| json!({ "at": meal.date.timestamp(), "meal": meal }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        CliCommand::Credit => {
            println!("{}", get_credit(&mut session).await?);
        }
        CliCommand::Toggle { id, at } => {
            let date = portal_timezone()
                .timestamp_opt(at, 0)
                .single()
                .ok_or_else(|| anyhow!("{} is not a valid unix time", at))?;

            let outcome = toggle_food_reservation(&mut session, &date, &id).await?;
            match outcome.rejection {
                Some(rejection) => {
                    return Err(anyhow!("rejected by Samad: {}", rejection.message));
                }
                None if outcome.toggled => println!("toggled {} at {}", id, date),
                None => println!("{} at {} can't be changed anymore", id, date),
            }
        }
    }

    Ok(())
}
