use anyhow::Result;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;

use herald::core::template::TemplateSet;
use herald::core::Config;
use herald::database::Database;
use herald::features::campaigns::CampaignService;
use herald::features::dispatch::{Dispatcher, RetryPolicy};
use herald::features::reminders::ReminderScheduler;
use herald::features::roster::{JsonRoster, RosterSource};
use herald::transport::{HttpGatewayTransport, TransportGate};

/// Reminder daemon entrypoint: loads config, opens the job store and runs
/// the reminder scheduler loop until ctrl-c. Campaign dispatch is driven
/// through the library's `CampaignService` by whatever front end embeds it.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting herald reminder daemon...");

    let database = Database::new(&config.database_path).await?;

    let transport = HttpGatewayTransport::new(
        config.gateway_url.clone(),
        config.gateway_token.clone(),
        config.send_timeout,
    )?;
    let gate = TransportGate::shared(Box::new(transport), config.message_delay);

    let retry = RetryPolicy {
        max_attempts: config.max_send_attempts,
        base_delay: config.retry_base_delay,
        max_delay: config.retry_max_delay,
    };

    let roster: Arc<dyn RosterSource> = Arc::new(JsonRoster::new(
        &config.roster_path,
        config.default_country_code.clone(),
    ));
    let templates = TemplateSet::load_or_builtin(&config.templates_path);

    let scheduler = Arc::new(ReminderScheduler::new(
        database.clone(),
        Dispatcher::new(database.clone(), gate.clone(), retry.clone()),
        roster.clone(),
        templates.clone(),
        config.reminder_tick,
        config.reminder_time_of_day,
        config.default_country_code.clone(),
    ));

    let service = CampaignService::new(
        database.clone(),
        roster,
        templates,
        Dispatcher::new(database, gate, retry),
        scheduler,
        config.default_reminder_offsets.clone(),
        config.default_country_code.clone(),
    );

    let runtime = service.start_scheduler_loop();
    info!("Reminder scheduler running. Press ctrl-c to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Stopping scheduler...");
    runtime.shutdown().await;
    info!("Scheduler stopped");

    Ok(())
}
