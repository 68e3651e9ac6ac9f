use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bot::{Data, command, config::Config, dispatcher, feedback};
use chrono_tz::America::New_York;
use poise::{Framework, FrameworkOptions};
use serenity::all::{ActivityData, ClientBuilder, FullEvent, GatewayIntents};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracker::{AlpacaClient, RedisPositionStore, ReportBuilder, ReportConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bot=info,tracker=info")),
        )
        .init();

    let config = Config::from_env().context("failed to load config")?;

    let report_config = ReportConfig {
        fetch_timeout: config.fetch_timeout,
        ..Default::default()
    };
    let store = Arc::new(
        RedisPositionStore::from_env()
            .await
            .context("init position store failed")?,
    );
    let market = Arc::new(
        AlpacaClient::from_env(config.fetch_timeout).context("init market data client failed")?,
    );
    let reports = ReportBuilder::new(store, market, report_config);

    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            event_handler: |serenity_ctx, event, _framework_ctx, data| {
                Box::pin(async move {
                    if let FullEvent::Message { new_message } = event
                        && let Err(e) =
                            feedback::handle_message(serenity_ctx, data, new_message).await
                    {
                        warn!(error = ?e, "feedback handling failed");
                    }
                    Ok(())
                })
            },
            commands: command::commands(),
            ..Default::default()
        })
        .setup({
            let reports = reports.clone();
            let config = config.clone();

            move |ctx, ready, framework| {
                Box::pin(async move {
                    info!(
                        "{} [{}] connected successfully!",
                        ready.user.name, ready.user.id
                    );

                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    let ctx_clone = ctx.clone();
                    let version = config.version.clone();
                    tokio::spawn(async move {
                        let mut show_version = true;
                        let mut tick = tokio::time::interval(Duration::from_secs(30));

                        loop {
                            tick.tick().await;

                            let text = if show_version {
                                if version.starts_with('v') {
                                    version.clone()
                                } else {
                                    format!("Version - {}", version)
                                }
                            } else {
                                let now = chrono::Utc::now().with_timezone(&New_York);
                                format!("Time - {}", now.format("%H:%M (%Z)"))
                            };

                            ctx_clone.set_activity(Some(ActivityData::custom(text)));
                            show_version = !show_version;
                        }
                    });

                    Ok(Data { reports, config })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("failed to create discord client")?;

    let http = client.http.clone();

    let sched = JobScheduler::new()
        .await
        .context("failed to create job scheduler")?;

    let reports_job = reports.clone();

    sched
        .add(Job::new_async_tz(
            config.weekly_cron.as_str(),
            New_York,
            move |_uuid, _l| {
                let http = http.clone();
                let reports = reports_job.clone();

                Box::pin(async move {
                    if let Err(e) = dispatcher::run_weekly(&http, &reports).await {
                        error!(error = ?e, "run_weekly failed");
                    }
                })
            },
        )?)
        .await?;

    sched.shutdown_on_ctrl_c();
    sched.start().await?;
    info!(cron = %config.weekly_cron, "weekly report scheduled (America/New_York)");

    tokio::spawn(async move {
        if let Err(why) = client.start().await {
            error!("Client error: {why:?}");
        }
    });

    shutdown_signal().await;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv()  => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
