use tracing::info;
use tracker::{Setting, encode_flag};

use crate::{Context, Error};

async fn put(ctx: Context<'_>, setting: Setting, value: String, reply: &str) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    info!(user_id, setting = setting.as_str(), value = %value, "settings: update");

    let reports = &ctx.data().reports;
    reports
        .bounded_store(reports.store().put_setting(user_id, setting, value))
        .await?;

    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/// Prevents the bot from mentioning/pinging you during updates.
#[poise::command(slash_command)]
pub async fn mute(ctx: Context<'_>) -> Result<(), Error> {
    put(
        ctx,
        Setting::Muted,
        encode_flag(true),
        "You will no longer be pinged on weekly updates.",
    )
    .await
}

/// Allows the bot to mention/ping you during updates.
#[poise::command(slash_command)]
pub async fn unmute(ctx: Context<'_>) -> Result<(), Error> {
    put(
        ctx,
        Setting::Muted,
        encode_flag(false),
        "You will now be pinged on weekly updates.",
    )
    .await
}

/// Forces the bot to only use this channel when sending weekly notifications.
#[poise::command(slash_command)]
pub async fn make_this_my_default_channel(ctx: Context<'_>) -> Result<(), Error> {
    put(
        ctx,
        Setting::DefaultChannel,
        ctx.channel_id().get().to_string(),
        "You will now only be pinged here during weekly notifications.",
    )
    .await
}
