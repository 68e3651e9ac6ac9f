use poise::CreateReply;
use tracing::info;

use crate::dispatcher::{Occasion, compose};
use crate::{Context, Error};

/// Provide current status update on stocks you're tracking.
#[poise::command(slash_command)]
pub async fn update_me(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    info!(user_id, "update_me: invoked");

    let report = ctx.data().reports.build_report_on_demand(user_id).await?;

    let Some(outgoing) = compose(&report, Occasion::OnDemand).await else {
        ctx.say("Nothing to report. Track a stock with `/track` first.")
            .await?;
        return Ok(());
    };

    let attachment = outgoing.attachment();
    let last = outgoing.parts.len().saturating_sub(1);
    for (i, part) in outgoing.parts.into_iter().enumerate() {
        let mut reply = CreateReply::default().content(part);
        if i == last
            && let Some(file) = attachment.clone()
        {
            reply = reply.attachment(file);
        }
        ctx.send(reply).await?;
    }

    info!(
        user_id,
        rows = report.rows.len(),
        skipped = report.skipped.len(),
        "update_me: completed"
    );
    Ok(())
}
