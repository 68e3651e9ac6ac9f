use tracing::{info, warn};
use tracker::normalize_symbol;

use crate::{Context, Error};

/// Untracks a stock from your weekly notification.
#[poise::command(slash_command)]
pub async fn drop(
    ctx: Context<'_>,
    #[description = "Specify a ticker to untrack."] stock_ticker: String,
) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    let symbol = normalize_symbol(&stock_ticker);
    info!(user_id, symbol = %symbol, "drop: invoked");

    let reports = &ctx.data().reports;
    let removed = reports
        .bounded_store(reports.store().delete_tracked_position(user_id, &symbol))
        .await;

    let content = match removed {
        Ok(true) => format!("`{symbol}` will no longer be tracked."),
        Ok(false) => {
            format!("Could not complete operation. Are you sure you're tracking `{symbol}`?")
        }
        Err(e) => {
            warn!(user_id, symbol = %symbol, error = %e, "drop: store failed");
            "Could not complete operation right now. Try again in a bit.".to_string()
        }
    };

    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;

    info!(user_id, symbol = %symbol, "drop: completed");
    Ok(())
}
