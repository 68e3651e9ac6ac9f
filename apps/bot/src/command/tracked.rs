use tracing::{info, warn};

use crate::{Context, Error};

/// Lists the stocks you're tracking with their book cost.
#[poise::command(slash_command)]
pub async fn tracked(ctx: Context<'_>) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    let reports = &ctx.data().reports;
    let store = reports.store();

    let symbols = reports.bounded_store(store.list_symbols(user_id)).await?;
    info!(user_id, count = symbols.len(), "tracked: invoked");

    let mut lines = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        match reports
            .bounded_store(store.get_tracked_position(user_id, symbol))
            .await
        {
            Ok(Some(p)) => lines.push(format!(
                "{:<10} {:>12.2}  since {}",
                p.symbol, p.book_cost, p.start_date
            )),
            Ok(None) => {}
            Err(e) => warn!(user_id, symbol = %symbol, error = %e, "tracked: read failed"),
        }
    }

    let content = if lines.is_empty() {
        "You're not tracking anything yet.".to_string()
    } else {
        format!("```\n{}\n```", lines.join("\n"))
    };

    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
