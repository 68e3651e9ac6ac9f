use chrono::{NaiveDate, Utc};
use chrono_tz::America::New_York;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use tracing::{info, warn};
use tracker::{BaselineKind, MarketDataError, TrackError, TrackOutcome, TrackRequest};

use crate::{Context, Error};

/// Tracks a stock and sends a weekly Discord notification to provide price updates.
#[poise::command(slash_command)]
pub async fn track(
    ctx: Context<'_>,
    #[description = "Ticker. e.g. `QQQ` or `AC.TO` to specify the <ticker>.<exchange>."]
    stock_ticker: String,
    #[description = "(Optional) Book cost to track the stock."] book_cost: Option<f64>,
    #[description = "(Optional) YYYY-MM-DD. Uses closing price at given date as starting price."]
    start_date: Option<String>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    info!(user_id, raw_input = %stock_ticker, ?book_cost, ?start_date, "track: invoked");

    let start_date = match start_date.as_deref().map(parse_date).transpose() {
        Ok(d) => d,
        Err(_) => {
            ctx.say("Dates must look like `YYYY-MM-DD`.").await?;
            return Ok(());
        }
    };
    let book_cost = match book_cost.map(Decimal::from_f64) {
        Some(None) => {
            ctx.say("That book cost is not a number I can use.").await?;
            return Ok(());
        }
        Some(cost) => cost,
        None => None,
    };

    let request = TrackRequest {
        symbol: stock_ticker,
        channel: ctx.channel_id().get(),
        book_cost,
        start_date,
    };
    let today = Utc::now().with_timezone(&New_York).date_naive();

    let reports = &ctx.data().reports;
    let outcome = tracker::track(
        reports.store().as_ref(),
        reports.market().as_ref(),
        reports.config(),
        user_id,
        request,
        today,
    )
    .await;

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            warn!(user_id, error = %e, "track: rejected");
            ctx.say(rejection(&e)).await?;
            return Ok(());
        }
    };

    ctx.say(reply(&outcome)).await?;
    info!(
        user_id,
        symbol = %outcome.position.symbol,
        added = outcome.added,
        company = ?outcome.company,
        "track: completed"
    );
    Ok(())
}

fn reply(outcome: &TrackOutcome) -> String {
    let p = &outcome.position;
    let mut reply = match &outcome.company {
        Some(company) => format!(
            "Tracking `{company}` for `{}`\nIf this company is unexpected, make sure you specify the exchange.\n",
            p.symbol
        ),
        None => format!("Tracking `{}`\n", p.symbol),
    };
    reply.push_str(&match outcome.baseline {
        BaselineKind::Explicit => format!("Using book cost of `{:.2}`.", p.book_cost),
        BaselineKind::CloseOnDate => {
            format!("Using `{:.2}` from `{}` as book price.", p.book_cost, p.start_date)
        }
        BaselineKind::Latest => format!(
            "No date or price was provided. Using latest price `{:.2}` from `{}`.",
            p.book_cost, p.start_date
        ),
    });
    if !outcome.added {
        reply.push_str("\nThis replaces your previous entry for this ticker.");
    }
    reply.push_str("\nYou can use my `/drop` command to untrack this stock.");
    reply
}

fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
}

fn rejection(err: &TrackError) -> String {
    match err {
        TrackError::InvalidBookCost(_) => "Book cost must be greater than zero.".to_string(),
        TrackError::FutureStartDate(d) => format!("`{d}` is in the future."),
        TrackError::Market(MarketDataError::NoData(_) | MarketDataError::InvalidPrice(_)) => {
            "Could not find stock data. Make sure the date format and stock tickers/exchange are correct."
                .to_string()
        }
        TrackError::Market(_) => {
            "The market-data provider is not answering right now. Try again in a bit.".to_string()
        }
        TrackError::Store(_) => "Could not save that right now. Try again in a bit.".to_string(),
    }
}
