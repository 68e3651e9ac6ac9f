use anyhow::Result;
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, Http};
use tracing::{debug, error, info, instrument, warn};
use tracing_futures::Instrument;
use tracker::{ReportBuilder, ReportResult, UserId, render};

/// Discord rejects messages over 2000 characters.
const MAX_MESSAGE_LEN: usize = 1900;
const CHART_FILENAME: &str = "report.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occasion {
    Weekly,
    OnDemand,
}

impl Occasion {
    fn greeting(&self) -> &'static str {
        match self {
            Occasion::Weekly => "Weekly reminder of stocks you're tracking.",
            Occasion::OnDemand => "Here's a list of stocks you're tracking.",
        }
    }
}

/// A rendered report, ready to hand to Discord.
pub struct Outgoing {
    /// Message bodies in send order. Only the first mentions the user.
    pub parts: Vec<String>,
    pub chart: Option<Vec<u8>>,
}

impl Outgoing {
    pub fn attachment(&self) -> Option<CreateAttachment> {
        self.chart
            .as_ref()
            .map(|png| CreateAttachment::bytes(png.clone(), CHART_FILENAME))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySummary {
    pub users: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Splits a table into code blocks that each fit in one message.
pub fn code_blocks(table: &str, max_len: usize) -> Vec<String> {
    let budget = max_len.saturating_sub(8);
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in table.lines() {
        if !current.is_empty() && current.len() + line.len() + 1 > budget {
            blocks.push(format!("```\n{}```", current));
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        blocks.push(format!("```\n{}```", current));
    }
    blocks
}

/// Renders a report. `None` when there is nothing to send.
pub async fn compose(report: &ReportResult, occasion: Occasion) -> Option<Outgoing> {
    if report.is_empty() {
        return None;
    }

    let header = format!("<@{}> {}\n", report.user_id, occasion.greeting());
    let table = render::table(&report.rows);
    let mut parts = code_blocks(&table, MAX_MESSAGE_LEN - header.len());
    if let Some(first) = parts.first_mut() {
        first.insert_str(0, &header);
    }

    let rows = report.rows.clone();
    let chart = match tokio::task::spawn_blocking(move || render::chart(&rows)).await {
        Ok(Ok(bytes)) => {
            debug!(bytes = bytes.len(), "chart generated");
            Some(bytes)
        }
        Ok(Err(e)) => {
            warn!(error = ?e, "chart render failed, sending table only");
            None
        }
        Err(e) => {
            warn!(error = ?e, "spawn_blocking join failed");
            None
        }
    };

    Some(Outgoing { parts, chart })
}

async fn deliver(http: &Http, channel: ChannelId, outgoing: Outgoing) -> Result<()> {
    let attachment = outgoing.attachment();
    let last = outgoing.parts.len().saturating_sub(1);

    for (i, part) in outgoing.parts.into_iter().enumerate() {
        let mut msg = CreateMessage::new().content(part);
        if i == last
            && let Some(file) = attachment.clone()
        {
            msg = msg.add_file(file);
        }
        channel.send_message(http, msg).await?;
    }
    Ok(())
}

/// Outcome of one user's scheduled report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent(u64),
    Muted,
    Empty,
    NoChannel,
}

/// Builds and sends one user's scheduled report.
///
/// The user's default channel wins over the most common channel of their
/// positions.
#[instrument(name = "send_user_report", skip(http, reports), fields(user_id = user))]
pub async fn send_user_report(
    http: &Http,
    reports: &ReportBuilder,
    user: UserId,
) -> Result<Delivery> {
    let report = reports.build_report(user).await?;

    if report.muted {
        return Ok(Delivery::Muted);
    }
    let Some(channel) = report.delivery_channel().filter(|c| *c != 0) else {
        return Ok(if report.is_empty() {
            Delivery::Empty
        } else {
            Delivery::NoChannel
        });
    };
    let Some(outgoing) = compose(&report, Occasion::Weekly).await else {
        info!("no rows, nothing sent");
        return Ok(Delivery::Empty);
    };

    deliver(http, ChannelId::new(channel), outgoing).await?;
    info!(channel_id = channel, rows = report.rows.len(), "report sent");
    Ok(Delivery::Sent(channel))
}

/// Sends every user's report, one user at a time.
///
/// A failure for one user is logged and does not stop the run.
#[instrument(name = "run_weekly", skip(http, reports))]
pub async fn run_weekly(http: &Http, reports: &ReportBuilder) -> Result<WeeklySummary> {
    let users = reports.list_users().await?;
    info!(total_users = users.len(), "loaded users");

    let mut summary = WeeklySummary {
        users: users.len(),
        ..Default::default()
    };

    for user in users {
        let span = tracing::info_span!("weekly_user", user_id = user);

        match send_user_report(http, reports, user).instrument(span).await {
            Ok(Delivery::Sent(_)) => summary.sent += 1,
            Ok(Delivery::NoChannel) => {
                warn!(user_id = user, "no channel to deliver to");
                summary.skipped += 1;
            }
            Ok(Delivery::Muted | Delivery::Empty) => summary.skipped += 1,
            Err(e) => {
                summary.failed += 1;
                error!(user_id = user, error = ?e, "user report failed");
            }
        }
    }

    info!(
        users = summary.users,
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        "completed weekly run"
    );
    Ok(summary)
}
