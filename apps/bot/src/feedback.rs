use anyhow::Result;
use serenity::all::{ChannelId, Context as SerenityContext, CreateMessage, Message};
use tracing::{info, warn};
use tracker::{Setting, UserId, encode_flag};

use crate::Data;
use crate::dispatcher::{Delivery, run_weekly, send_user_report};

const FORCE_NOTIFY: &str = "!force_notify";

/// What an admin message in the feedback channel asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    NotifyAll,
    NotifyUser(UserId),
    Blacklist(UserId, bool),
}

/// Pulls the user id out of a relayed message's `(id)` prefix.
pub fn relayed_user(text: &str) -> Option<UserId> {
    let start = text.find('(')? + 1;
    let end = start + text[start..].find(')')?;
    text[start..end].trim().parse().ok()
}

pub fn relay_text(user: UserId, name: &str, content: &str, urls: &[String]) -> String {
    let mut text = format!("({}) Feedback from `{}`:\n{}\n", user, name, content);
    for url in urls {
        text.push_str(url);
        text.push('\n');
    }
    text
}

/// Parses an admin message. `replied_to` is the text of the message it replies to.
pub fn admin_action(content: &str, replied_to: Option<&str>) -> Option<AdminAction> {
    let mut words = content.split_whitespace();
    if words.next() == Some(FORCE_NOTIFY) {
        return match words.next()? {
            "all" => Some(AdminAction::NotifyAll),
            id => id.parse().ok().map(AdminAction::NotifyUser),
        };
    }

    let user = relayed_user(replied_to?)?;
    match content.trim().to_lowercase().as_str() {
        "blacklist" => Some(AdminAction::Blacklist(user, true)),
        "unblacklist" => Some(AdminAction::Blacklist(user, false)),
        _ => None,
    }
}

pub async fn handle_message(ctx: &SerenityContext, data: &Data, msg: &Message) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(feedback_channel) = data.config.feedback_channel else {
        return Ok(());
    };
    let feedback_channel = ChannelId::new(feedback_channel);
    let reports = &data.reports;
    let author = msg.author.id.get();

    if msg.guild_id.is_none() {
        let settings = reports
            .bounded_store(reports.store().user_settings(author))
            .await?;
        if settings.feedback_blacklisted {
            info!(user_id = author, "feedback: ignored blacklisted user");
            return Ok(());
        }

        let urls: Vec<String> = msg.attachments.iter().map(|a| a.url.clone()).collect();
        let text = relay_text(author, &msg.author.name, &msg.content, &urls);
        feedback_channel
            .send_message(&ctx.http, CreateMessage::new().content(text))
            .await?;
        info!(user_id = author, "feedback: relayed DM");
        return Ok(());
    }

    if msg.channel_id != feedback_channel || data.config.admin_id != Some(author) {
        return Ok(());
    }

    let replied_to = msg.referenced_message.as_ref().map(|m| m.content.as_str());
    let Some(action) = admin_action(&msg.content, replied_to) else {
        return Ok(());
    };
    info!(?action, "feedback: admin action");

    let ack = match action {
        AdminAction::NotifyAll => {
            let summary = run_weekly(&ctx.http, &data.reports).await?;
            format!(
                "Weekly run done: {} sent, {} skipped, {} failed.",
                summary.sent, summary.skipped, summary.failed
            )
        }
        AdminAction::NotifyUser(user) => match send_user_report(&ctx.http, &data.reports, user).await {
            Ok(Delivery::Sent(channel)) => format!("Sent report for {user} to <#{channel}>."),
            Ok(other) => format!("Nothing sent for {user}: {other:?}."),
            Err(e) => {
                warn!(user_id = user, error = ?e, "feedback: force notify failed");
                format!("Report for {user} failed: {e}")
            }
        },
        AdminAction::Blacklist(user, on) => {
            reports
                .bounded_store(reports.store().put_setting(
                    user,
                    Setting::FeedbackBlacklisted,
                    encode_flag(on),
                ))
                .await?;
            let verb = if on { "blacklisted" } else { "unblacklisted" };
            format!("{user} {verb}.")
        }
    };

    feedback_channel
        .send_message(&ctx.http, CreateMessage::new().content(ack))
        .await?;
    Ok(())
}
