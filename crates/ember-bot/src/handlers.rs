//! Update dispatch: private messages, commands and inline button presses.

use anyhow::{Context, Result};
use ember_core::policy::{Effect, best_effort};
use ember_core::render::{self, CallbackAction};
use ember_core::{ExtendOutcome, OpenOutcome, OutgoingMessage, PublishRequest};
use ember_telegram::{CallbackQuery, Message, Update};
use ember_types::{ChatId, ExtensionKind, MailboxId, NewDelayedItem, PostKey, Role, UserId};
use tracing::{debug, info, warn};

use crate::app::App;

const HELP: &str = "Send any text and it is posted anonymously to your mailbox.\n\
/start <mailbox> picks the mailbox\n\
/later <text> posts after a short delay\n\
/ttl picks how long your next post lives\n\
/end closes the current dialog";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(Option<MailboxId>),
    Later(String),
    End,
    Help,
    AddBox { channel_id: ChatId, title: String },
    StatDay { mailbox_id: MailboxId, day: u32, time: String },
    Grant { user_id: UserId, role: Role },
    Ttl,
    /// `mailbox_id: None` applies to every mailbox.
    Cooldown { mailbox_id: Option<MailboxId>, hours: i64, alias: String },
    Uncooldown { mailbox_id: Option<MailboxId>, alias: String },
    /// `kinds: None` restores the default buttons.
    Buttons { mailbox_id: MailboxId, kinds: Option<Vec<ExtensionKind>> },
    Backup,
    /// Known command with unusable arguments.
    Usage(&'static str),
    Unknown,
}

impl Command {
    /// Parse a `/command args` line. Returns `None` for plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        // "/start@ember_bot" in groups
        let name = head.split('@').next().unwrap_or(head);
        let args = args.trim();
        let mut words = args.split_whitespace();

        let cmd = match name {
            "start" => Self::Start(args.parse().ok()),
            "later" if args.is_empty() => Self::Usage("/later <text>"),
            "later" => Self::Later(args.to_string()),
            "end" => Self::End,
            "help" => Self::Help,
            "addbox" => {
                let channel_id = words.next().and_then(|w| w.parse().ok());
                let title = words.collect::<Vec<_>>().join(" ");
                match channel_id {
                    Some(channel_id) if !title.is_empty() => Self::AddBox { channel_id, title },
                    _ => Self::Usage("/addbox <channel_id> <title>"),
                }
            }
            "statday" => {
                let parsed = (|| {
                    let mailbox_id = words.next()?.parse().ok()?;
                    let day = words.next()?.parse().ok()?;
                    let time = words.next()?.to_string();
                    Some(Self::StatDay { mailbox_id, day, time })
                })();
                parsed.unwrap_or(Self::Usage("/statday <mailbox> <1-7> <HH:MM>"))
            }
            "grant" => {
                let parsed = (|| {
                    let user_id = words.next()?.parse().ok()?;
                    let role = words.next()?.parse().ok()?;
                    Some(Self::Grant { user_id, role })
                })();
                parsed.unwrap_or(Self::Usage("/grant <user_id> <user|admin|superadmin>"))
            }
            "ttl" => Self::Ttl,
            "cooldown" => {
                let parsed = (|| {
                    let mailbox_id = parse_scope(words.next()?)?;
                    let hours = words.next()?.parse().ok().filter(|h| (1..=24 * 365).contains(h))?;
                    let alias = words.collect::<Vec<_>>().join(" ");
                    (!alias.is_empty()).then_some(Self::Cooldown { mailbox_id, hours, alias })
                })();
                parsed.unwrap_or(Self::Usage("/cooldown <mailbox|all> <hours> <alias>"))
            }
            "uncooldown" => {
                let parsed = (|| {
                    let mailbox_id = parse_scope(words.next()?)?;
                    let alias = words.collect::<Vec<_>>().join(" ");
                    (!alias.is_empty()).then_some(Self::Uncooldown { mailbox_id, alias })
                })();
                parsed.unwrap_or(Self::Usage("/uncooldown <mailbox|all> <alias>"))
            }
            "buttons" => {
                let parsed = (|| {
                    let mailbox_id = words.next()?.parse().ok()?;
                    let kinds = match words.collect::<String>().as_str() {
                        "default" => None,
                        raw => Some(ExtensionKind::parse_list(raw).ok().filter(|k| !k.is_empty())?),
                    };
                    Some(Self::Buttons { mailbox_id, kinds })
                })();
                parsed.unwrap_or(Self::Usage("/buttons <mailbox> <1h,12h,...|default>"))
            }
            "backup" => Self::Backup,
            _ => Self::Unknown,
        };
        Some(cmd)
    }

    fn required_role(&self) -> Role {
        match self {
            Self::AddBox { .. }
            | Self::StatDay { .. }
            | Self::Cooldown { .. }
            | Self::Uncooldown { .. }
            | Self::Buttons { .. }
            | Self::Backup => Role::Admin,
            Self::Grant { .. } => Role::Superadmin,
            _ => Role::User,
        }
    }
}

/// "all" or a mailbox id.
fn parse_scope(word: &str) -> Option<Option<MailboxId>> {
    match word {
        "all" => Some(None),
        id => id.parse().ok().map(Some),
    }
}

/// Handle one update. Errors are logged here so one bad update never stops
/// the ingress.
pub async fn dispatch(app: &App, update: Update) {
    let id = update.update_id;
    let result = if let Some(msg) = update.message {
        handle_message(app, msg).await
    } else if let Some(cb) = update.callback_query {
        handle_callback(app, cb).await
    } else {
        Ok(())
    };
    if let Err(e) = result {
        warn!(update = id, error = %e, "Update handling failed");
    }
}

async fn handle_message(app: &App, msg: Message) -> Result<()> {
    if !msg.is_private() {
        return Ok(());
    }
    let Some(user_id) = msg.from.as_ref().filter(|u| !u.is_bot).map(|u| u.id) else {
        return Ok(());
    };
    app.roles.register(user_id)?;

    let Some(text) = msg.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        reply(app, user_id, "Only text messages are supported.").await;
        return Ok(());
    };

    if let Some(cmd) = Command::parse(text) {
        return handle_command(app, user_id, cmd).await;
    }

    if let Some(quoted) = &msg.reply_to_message {
        if app.relays.handle_reply(user_id, quoted.message_id, text).await? {
            return Ok(());
        }
    }
    if app.relays.pipe(user_id, text).await? {
        return Ok(());
    }
    publish_now(app, user_id, text).await
}

async fn handle_command(app: &App, user_id: UserId, cmd: Command) -> Result<()> {
    let role = app.roles.role_of(user_id)?;
    if role < cmd.required_role() {
        reply(app, user_id, "Not allowed.").await;
        return Ok(());
    }

    match cmd {
        Command::Start(None) | Command::Help => reply(app, user_id, HELP).await,
        Command::Start(Some(mailbox_id)) => match app.db.get_mailbox(mailbox_id)? {
            Some(mailbox) => {
                app.db.set_active_mailbox(user_id, mailbox.id)?;
                reply(
                    app,
                    user_id,
                    &format!("You are writing to «{}». Send text to post it.", mailbox.title),
                )
                .await;
            }
            None => reply(app, user_id, "No such mailbox.").await,
        },
        Command::Later(text) => schedule_later(app, user_id, &text).await?,
        Command::End => {
            let text = match app.relays.end_for(user_id).await? {
                Some(peer) => format!("Dialog with «{peer}» closed."),
                None => "You have no active dialog.".to_string(),
            };
            reply(app, user_id, &text).await;
        }
        Command::AddBox { channel_id, title } => {
            let text = match app.db.create_mailbox(&title, channel_id, user_id) {
                Ok(id) => {
                    info!(mailbox = id, channel_id, "Mailbox created");
                    format!("Mailbox «{title}» created with id {id}.")
                }
                Err(e) => format!("Could not create mailbox: {e}"),
            };
            reply(app, user_id, &text).await;
        }
        Command::StatDay { mailbox_id, day, time } => {
            let text = match app.db.set_stats_schedule(mailbox_id, day, &time) {
                Ok(true) => format!("Weekly stats for mailbox {mailbox_id}: day {day} at {time}."),
                Ok(false) => "No such mailbox.".to_string(),
                Err(e) => e.to_string(),
            };
            reply(app, user_id, &text).await;
        }
        Command::Grant { user_id: target, role } => {
            app.roles.grant(target, role)?;
            reply(app, user_id, &format!("User {target} is now {}.", role.as_str())).await;
        }
        Command::Ttl => {
            let ttl = next_ttl(app, user_id)?;
            let menu = OutgoingMessage::plain(user_id, ttl_menu_text(ttl))
                .with_keyboard(render::ttl_keyboard(ttl, app.max_ttl_seconds));
            if let Err(e) = app.gateway.send_message(menu).await {
                warn!(user_id, error = %e, "Could not send TTL menu");
            }
        }
        Command::Cooldown { mailbox_id, hours, alias } => {
            let until = app.clock.now() + hours * 3600;
            let text = match app.db.set_cooldown_by_alias(&alias, mailbox_id, until)? {
                0 => format!("Nobody has used the alias «{alias}»."),
                n => {
                    info!(?mailbox_id, hours, users = n, "Cooldown issued");
                    format!("«{alias}» is on cooldown {} for {hours}h.", scope_text(mailbox_id))
                }
            };
            reply(app, user_id, &text).await;
        }
        Command::Uncooldown { mailbox_id, alias } => {
            let n = app.db.remove_cooldowns_by_alias(&alias, mailbox_id)?;
            let text = if n == 0 {
                format!("«{alias}» has no cooldown {}.", scope_text(mailbox_id))
            } else {
                format!("Cooldown lifted for «{alias}» {}.", scope_text(mailbox_id))
            };
            reply(app, user_id, &text).await;
        }
        Command::Buttons { mailbox_id, kinds } => {
            let text = match app.db.set_mailbox_buttons(mailbox_id, kinds.as_deref())? {
                false => "No such mailbox.".to_string(),
                true => match kinds {
                    Some(kinds) => format!(
                        "Mailbox {mailbox_id} now shows {}.",
                        ExtensionKind::join_list(&kinds)
                    ),
                    None => format!("Mailbox {mailbox_id} uses the default buttons."),
                },
            };
            reply(app, user_id, &text).await;
        }
        Command::Backup => {
            let backups = app.backups.clone();
            let local = app.clock.local_now();
            let result = tokio::task::spawn_blocking(move || backups.run_now(local))
                .await
                .context("backup task panicked")?;
            let text = match result {
                Ok(path) => format!("Backup written to {}", path.display()),
                Err(e) => format!("Backup failed: {e}"),
            };
            reply(app, user_id, &text).await;
        }
        Command::Usage(usage) => reply(app, user_id, &format!("Usage: {usage}")).await,
        Command::Unknown => reply(app, user_id, HELP).await,
    }
    Ok(())
}

async fn publish_now(app: &App, user_id: UserId, text: &str) -> Result<()> {
    let Some(mailbox_id) = app.db.active_mailbox(user_id)? else {
        reply(app, user_id, "Pick a mailbox first: /start <mailbox>").await;
        return Ok(());
    };
    let Some(mailbox) = app.db.get_mailbox(mailbox_id)? else {
        reply(app, user_id, "That mailbox no longer exists. Pick another with /start.").await;
        return Ok(());
    };
    if refuse_on_cooldown(app, user_id, mailbox.id).await? {
        return Ok(());
    }
    let alias = app.aliases.alias_for(user_id)?;

    let req = PublishRequest {
        channel_id: mailbox.channel_id,
        author_id: user_id,
        alias,
        text: text.to_string(),
        ttl_seconds: next_ttl(app, user_id)?,
    };
    match app.lifecycle.publish(req).await {
        Ok(post) => {
            app.db.set_post_ttl(user_id, None)?;
            let when = render::burn_time(app.clock.as_ref(), post.delete_at);
            reply(app, user_id, &format!("Posted to «{}». It burns at {when}.", mailbox.title)).await;
        }
        Err(e) => {
            warn!(user_id, error = %e, "Publish failed");
            reply(app, user_id, "Could not post right now. Try again in a moment.").await;
        }
    }
    Ok(())
}

async fn schedule_later(app: &App, user_id: UserId, text: &str) -> Result<()> {
    let Some(mailbox_id) = app.db.active_mailbox(user_id)? else {
        reply(app, user_id, "Pick a mailbox first: /start <mailbox>").await;
        return Ok(());
    };
    if refuse_on_cooldown(app, user_id, mailbox_id).await? {
        return Ok(());
    }
    let alias = app.aliases.alias_for(user_id)?;
    let run_at = app.clock.now() + app.delayed_send_seconds;
    let id = app.db.enqueue_delayed(&NewDelayedItem {
        user_id,
        mailbox_id,
        text: text.to_string(),
        ttl_seconds: next_ttl(app, user_id)?,
        alias,
        run_at,
    })?;
    app.db.set_post_ttl(user_id, None)?;

    let notice = OutgoingMessage::plain(
        user_id,
        format!("Scheduled. It goes out at {}.", render::burn_time(app.clock.as_ref(), run_at)),
    )
    .with_keyboard(render::cancel_keyboard(id));
    match app.gateway.send_message(notice).await {
        Ok(message_id) => app.db.set_cancel_message(id, message_id)?,
        Err(e) => warn!(item = id, error = %e, "Could not send cancel button"),
    }
    debug!(item = id, run_at, "Delayed post queued");
    Ok(())
}

/// TTL for the user's next post: their pick, capped, or the default.
fn next_ttl(app: &App, user_id: UserId) -> Result<i64> {
    let picked = app.db.post_ttl(user_id)?;
    Ok(picked.unwrap_or(app.default_ttl_seconds).min(app.max_ttl_seconds))
}

fn ttl_menu_text(ttl: i64) -> String {
    format!("Your next post burns {} after it is published.", render::format_duration(ttl))
}

fn scope_text(mailbox_id: Option<MailboxId>) -> String {
    match mailbox_id {
        Some(id) => format!("in mailbox {id}"),
        None => "in every mailbox".to_string(),
    }
}

/// Tell the user about an active cooldown. Returns true if posting is blocked.
async fn refuse_on_cooldown(app: &App, user_id: UserId, mailbox_id: MailboxId) -> Result<bool> {
    let now = app.clock.now();
    let Some(cooldown) = app.db.active_cooldown(user_id, mailbox_id, now)? else {
        return Ok(false);
    };
    debug!(user_id, mailbox_id, until = cooldown.until, "Post refused, user on cooldown");
    let text = format!(
        "You are on cooldown {} for another {}. Ask an admin to lift it.",
        scope_text(cooldown.mailbox_id),
        render::format_duration(cooldown.remaining(now))
    );
    reply(app, user_id, &text).await;
    Ok(true)
}

/// Apply a TTL picker press and redraw the picker in place.
async fn adjust_ttl(app: &App, user_id: UserId, step: Option<ExtensionKind>, menu: Option<PostKey>) -> Result<String> {
    let ttl = match step {
        Some(step) => (next_ttl(app, user_id)? + step.seconds()).min(app.max_ttl_seconds),
        None => app.default_ttl_seconds,
    };
    app.db.set_post_ttl(user_id, step.is_some().then_some(ttl))?;

    if let Some(key) = menu {
        let keyboard = render::ttl_keyboard(ttl, app.max_ttl_seconds);
        best_effort(
            Effect::MenuRefresh,
            app.gateway
                .edit_message_text(key.chat_id, key.message_id, &ttl_menu_text(ttl), Some(&keyboard))
                .await,
        );
    }
    Ok(format!("Next post: {}", render::format_duration(ttl)))
}

async fn handle_callback(app: &App, cb: CallbackQuery) -> Result<()> {
    let user_id = cb.from.id;
    let action = cb.data.as_deref().and_then(|d| d.parse::<CallbackAction>().ok());
    let source = cb.message.as_ref().map(|m| PostKey::new(m.chat.id, m.message_id));

    let (text, alert) = match (action, source) {
        (Some(CallbackAction::Extend(kind)), Some(key)) => extend(app, key, user_id, kind).await?,
        (Some(CallbackAction::Contact), Some(key)) => contact(app, key, user_id).await?,
        (Some(CallbackAction::CancelDelayed(id)), source) => {
            if app.db.cancel_delayed(id, user_id)? {
                if let Some(key) = source {
                    best_effort(
                        Effect::DelayedNotice,
                        app.gateway.delete_message(key.chat_id, key.message_id).await,
                    );
                }
                ("Cancelled.".to_string(), false)
            } else {
                ("Already sent or cancelled.".to_string(), false)
            }
        }
        (Some(CallbackAction::AddTtl(step)), menu) => (adjust_ttl(app, user_id, Some(step), menu).await?, false),
        (Some(CallbackAction::ResetTtl), menu) => (adjust_ttl(app, user_id, None, menu).await?, false),
        _ => ("This button is no longer valid.".to_string(), false),
    };

    if let Err(e) = app.gateway.answer_callback(&cb.id, Some(&text), alert).await {
        debug!(error = %e, "Callback answer failed");
    }
    Ok(())
}

async fn extend(app: &App, key: PostKey, user_id: UserId, kind: ExtensionKind) -> Result<(String, bool)> {
    let outcome = app.lifecycle.toggle_extension(key, user_id, kind).await?;
    let alert = matches!(outcome, ExtendOutcome::Refused);
    Ok((outcome.message().to_string(), alert))
}

async fn contact(app: &App, key: PostKey, user_id: UserId) -> Result<(String, bool)> {
    let Some(post) = app.db.get_post(key)? else {
        return Ok(("This post has already burned.".to_string(), false));
    };
    let requester_alias = app.aliases.alias_for(user_id)?;
    let outcome = app
        .relays
        .open_dialog(post.author_id, user_id, &post.alias, &requester_alias)
        .await?;

    let text = match outcome {
        OpenOutcome::Opened { .. } if outcome.success() => "Dialog opened. Check your private messages.",
        OpenOutcome::Opened {
            author_notified: false, ..
        } => "Dialog opened, but the author could not be reached yet.",
        OpenOutcome::Opened { .. } => "Dialog opened, but I could not message you. Start a private chat with the bot.",
        OpenOutcome::Busy { .. } => "One of you is already in a dialog. Try again later.",
        OpenOutcome::SelfContact => "That is your own post.",
    };
    Ok((text.to_string(), !outcome.success()))
}

async fn reply(app: &App, chat_id: ChatId, text: &str) {
    if let Err(e) = app.gateway.send_message(OutgoingMessage::plain(chat_id, text)).await {
        warn!(chat_id, error = %e, "Reply failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("/start 3"), Some(Command::Start(Some(3))));
        assert_eq!(Command::parse("/start@ember_bot"), Some(Command::Start(None)));
        assert_eq!(Command::parse("/later  see you soon "), Some(Command::Later("see you soon".into())));
        assert!(matches!(Command::parse("/later"), Some(Command::Usage(_))));
        assert_eq!(
            Command::parse("/addbox -100123 Night owls"),
            Some(Command::AddBox { channel_id: -100123, title: "Night owls".into() })
        );
        assert_eq!(
            Command::parse("/statday 2 7 21:30"),
            Some(Command::StatDay { mailbox_id: 2, day: 7, time: "21:30".into() })
        );
        assert!(matches!(Command::parse("/grant 5 king"), Some(Command::Usage(_))));
        assert_eq!(Command::parse("/grant 5 admin"), Some(Command::Grant { user_id: 5, role: Role::Admin }));
        assert_eq!(
            Command::parse("/cooldown all 24 Quiet Fox"),
            Some(Command::Cooldown { mailbox_id: None, hours: 24, alias: "Quiet Fox".into() })
        );
        assert_eq!(
            Command::parse("/uncooldown 3 Quiet Fox"),
            Some(Command::Uncooldown { mailbox_id: Some(3), alias: "Quiet Fox".into() })
        );
        assert!(matches!(Command::parse("/cooldown 3 0 Fox"), Some(Command::Usage(_))));
        assert!(matches!(Command::parse("/cooldown 3 5"), Some(Command::Usage(_))));
        assert_eq!(
            Command::parse("/buttons 2 30m, 6h"),
            Some(Command::Buttons {
                mailbox_id: 2,
                kinds: Some(vec![ExtensionKind::M30, ExtensionKind::H6])
            })
        );
        assert_eq!(Command::parse("/buttons 2 default"), Some(Command::Buttons { mailbox_id: 2, kinds: None }));
        assert!(matches!(Command::parse("/buttons 2 5h"), Some(Command::Usage(_))));
        assert_eq!(Command::parse("/ttl"), Some(Command::Ttl));
        assert_eq!(Command::parse("/dance"), Some(Command::Unknown));
    }

    #[test]
    fn admin_commands_need_roles() {
        assert_eq!(Command::Backup.required_role(), Role::Admin);
        assert_eq!(Command::Grant { user_id: 1, role: Role::User }.required_role(), Role::Superadmin);
        assert_eq!(Command::End.required_role(), Role::User);
        assert_eq!(Command::Ttl.required_role(), Role::User);
        assert_eq!(
            Command::Cooldown { mailbox_id: None, hours: 1, alias: "X".into() }.required_role(),
            Role::Admin
        );
    }
}
