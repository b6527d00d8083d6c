//! Text and keyboard rendering for channel posts and private notices.

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use ember_types::{ExtensionCounts, ExtensionKind};

use crate::clock::Clock;
use crate::gateway::{InlineButton, InlineKeyboard};

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// "HH:MM", with the short weekday appended when `ts` falls on another local day.
pub fn burn_time(clock: &dyn Clock, ts: i64) -> String {
    let at = clock.local(ts);
    let today = clock.local_now();
    if at.date_naive() == today.date_naive() {
        at.format("%H:%M").to_string()
    } else {
        format!("{} {}", at.format("%H:%M"), at.weekday())
    }
}

/// Channel post body: author text, alias and the burn footer.
pub fn post_text(clock: &dyn Clock, text: &str, alias: &str, delete_at: i64) -> String {
    format!(
        "{}\n\n<b>{}</b>\n🔥 Burns at {}",
        escape_html(text),
        escape_html(alias),
        burn_time(clock, delete_at)
    )
}

/// Extension buttons with live counts, plus a contact button for relay requests.
pub fn channel_keyboard(counts: &ExtensionCounts, kinds: &[ExtensionKind], allow_contact: bool) -> InlineKeyboard {
    let mut rows = Vec::new();
    let ext_row: Vec<InlineButton> = kinds
        .iter()
        .map(|&kind| {
            let n = counts.get(kind);
            let text = if n == 0 {
                kind.label()
            } else {
                format!("{} · {}", kind.label(), n)
            };
            InlineButton::new(text, CallbackAction::Extend(kind).to_string())
        })
        .collect();
    if !ext_row.is_empty() {
        rows.push(ext_row);
    }
    if allow_contact {
        rows.push(vec![InlineButton::new("💬 Write to author", CallbackAction::Contact.to_string())]);
    }
    InlineKeyboard { rows }
}

pub fn cancel_keyboard(item_id: i64) -> InlineKeyboard {
    InlineKeyboard::single_row(vec![InlineButton::new(
        "Cancel",
        CallbackAction::CancelDelayed(item_id).to_string(),
    )])
}

/// Steps offered when a user picks the lifetime of their next post.
pub const TTL_STEPS: [ExtensionKind; 6] = [
    ExtensionKind::M15,
    ExtensionKind::M30,
    ExtensionKind::H1,
    ExtensionKind::H6,
    ExtensionKind::H12,
    ExtensionKind::H24,
];

/// "45m", "2h", "1h 30m".
pub fn format_duration(seconds: i64) -> String {
    let minutes = seconds.max(0) / 60;
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// TTL picker: only steps that keep the total within `max_ttl`, three per
/// row, then a reset button.
pub fn ttl_keyboard(current_ttl: i64, max_ttl: i64) -> InlineKeyboard {
    let steps: Vec<InlineButton> = TTL_STEPS
        .into_iter()
        .filter(|step| current_ttl + step.seconds() <= max_ttl)
        .map(|step| InlineButton::new(step.label(), CallbackAction::AddTtl(step).to_string()))
        .collect();
    let mut rows: Vec<Vec<InlineButton>> = steps.chunks(3).map(<[InlineButton]>::to_vec).collect();
    rows.push(vec![InlineButton::new("Reset", CallbackAction::ResetTtl.to_string())]);
    InlineKeyboard { rows }
}

/// Payload carried in inline button callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Extend(ExtensionKind),
    Contact,
    CancelDelayed(i64),
    /// Add one of [`TTL_STEPS`] to the next post's lifetime.
    AddTtl(ExtensionKind),
    ResetTtl,
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extend(kind) => write!(f, "ext:{kind}"),
            Self::Contact => f.write_str("contact"),
            Self::CancelDelayed(id) => write!(f, "cancel_delay:{id}"),
            Self::AddTtl(step) => write!(f, "ttl_add:{}", step.seconds()),
            Self::ResetTtl => f.write_str("ttl_reset"),
        }
    }
}

impl FromStr for CallbackAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => return Ok(Self::Contact),
            "ttl_reset" => return Ok(Self::ResetTtl),
            _ => {}
        }
        match s.split_once(':') {
            Some(("ext", kind)) => kind.parse().map(Self::Extend).map_err(|_| ()),
            Some(("cancel_delay", id)) => id.parse().map(Self::CancelDelayed).map_err(|_| ()),
            Some(("ttl_add", secs)) => {
                let secs: i64 = secs.parse().map_err(|_| ())?;
                TTL_STEPS
                    .into_iter()
                    .find(|step| step.seconds() == secs)
                    .map(Self::AddTtl)
                    .ok_or(())
            }
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn footer_escapes_and_shows_weekday_only_for_other_days() {
        // 2026-10-17 is a Saturday.
        let clock = ManualClock::utc(1_792_195_200);
        let text = post_text(&clock, "a < b & c", "Quiet <Fox>", 1_792_195_200 + 3600);
        assert_eq!(text, "a &lt; b &amp; c\n\n<b>Quiet &lt;Fox&gt;</b>\n🔥 Burns at 01:00");

        let tomorrow = burn_time(&clock, 1_792_195_200 + 86_400 + 60);
        assert_eq!(tomorrow, "00:01 Sun");
    }

    #[test]
    fn keyboard_shows_counts() {
        let mut counts = ExtensionCounts::default();
        counts.set(ExtensionKind::H1, 2);
        let kb = channel_keyboard(&counts, &[ExtensionKind::H1, ExtensionKind::H12], true);
        let labels: Vec<&str> = kb.buttons().map(|b| b.text.as_str()).collect();
        assert_eq!(labels, vec!["+1h · 2", "+12h", "💬 Write to author"]);
        assert_eq!(kb.rows[0][0].callback_data, "ext:1h");
    }

    #[test]
    fn callback_parsing() {
        assert_eq!("ext:12h".parse(), Ok(CallbackAction::Extend(ExtensionKind::H12)));
        assert_eq!("contact".parse(), Ok(CallbackAction::Contact));
        assert_eq!("cancel_delay:7".parse(), Ok(CallbackAction::CancelDelayed(7)));
        assert_eq!("ttl_add:3600".parse(), Ok(CallbackAction::AddTtl(ExtensionKind::H1)));
        assert_eq!("ttl_reset".parse(), Ok(CallbackAction::ResetTtl));
        assert!("ttl_add:7200".parse::<CallbackAction>().is_err());
        assert!("ext:5h".parse::<CallbackAction>().is_err());
        assert!("bogus".parse::<CallbackAction>().is_err());
    }

    #[test]
    fn ttl_picker_hides_steps_past_the_cap() {
        let all = ttl_keyboard(900, 48 * 3600);
        assert_eq!(all.rows.len(), 3);
        assert_eq!(all.rows[0][0].callback_data, "ttl_add:900");

        let capped = ttl_keyboard(40 * 3600, 48 * 3600);
        let data: Vec<&str> = capped.buttons().map(|b| b.callback_data.as_str()).collect();
        assert_eq!(data, vec!["ttl_add:900", "ttl_add:1800", "ttl_add:3600", "ttl_add:21600", "ttl_reset"]);
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(format_duration(1200), "20m");
        assert_eq!(format_duration(7200), "2h");
        assert_eq!(format_duration(5400), "1h 30m");
        assert_eq!(format_duration(-5), "0m");
    }
}
