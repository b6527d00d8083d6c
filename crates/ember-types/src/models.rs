use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;
pub type MailboxId = i64;
pub type RelayId = i64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid post key: {0}")]
    PostKey(String),
    #[error("unknown extension kind: {0}")]
    ExtensionKind(String),
    #[error("unknown role: {0}")]
    Role(String),
}

// -- Posts --

/// Identity of a published channel post. Stored in the extensions table as
/// `"{chat_id}:{message_id}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostKey {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl PostKey {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self { chat_id, message_id }
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.message_id)
    }
}

impl FromStr for PostKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chat, msg) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseError::PostKey(s.to_string()))?;
        let chat_id = chat.parse().map_err(|_| ParseError::PostKey(s.to_string()))?;
        let message_id = msg.parse().map_err(|_| ParseError::PostKey(s.to_string()))?;
        Ok(Self { chat_id, message_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub key: PostKey,
    pub author_id: UserId,
    /// Pseudonym shown under the post, fixed at publish time.
    pub alias: String,
    /// User text without the alias/expiry footer.
    pub base_text: String,
    pub base_delete_at: i64,
    pub delete_at: i64,
}

impl Post {
    pub fn remaining(&self, now: i64) -> i64 {
        (self.delete_at - now).max(0)
    }
}

// -- Extensions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    M15,
    M30,
    H1,
    H2,
    H3,
    H6,
    H12,
    H24,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 8] = [
        ExtensionKind::M15,
        ExtensionKind::M30,
        ExtensionKind::H1,
        ExtensionKind::H2,
        ExtensionKind::H3,
        ExtensionKind::H6,
        ExtensionKind::H12,
        ExtensionKind::H24,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H3 => "3h",
            Self::H6 => "6h",
            Self::H12 => "12h",
            Self::H24 => "24h",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            Self::M15 => 15 * 60,
            Self::M30 => 30 * 60,
            Self::H1 => 3600,
            Self::H2 => 2 * 3600,
            Self::H3 => 3 * 3600,
            Self::H6 => 6 * 3600,
            Self::H12 => 12 * 3600,
            Self::H24 => 24 * 3600,
        }
    }

    /// Short label for buttons, e.g. "+1h".
    pub fn label(self) -> String {
        format!("+{}", self.as_str())
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseError::ExtensionKind(s.to_string()))
    }
}

impl ExtensionKind {
    /// Parse a comma separated list such as `"1h, 12h"`. Blank entries are
    /// skipped; duplicates are kept once.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, ParseError> {
        let mut kinds = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    pub fn join_list(kinds: &[Self]) -> String {
        kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
    }
}

/// Active extension count per kind for one post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionCounts([u32; 8]);

impl ExtensionCounts {
    pub fn get(&self, kind: ExtensionKind) -> u32 {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: ExtensionKind, count: u32) {
        self.0[kind.index()] = count;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExtensionKind, u32)> + '_ {
        ExtensionKind::ALL.into_iter().map(|k| (k, self.get(k)))
    }

    pub fn total_seconds(&self) -> i64 {
        self.iter().map(|(k, n)| k.seconds() * i64::from(n)).sum()
    }
}

/// Result of a guarded extension toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Activated,
    Deactivated,
    /// Deactivation was refused; the row stays active.
    Refused,
}

// -- Relays --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub id: RelayId,
    pub a_user_id: UserId,
    pub b_user_id: UserId,
    pub a_alias: String,
    pub b_alias: String,
    pub expires_at: i64,
}

/// One participant's view of a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayView<'a> {
    pub own_alias: &'a str,
    pub peer_id: UserId,
    pub peer_alias: &'a str,
}

impl Relay {
    pub fn is_active(&self, now: i64) -> bool {
        now < self.expires_at
    }

    /// Resolve the peer for `user_id`. `None` if the user is not a participant.
    pub fn view_for(&self, user_id: UserId) -> Option<RelayView<'_>> {
        if user_id == self.a_user_id {
            Some(RelayView {
                own_alias: &self.a_alias,
                peer_id: self.b_user_id,
                peer_alias: &self.b_alias,
            })
        } else if user_id == self.b_user_id {
            Some(RelayView {
                own_alias: &self.b_alias,
                peer_id: self.a_user_id,
                peer_alias: &self.a_alias,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRelay {
    pub a_user_id: UserId,
    pub b_user_id: UserId,
    pub a_alias: String,
    pub b_alias: String,
    pub expires_at: i64,
}

// -- Delayed queue --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedItem {
    pub id: i64,
    pub user_id: UserId,
    pub mailbox_id: MailboxId,
    pub text: String,
    pub ttl_seconds: i64,
    pub alias: String,
    pub run_at: i64,
    pub cancel_message_id: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct NewDelayedItem {
    pub user_id: UserId,
    pub mailbox_id: MailboxId,
    pub text: String,
    pub ttl_seconds: i64,
    pub alias: String,
    pub run_at: i64,
}

// -- Mailboxes --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub id: MailboxId,
    pub title: String,
    pub channel_id: ChatId,
    pub creator_id: UserId,
    /// ISO weekday (1 = Monday) of the weekly stats broadcast.
    pub stat_day: Option<u32>,
    /// Local "HH:MM" of the weekly stats broadcast.
    pub stat_time: Option<String>,
    /// Local "YYYY-MM-DD HH:MM" of the last broadcast.
    pub stats_last_sent: Option<String>,
    /// Extension buttons on this mailbox's posts. `None` falls back to the
    /// configured default.
    pub extension_buttons: Option<Vec<ExtensionKind>>,
}

// -- Cooldowns --

/// Posting ban issued against an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cooldown {
    pub user_id: UserId,
    /// `None` bans the user from every mailbox.
    pub mailbox_id: Option<MailboxId>,
    pub alias: String,
    pub until: i64,
}

impl Cooldown {
    pub fn remaining(&self, now: i64) -> i64 {
        (self.until - now).max(0)
    }
}

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }

    pub fn is_admin(self) -> bool {
        self >= Role::Admin
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::Superadmin),
            other => Err(ParseError::Role(other.to_string())),
        }
    }
}
