/// The fixed set of chat commands the bot answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotCommand {
    Start,
    Help,
    Status,
    Logs,
    Backup,
    Update,
    DbBackup,
}

impl BotCommand {
    /// Parse the first token of a chat message.
    ///
    /// Matching is case-sensitive. Telegram may send `/cmd@botname ...`; the bot
    /// suffix and any trailing arguments are ignored. Anything that is not one of
    /// the known commands yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or("");

        match name {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "logs" => Some(Self::Logs),
            "backup" | "backups" => Some(Self::Backup),
            "update" => Some(Self::Update),
            "db_backup" => Some(Self::DbBackup),
            _ => None,
        }
    }

    /// Canonical command name (without the slash).
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Status => "status",
            Self::Logs => "logs",
            Self::Backup => "backup",
            Self::Update => "update",
            Self::DbBackup => "db_backup",
        }
    }

    /// Human label used in "❌ <label> failed" replies.
    pub fn action_label(self) -> &'static str {
        match self {
            Self::Start | Self::Help => "Help",
            Self::Status => "Status check",
            Self::Logs => "Log retrieval",
            Self::Backup => "Backup",
            Self::Update => "Update",
            Self::DbBackup => "Database backup",
        }
    }

    /// `(name, description)` pairs for the Telegram command menu and `/start`.
    pub fn menu() -> &'static [(&'static str, &'static str)] {
        &[
            ("start", "Show available commands"),
            ("status", "Server uptime and container status"),
            ("logs", "Tail the n8n container logs"),
            ("backup", "Export workflows + config as an archive"),
            ("update", "Update n8n to the latest image"),
            ("db_backup", "Dump the Postgres database"),
        ]
    }
}
