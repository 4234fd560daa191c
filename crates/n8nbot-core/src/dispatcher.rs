//! Command dispatcher: authorization gate, command parsing, one handler per message.
//!
//! Handler errors are reported to the chat as `❌ <action> failed:` followed by the
//! error text. If sending that reply fails as well, it is only logged.

use std::sync::Arc;

use crate::{
    backup::{BackupOutcome, BackupService},
    command::BotCommand,
    config::Config,
    db_backup::{DbBackupOutcome, DbBackupService},
    docker::{host_uptime, parse_ps_json, ContainerInfo, Docker},
    domain::{ChatId, IncomingMessage},
    formatting::{code, escape_html, failure_html, human_bytes},
    messaging::MessagingPort,
    ports::ProcessRunner,
    report::deliver_report,
    security::{is_authorized, UnauthorizedPolicy, DENIAL_MESSAGE},
    update::{UpdateOutcome, UpdateService},
    utils::file_timestamp_utc,
    Result,
};

pub struct Dispatcher {
    cfg: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    messenger: Arc<dyn MessagingPort>,
    docker: Docker,
    backup: BackupService,
    db_backup: DbBackupService,
    update: UpdateService,
}

impl Dispatcher {
    pub fn new(
        cfg: Arc<Config>,
        runner: Arc<dyn ProcessRunner>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            docker: Docker::from_config(&cfg),
            backup: BackupService::new(cfg.clone(), runner.clone()),
            db_backup: DbBackupService::new(cfg.clone(), runner.clone()),
            update: UpdateService::new(cfg.clone(), runner.clone()),
            cfg,
            runner,
            messenger,
        }
    }

    pub fn messenger(&self) -> Arc<dyn MessagingPort> {
        self.messenger.clone()
    }

    pub async fn handle(&self, msg: IncomingMessage) {
        let chat_id = msg.chat_id;

        if !is_authorized(&msg.sender, &self.cfg.operator_id) {
            tracing::warn!(
                chat_id = chat_id.0,
                sender = %msg.sender,
                username = msg.username.as_deref().unwrap_or("-"),
                "unauthorized message"
            );
            if self.cfg.unauthorized_policy == UnauthorizedPolicy::Reply {
                self.reply_text(chat_id, DENIAL_MESSAGE).await;
            }
            return;
        }

        let Some(cmd) = BotCommand::parse(&msg.text) else {
            tracing::debug!(chat_id = chat_id.0, "ignoring non-command text");
            return;
        };

        tracing::info!(chat_id = chat_id.0, command = cmd.name(), "handling command");
        if let Err(e) = self.run_command(cmd, chat_id).await {
            tracing::error!(chat_id = chat_id.0, command = cmd.name(), error = %e, "command failed");
            self.reply_html(chat_id, &failure_html(cmd.action_label(), &e.to_string()))
                .await;
        }
    }

    async fn run_command(&self, cmd: BotCommand, chat_id: ChatId) -> Result<()> {
        match cmd {
            BotCommand::Start | BotCommand::Help => {
                self.messenger.send_html(chat_id, &help_html()).await?;
            }
            BotCommand::Status => self.status(chat_id).await?,
            BotCommand::Logs => self.logs(chat_id).await?,
            BotCommand::Backup => self.backup(chat_id).await?,
            BotCommand::Update => self.update(chat_id).await?,
            BotCommand::DbBackup => self.db_backup(chat_id).await?,
        }
        Ok(())
    }

    async fn status(&self, chat_id: ChatId) -> Result<()> {
        let quick = self.cfg.quick_command_timeout;
        let uptime_spec = host_uptime(quick);
        let ps_spec = self.docker.ps_json().timeout(quick);
        let (uptime, ps) = tokio::try_join!(
            self.runner.run(&uptime_spec),
            self.runner.run(&ps_spec)
        )?;

        let body = format!(
            "Uptime: {}\n\n{}",
            uptime.stdout.trim(),
            container_listing(&ps.stdout)
        );
        deliver_report(
            self.messenger.as_ref(),
            chat_id,
            "🖥 Server status",
            &body,
            self.cfg.inline_report_limit,
            &self.cfg.temp_root,
            &format!("status-{}", file_timestamp_utc()),
        )
        .await?;
        Ok(())
    }

    async fn logs(&self, chat_id: ChatId) -> Result<()> {
        let container = &self.cfg.n8n_container;
        let spec = self
            .docker
            .logs(container, self.cfg.log_tail_lines)
            .timeout(self.cfg.quick_command_timeout);
        let out = self.runner.run(&spec).await?;

        let title = format!(
            "📜 Last {} log lines of {container}",
            self.cfg.log_tail_lines
        );
        deliver_report(
            self.messenger.as_ref(),
            chat_id,
            &title,
            &out.combined(),
            self.cfg.inline_report_limit,
            &self.cfg.temp_root,
            &format!("{container}-logs-{}", file_timestamp_utc()),
        )
        .await?;
        Ok(())
    }

    async fn backup(&self, chat_id: ChatId) -> Result<()> {
        self.progress(chat_id, "📦 Backup started...").await;
        match self.backup.run(self.messenger.as_ref(), chat_id).await? {
            BackupOutcome::Sent(report) => {
                let html = format!(
                    "✅ Backup sent: {} ({})",
                    code(&report.file_name),
                    escape_html(&human_bytes(report.archive.bytes))
                );
                self.messenger.send_html(chat_id, &html).await?;
            }
            BackupOutcome::NothingToBackup => {
                self.messenger
                    .send_text(chat_id, "ℹ️ Nothing to back up: no workflows were exported.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn update(&self, chat_id: ChatId) -> Result<()> {
        self.progress(chat_id, "🔎 Checking for n8n updates...").await;
        let html = match self.update.run(self.messenger.as_ref(), chat_id).await? {
            UpdateOutcome::UpToDate { version } => {
                format!("✅ n8n is already up to date ({}).", code(&version))
            }
            UpdateOutcome::Updated { from, to, leftover, .. } => {
                let mut html = format!("✅ n8n updated from {} to {}.", code(&from), code(&to));
                if let Some(note) = leftover {
                    html.push_str(&format!("\n⚠️ {}", escape_html(&note)));
                }
                html
            }
            UpdateOutcome::Busy => "⏳ An update is already running.".to_string(),
        };
        self.messenger.send_html(chat_id, &html).await?;
        Ok(())
    }

    async fn db_backup(&self, chat_id: ChatId) -> Result<()> {
        self.progress(chat_id, "🗄 Database backup started...").await;
        match self.db_backup.run(self.messenger.as_ref(), chat_id).await? {
            DbBackupOutcome::Script { output } => {
                deliver_report(
                    self.messenger.as_ref(),
                    chat_id,
                    "✅ Database backup script finished",
                    &output,
                    self.cfg.inline_report_limit,
                    &self.cfg.temp_root,
                    &format!("db-backup-{}", file_timestamp_utc()),
                )
                .await?;
            }
            DbBackupOutcome::Dump { file_name, bytes } => {
                let html = format!(
                    "✅ Database dump sent: {} ({})",
                    code(&file_name),
                    escape_html(&human_bytes(bytes))
                );
                self.messenger.send_html(chat_id, &html).await?;
            }
        }
        Ok(())
    }

    /// Progress notices are informational; a failed send does not abort the command.
    async fn progress(&self, chat_id: ChatId, text: &str) {
        self.reply_text(chat_id, text).await;
    }

    async fn reply_text(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_text(chat_id, text).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to deliver reply");
        }
    }

    async fn reply_html(&self, chat_id: ChatId, html: &str) {
        if let Err(e) = self.messenger.send_html(chat_id, html).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to deliver reply");
        }
    }
}

fn help_html() -> String {
    let mut lines = vec!["🤖 <b>n8n operator bot</b>".to_string(), String::new()];
    for (name, description) in BotCommand::menu() {
        lines.push(format!("/{name} - {}", escape_html(description)));
    }
    lines.join("\n")
}

/// One line per container; falls back to the raw output when nothing parses.
fn container_listing(ps_output: &str) -> String {
    let rows = parse_ps_json(ps_output);
    if rows.is_empty() {
        let raw = ps_output.trim();
        return if raw.is_empty() {
            "No containers.".to_string()
        } else {
            raw.to_string()
        };
    }
    rows.iter().map(container_line).collect::<Vec<_>>().join("\n")
}

fn container_line(c: &ContainerInfo) -> String {
    let icon = if c.is_running() { "🟢" } else { "🔴" };
    format!("{icon} {} ({}): {}", c.names, c.image, c.status)
}
