//! `/db_backup`: Postgres dump of the n8n database.
//!
//! With `DB_BACKUP_SCRIPT` configured the script is run as-is and its output is
//! reported. Otherwise `pg_dump` runs inside the Postgres container and the
//! gzipped dump is sent as an attachment.

use std::{
    fs::File,
    io,
    path::Path,
    sync::Arc,
};

use flate2::{write::GzEncoder, Compression};

use crate::{
    archive::sha256_file,
    config::Config,
    docker::Docker,
    domain::ChatId,
    errors::Error,
    formatting::{code, escape_html, human_bytes},
    messaging::MessagingPort,
    ports::{CommandSpec, ProcessRunner},
    utils::file_timestamp_utc,
    workspace::RunWorkspace,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbBackupOutcome {
    /// The configured script ran; its combined output.
    Script { output: String },
    /// A dump was sent as `file_name`.
    Dump { file_name: String, bytes: u64 },
}

pub struct DbBackupService {
    cfg: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    docker: Docker,
}

impl DbBackupService {
    pub fn new(cfg: Arc<Config>, runner: Arc<dyn ProcessRunner>) -> Self {
        let docker = Docker::from_config(&cfg);
        Self {
            cfg,
            runner,
            docker,
        }
    }

    pub async fn run(&self, messenger: &dyn MessagingPort, chat_id: ChatId) -> Result<DbBackupOutcome> {
        if let Some(script) = &self.cfg.db_backup_script {
            let spec = CommandSpec::new(script.to_string_lossy()).secret(&self.cfg.db_password);
            let out = self.runner.run(&spec).await?;
            return Ok(DbBackupOutcome::Script {
                output: out.combined(),
            });
        }

        let ws = RunWorkspace::create(&self.cfg.temp_root, "db-backup")?;
        let container_path = format!("/tmp/n8nbot-dump-{}.sql", ws.run_id());
        let result = self.dump(&ws, &container_path, messenger, chat_id).await;
        self.remove_container_dump(&container_path).await;
        result
    }

    /// `pg_dump -f` inside the container, then `docker cp` the file out. The dump
    /// never passes through a text buffer, so non-UTF-8 data survives unchanged.
    async fn dump(
        &self,
        ws: &RunWorkspace,
        container_path: &str,
        messenger: &dyn MessagingPort,
        chat_id: ChatId,
    ) -> Result<DbBackupOutcome> {
        let container = &self.cfg.postgres_container;
        let spec = self.docker.exec_with_env(
            container,
            &[("PGPASSWORD", self.cfg.db_password.as_str())],
            [
                "pg_dump",
                "--clean",
                "--if-exists",
                "-U",
                self.cfg.db_user.as_str(),
                "-d",
                self.cfg.db_name.as_str(),
                "-f",
                container_path,
            ],
        );
        self.runner.run(&spec).await?;

        let raw = ws.join("dump.sql");
        self.runner
            .run(&self.docker.cp_from(container, container_path, &raw))
            .await?;
        let raw_len = std::fs::metadata(&raw).map(|m| m.len()).unwrap_or(0);
        if raw_len == 0 {
            return Err(Error::External("pg_dump produced an empty dump".to_string()));
        }

        let file_name = format!("{}-{}.sql.gz", self.cfg.db_name, file_timestamp_utc());
        let path = ws.join(&file_name);
        let gz_path = path.clone();
        tokio::task::spawn_blocking(move || gzip_file(&raw, &gz_path))
            .await
            .map_err(|e| Error::External(format!("compression task failed: {e}")))??;

        let bytes = std::fs::metadata(&path)?.len();
        let caption = format!(
            "🗄 <b>Postgres dump</b> of {}\nSize: {}\nSHA-256: {}",
            code(&self.cfg.db_name),
            escape_html(&human_bytes(bytes)),
            code(&sha256_file(&path)?)
        );
        messenger
            .send_document(chat_id, &path, &file_name, Some(&caption))
            .await?;

        Ok(DbBackupOutcome::Dump { file_name, bytes })
    }

    async fn remove_container_dump(&self, container_path: &str) {
        let spec = self
            .docker
            .exec(&self.cfg.postgres_container, ["rm", "-f", container_path]);
        if let Err(e) = self.runner.run(&spec).await {
            tracing::warn!(error = %e, path = container_path, "failed to remove container-side dump");
        }
    }
}

fn gzip_file(src: &Path, dest: &Path) -> Result<()> {
    let mut input = File::open(src)?;
    let mut enc = GzEncoder::new(File::create(dest)?, Compression::default());
    io::copy(&mut input, &mut enc)?;
    enc.finish()?;
    Ok(())
}
