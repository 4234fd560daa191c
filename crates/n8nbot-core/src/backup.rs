//! Workflow + configuration backup.
//!
//! Stages: export inside the n8n container, copy the export to the host, add the
//! configured config files, archive, send. The run workspace holding the staging
//! folder and the archive is removed when [`BackupService::run`] returns, and the
//! container-side export folder is removed best-effort afterwards.

use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    archive::{list_files, write_archive, ArchiveSummary},
    config::Config,
    docker::Docker,
    domain::ChatId,
    errors::Error,
    formatting::{code, escape_html, human_bytes},
    messaging::MessagingPort,
    pipeline::Pipeline,
    ports::ProcessRunner,
    utils::file_timestamp_utc,
    workspace::RunWorkspace,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupStage {
    Export,
    CopyOut,
    CollectConfig,
    Archive,
    Send,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupStage::Export => "export",
            BackupStage::CopyOut => "copy",
            BackupStage::CollectConfig => "collect-config",
            BackupStage::Archive => "archive",
            BackupStage::Send => "send",
        };
        f.write_str(s)
    }
}

/// What a successful backup delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupReport {
    pub file_name: String,
    pub workflows: usize,
    pub credentials: usize,
    pub config_files: Vec<PathBuf>,
    pub archive: ArchiveSummary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackupOutcome {
    Sent(BackupReport),
    /// The export produced no workflow files; no archive was created.
    NothingToBackup,
}

pub struct BackupService {
    cfg: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    docker: Docker,
}

impl BackupService {
    pub fn new(cfg: Arc<Config>, runner: Arc<dyn ProcessRunner>) -> Self {
        let docker = Docker::from_config(&cfg);
        Self {
            cfg,
            runner,
            docker,
        }
    }

    pub async fn run(&self, messenger: &dyn MessagingPort, chat_id: ChatId) -> Result<BackupOutcome> {
        let ws = RunWorkspace::create(&self.cfg.temp_root, "backup")?;
        let mut pipeline = Pipeline::new("backup", ws.run_id().as_str());
        let export_dir = format!("/tmp/n8nbot-export-{}", ws.run_id());

        let result = self
            .run_stages(&mut pipeline, &ws, &export_dir, messenger, chat_id)
            .await;

        self.remove_container_export(&export_dir).await;
        result
    }

    async fn run_stages(
        &self,
        p: &mut Pipeline<BackupStage>,
        ws: &RunWorkspace,
        export_dir: &str,
        messenger: &dyn MessagingPort,
        chat_id: ChatId,
    ) -> Result<BackupOutcome> {
        let stamp = file_timestamp_utc();
        let staging = ws.subdir(&format!("n8n-backup-{stamp}"))?;

        p.step(BackupStage::Export, self.export(export_dir)).await?;
        p.step(BackupStage::CopyOut, self.copy_out(export_dir, &staging))
            .await?;

        let workflows = count_json(&staging.join("workflows"))?;
        if workflows == 0 {
            tracing::info!(run_id = %ws.run_id(), "no workflows exported; skipping archive");
            return Ok(BackupOutcome::NothingToBackup);
        }
        let credentials = count_json(&staging.join("credentials"))?;

        let config_files = p
            .step(BackupStage::CollectConfig, async {
                collect_config_files(&self.cfg.backup_config_files, &staging.join("config"))
            })
            .await?;

        let file_name = format!("n8n-backup-{stamp}.{}", self.cfg.backup_format.extension());
        let archive_path = ws.join(&file_name);
        let archive = p
            .step(
                BackupStage::Archive,
                archive_in_background(staging.clone(), archive_path.clone(), self.cfg.backup_format),
            )
            .await?;

        let report = BackupReport {
            file_name,
            workflows,
            credentials,
            config_files,
            archive,
        };
        let caption = backup_caption(&self.cfg, &report);
        p.step(
            BackupStage::Send,
            messenger.send_document(chat_id, &archive_path, &report.file_name, Some(&caption)),
        )
        .await?;

        Ok(BackupOutcome::Sent(report))
    }

    async fn export(&self, export_dir: &str) -> Result<()> {
        let container = &self.cfg.n8n_container;
        let workflows_dir = format!("{export_dir}/workflows/");
        let credentials_dir = format!("{export_dir}/credentials/");

        self.runner
            .run(&self.docker.exec(
                container,
                ["mkdir", "-p", workflows_dir.as_str(), credentials_dir.as_str()],
            ))
            .await?;

        let workflows = self.docker.exec(
            container,
            [
                "n8n".to_string(),
                "export:workflow".to_string(),
                "--backup".to_string(),
                format!("--output={workflows_dir}"),
            ],
        );
        tolerate_empty(self.runner.run(&workflows).await, "No workflows found")?;

        if self.cfg.backup_include_credentials {
            let credentials = self.docker.exec(
                container,
                [
                    "n8n".to_string(),
                    "export:credentials".to_string(),
                    "--backup".to_string(),
                    format!("--output={credentials_dir}"),
                ],
            );
            tolerate_empty(self.runner.run(&credentials).await, "No credentials found")?;
        }
        Ok(())
    }

    async fn copy_out(&self, export_dir: &str, staging: &Path) -> Result<()> {
        // Trailing `/.` copies the folder contents rather than the folder itself.
        let src = format!("{export_dir}/.");
        self.runner
            .run(&self.docker.cp_from(&self.cfg.n8n_container, &src, staging))
            .await?;
        Ok(())
    }

    async fn remove_container_export(&self, export_dir: &str) {
        let spec = self
            .docker
            .exec(&self.cfg.n8n_container, ["rm", "-rf", export_dir]);
        if let Err(e) = self.runner.run(&spec).await {
            tracing::warn!(error = %e, dir = export_dir, "failed to remove container-side export");
        }
    }
}

/// n8n exits non-zero when there is nothing to export; that is not a failure here.
fn tolerate_empty(
    res: Result<crate::ports::ProcessOutput>,
    empty_marker: &str,
) -> Result<()> {
    match res {
        Ok(_) => Ok(()),
        Err(Error::CommandFailed { stderr, .. }) if stderr.contains(empty_marker) => Ok(()),
        Err(e) => Err(e),
    }
}

fn count_json(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    Ok(list_files(dir)?
        .iter()
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .count())
}

/// Copy every configured file that exists into `dest`. Missing files are skipped.
fn collect_config_files(files: &[PathBuf], dest: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    let mut used: HashSet<String> = HashSet::new();
    let mut included = Vec::new();

    for src in files {
        if !src.is_file() {
            tracing::debug!(path = %src.display(), "config file not present; skipping");
            continue;
        }
        let base = src
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "config".to_string());
        let mut name = base.clone();
        let mut n = 1;
        while !used.insert(name.clone()) {
            n += 1;
            name = format!("{n}-{base}");
        }
        fs::copy(src, dest.join(&name))?;
        included.push(src.clone());
    }
    Ok(included)
}

async fn archive_in_background(
    src: PathBuf,
    dest: PathBuf,
    format: crate::archive::ArchiveFormat,
) -> Result<ArchiveSummary> {
    tokio::task::spawn_blocking(move || write_archive(&src, &dest, format))
        .await
        .map_err(|e| Error::External(format!("archive task failed: {e}")))?
}

fn backup_caption(cfg: &Config, report: &BackupReport) -> String {
    let mut lines = vec![
        format!("📦 <b>n8n backup</b> ({})", escape_html(&cfg.n8n_domain)),
        format!("Workflows: {}", report.workflows),
    ];
    if cfg.backup_include_credentials {
        lines.push(format!("Credentials: {} (encrypted)", report.credentials));
    }
    lines.push(format!("Config files: {}", report.config_files.len()));
    lines.push(format!("Size: {}", human_bytes(report.archive.bytes)));
    lines.push(format!("SHA-256: {}", code(&report.archive.sha256)));
    lines.join("\n")
}
