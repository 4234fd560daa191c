//! `/update`: replace the n8n container with the latest image.
//!
//! The installed and latest versions are compared as plain strings. When they
//! differ the image is pulled and the running container is swapped for a new one.
//! The old container is only renamed aside until the new one reports running; if
//! the new one fails to start it is removed and the old one is put back.

use std::{fmt, sync::Arc, sync::OnceLock, time::Duration};

use regex::Regex;
use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};

use crate::{
    backup::{BackupOutcome, BackupService},
    config::Config,
    docker::{npm_latest_version, Docker, RunSpec},
    domain::ChatId,
    errors::Error,
    formatting::code,
    messaging::MessagingPort,
    pipeline::Pipeline,
    ports::{CommandSpec, ProcessRunner},
    workspace::RunId,
    Result,
};

/// Consecutive "running" observations required before the new container counts as up.
const HEALTHY_POLLS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStage {
    VersionCheck,
    Backup,
    Pull,
    Stop,
    Rename,
    Run,
    HealthCheck,
    RemoveOld,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStage::VersionCheck => "version-check",
            UpdateStage::Backup => "backup",
            UpdateStage::Pull => "pull",
            UpdateStage::Stop => "stop",
            UpdateStage::Rename => "rename",
            UpdateStage::Run => "run",
            UpdateStage::HealthCheck => "health-check",
            UpdateStage::RemoveOld => "remove-old",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate {
        version: String,
    },
    Updated {
        from: String,
        to: String,
        backup: Option<BackupOutcome>,
        /// Set when the new container runs but the old one could not be removed.
        leftover: Option<String>,
    },
    /// Another update is still in progress.
    Busy,
}

pub struct UpdateService {
    cfg: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    docker: Docker,
    backup: BackupService,
    lock: Mutex<()>,
}

impl UpdateService {
    pub fn new(cfg: Arc<Config>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            docker: Docker::from_config(&cfg),
            backup: BackupService::new(cfg.clone(), runner.clone()),
            cfg,
            runner,
            lock: Mutex::new(()),
        }
    }

    pub async fn run(&self, messenger: &dyn MessagingPort, chat_id: ChatId) -> Result<UpdateOutcome> {
        let Ok(_guard) = self.lock.try_lock() else {
            return Ok(UpdateOutcome::Busy);
        };

        let run_id = RunId::generate();
        let mut p = Pipeline::new("update", run_id.as_str());

        let (installed, latest) = p.step(UpdateStage::VersionCheck, self.versions()).await?;
        if installed == latest {
            tracing::info!(version = %installed, "n8n already up to date");
            return Ok(UpdateOutcome::UpToDate { version: installed });
        }

        let notice = format!(
            "⏬ Updating n8n from {} to {}...",
            code(&installed),
            code(&latest)
        );
        if let Err(e) = messenger.send_html(chat_id, &notice).await {
            tracing::warn!(error = %e, "failed to send update progress message");
        }

        let backup = if self.cfg.backup_before_update {
            Some(
                p.step(UpdateStage::Backup, self.backup.run(messenger, chat_id))
                    .await?,
            )
        } else {
            None
        };

        let previous = format!("{}-previous-{run_id}", self.cfg.n8n_container);
        match self.replace(&mut p, &previous).await {
            Ok(leftover) => {
                let to = self.installed_version().await.unwrap_or(latest);
                Ok(UpdateOutcome::Updated {
                    from: installed,
                    to,
                    backup,
                    leftover,
                })
            }
            Err(err) => match self.roll_back(&p, &previous).await {
                Some(rollback) => Err(Error::UpdateFailed {
                    source: Box::new(err),
                    rollback,
                }),
                None => Err(err),
            },
        }
    }

    async fn versions(&self) -> Result<(String, String)> {
        let installed = self.installed_version().await?;
        let latest = self
            .runner
            .run(
                &npm_latest_version(&self.cfg.npm_bin, &self.cfg.n8n_package)
                    .timeout(self.cfg.quick_command_timeout),
            )
            .await?;
        let latest = normalize_version(&latest.stdout);
        if latest.is_empty() {
            return Err(Error::External(
                "registry returned an empty version".to_string(),
            ));
        }
        Ok((installed, latest))
    }

    async fn installed_version(&self) -> Result<String> {
        let spec = self
            .docker
            .exec(&self.cfg.n8n_container, ["n8n", "--version"])
            .timeout(self.cfg.quick_command_timeout);
        let out = self.runner.run(&spec).await?;
        let installed = normalize_version(&out.stdout);
        if installed.is_empty() {
            return Err(Error::External(format!(
                "{} reported an empty version",
                self.cfg.n8n_container
            )));
        }
        Ok(installed)
    }

    /// Pull → stop → rename aside → run → wait until running → drop the old one.
    async fn replace(&self, p: &mut Pipeline<UpdateStage>, previous: &str) -> Result<Option<String>> {
        let name = self.cfg.n8n_container.as_str();

        p.step(UpdateStage::Pull, self.exec(self.docker.pull(&self.cfg.n8n_image)))
            .await?;
        p.step(UpdateStage::Stop, self.exec(self.docker.stop(name)))
            .await?;
        p.step(UpdateStage::Rename, self.exec(self.docker.rename(name, previous)))
            .await?;
        p.step(
            UpdateStage::Run,
            self.exec(self.docker.run(&RunSpec::for_n8n(&self.cfg))),
        )
        .await?;
        p.step(UpdateStage::HealthCheck, self.wait_running(name))
            .await?;

        // The update already succeeded; a failed cleanup is only reported.
        match p
            .step(UpdateStage::RemoveOld, self.exec(self.docker.rm_force(previous)))
            .await
        {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(format!(
                "old container {previous} was left in place: {e}"
            ))),
        }
    }

    /// Undo whatever the replacement changed. `None` if nothing was changed.
    async fn roll_back(&self, p: &Pipeline<UpdateStage>, previous: &str) -> Option<String> {
        if !p.has_completed(UpdateStage::Pull) {
            return None;
        }
        let name = self.cfg.n8n_container.as_str();
        let renamed = p.has_completed(UpdateStage::Rename);
        tracing::warn!(container = name, renamed, "rolling back n8n update");

        let res: Result<()> = async {
            if renamed {
                // The new container may not exist if `run` failed early.
                if let Err(e) = self.exec(self.docker.rm_force(name)).await {
                    tracing::warn!(error = %e, "failed to remove new container during rollback");
                }
                self.exec(self.docker.rename(previous, name)).await?;
            }
            self.exec(self.docker.start(name)).await
        }
        .await;

        Some(match res {
            Ok(()) => "previous container restored and started".to_string(),
            Err(e) => {
                let kept = if renamed { previous } else { name };
                tracing::error!(error = %e, kept, "rollback failed");
                format!("rollback failed, previous container is kept as {kept}: {e}")
            }
        })
    }

    async fn wait_running(&self, name: &str) -> Result<()> {
        let Some(deadline) = Instant::now().checked_add(self.cfg.health_check_timeout) else {
            return Err(Error::Config(format!(
                "health check timeout {:?} is out of range",
                self.cfg.health_check_timeout
            )));
        };
        let mut consecutive = 0u32;
        let mut last = "unknown".to_string();

        loop {
            let spec = self
                .docker
                .inspect_running(name)
                .timeout(self.cfg.quick_command_timeout);
            match self.runner.run(&spec).await {
                Ok(out) if out.stdout.trim() == "true" => {
                    consecutive += 1;
                    if consecutive >= HEALTHY_POLLS {
                        return Ok(());
                    }
                }
                Ok(out) => {
                    consecutive = 0;
                    last = format!("running={}", out.stdout.trim());
                }
                Err(e) => {
                    consecutive = 0;
                    last = e.to_string();
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::External(format!(
                    "container {name} was not running after {} (last check: {last})",
                    format_secs(self.cfg.health_check_timeout)
                )));
            }
            sleep(self.cfg.health_check_interval).await;
        }
    }

    async fn exec(&self, spec: CommandSpec) -> Result<()> {
        self.runner.run(&spec).await.map(|_| ())
    }
}

fn format_secs(d: Duration) -> String {
    if d.as_millis() < 1000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+(?:-[0-9A-Za-z.\-]+)?").expect("valid regex"))
}

/// First version-looking token in `raw`, or the trimmed text if there is none.
///
/// CLIs sometimes print warnings around the version; the comparison itself stays
/// a plain string equality.
pub fn normalize_version(raw: &str) -> String {
    match version_re().find(raw) {
        Some(m) => m.as_str().to_string(),
        None => raw.trim().to_string(),
    }
}
