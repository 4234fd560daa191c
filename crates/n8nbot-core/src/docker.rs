//! Command lines for the container runtime CLI and the package registry.
//!
//! The bot never talks to the Docker socket directly; everything goes through
//! `docker ...` invocations built here and executed by a [`ProcessRunner`].
//!
//! [`ProcessRunner`]: crate::ports::ProcessRunner

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{config::Config, ports::CommandSpec};

/// Builder for `docker` invocations.
#[derive(Clone, Debug)]
pub struct Docker {
    bin: String,
    host: Option<String>,
}

impl Docker {
    pub fn new(bin: impl Into<String>, host: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            host,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.docker_bin.clone(), cfg.docker_host.clone())
    }

    fn cmd(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.bin);
        match &self.host {
            Some(host) => spec.env("DOCKER_HOST", host),
            None => spec,
        }
    }

    /// `docker ps -a` with one JSON object per line.
    pub fn ps_json(&self) -> CommandSpec {
        self.cmd().args(["ps", "-a", "--format", "{{json .}}"])
    }

    pub fn logs(&self, container: &str, tail: u32) -> CommandSpec {
        self.cmd()
            .args(["logs", "--timestamps"])
            .arg(format!("--tail={tail}"))
            .arg(container)
    }

    pub fn exec<I, S>(&self, container: &str, argv: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd().arg("exec").arg(container).args(argv)
    }

    /// `docker exec -e K=V ... <container> argv...`; env values are registered as secrets.
    pub fn exec_with_env<I, S>(&self, container: &str, env: &[(&str, &str)], argv: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = self.cmd().arg("exec");
        for (k, v) in env {
            spec = spec.arg("-e").arg(format!("{k}={v}")).secret(*v);
        }
        spec.arg(container).args(argv)
    }

    /// Copy `container:src` to a host path.
    pub fn cp_from(&self, container: &str, src: &str, dest: &Path) -> CommandSpec {
        self.cmd()
            .arg("cp")
            .arg(format!("{container}:{src}"))
            .arg(dest.to_string_lossy())
    }

    pub fn pull(&self, image: &str) -> CommandSpec {
        self.cmd().args(["pull", image])
    }

    pub fn stop(&self, container: &str) -> CommandSpec {
        self.cmd().args(["stop", container])
    }

    pub fn start(&self, container: &str) -> CommandSpec {
        self.cmd().args(["start", container])
    }

    pub fn rm_force(&self, container: &str) -> CommandSpec {
        self.cmd().args(["rm", "-f", container])
    }

    pub fn rename(&self, from: &str, to: &str) -> CommandSpec {
        self.cmd().args(["rename", from, to])
    }

    /// Prints `true` while the container is running.
    pub fn inspect_running(&self, container: &str) -> CommandSpec {
        self.cmd()
            .args(["inspect", "--format", "{{.State.Running}}", container])
    }

    pub fn run(&self, spec: &RunSpec) -> CommandSpec {
        let mut cmd = self
            .cmd()
            .args(["run", "-d", "--name"])
            .arg(&spec.name)
            .arg("--restart")
            .arg(&spec.restart);

        if let Some(net) = &spec.network {
            cmd = cmd.arg("--network").arg(net);
        }
        for (host, container) in &spec.ports {
            cmd = cmd.arg("-p").arg(format!("{host}:{container}"));
        }
        for (k, v) in &spec.env {
            cmd = cmd.arg("-e").arg(format!("{k}={v}"));
        }
        for (host, container) in &spec.mounts {
            cmd = cmd.arg("-v").arg(format!("{host}:{container}"));
        }
        for secret in &spec.secrets {
            cmd = cmd.secret(secret.clone());
        }
        cmd.arg(&spec.image)
    }
}

/// `uptime -p` on the host.
pub fn host_uptime(timeout: Duration) -> CommandSpec {
    CommandSpec::new("uptime").arg("-p").timeout(timeout)
}

/// `npm view <package> version`: latest published version of the automation tool.
pub fn npm_latest_version(npm_bin: &str, package: &str) -> CommandSpec {
    CommandSpec::new(npm_bin).args(["view", package, "version"])
}

/// Everything needed for `docker run` of the automation container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub restart: String,
    pub network: Option<String>,
    pub ports: Vec<(u16, u16)>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<(String, String)>,
    pub secrets: Vec<String>,
}

impl RunSpec {
    /// The n8n container: environment, bind mounts and published port.
    pub fn for_n8n(cfg: &Config) -> Self {
        let port = cfg.n8n_port.to_string();
        let db_port = cfg.db_port.to_string();
        let webhook_url = cfg.webhook_url();
        let env: Vec<(String, String)> = [
            ("N8N_HOST", cfg.n8n_domain.as_str()),
            ("N8N_PORT", port.as_str()),
            ("N8N_PROTOCOL", cfg.n8n_protocol.as_str()),
            ("NODE_ENV", "production"),
            ("WEBHOOK_URL", webhook_url.as_str()),
            ("GENERIC_TIMEZONE", cfg.timezone.as_str()),
            ("TZ", cfg.timezone.as_str()),
            ("N8N_ENCRYPTION_KEY", cfg.n8n_encryption_key.as_str()),
            ("DB_TYPE", "postgresdb"),
            ("DB_POSTGRESDB_HOST", cfg.db_host.as_str()),
            ("DB_POSTGRESDB_PORT", db_port.as_str()),
            ("DB_POSTGRESDB_DATABASE", cfg.db_name.as_str()),
            ("DB_POSTGRESDB_USER", cfg.db_user.as_str()),
            ("DB_POSTGRESDB_PASSWORD", cfg.db_password.as_str()),
            ("N8N_RUNNERS_ENABLED", "true"),
            ("N8N_ENFORCE_SETTINGS_FILE_PERMISSIONS", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut mounts = vec![(
            cfg.n8n_data_dir.to_string_lossy().to_string(),
            "/home/node/.n8n".to_string(),
        )];
        if let Some(files) = &cfg.n8n_files_dir {
            mounts.push((files.to_string_lossy().to_string(), "/files".to_string()));
        }

        Self {
            name: cfg.n8n_container.clone(),
            image: cfg.n8n_image.clone(),
            restart: "unless-stopped".to_string(),
            network: cfg.docker_network.clone(),
            ports: vec![(cfg.n8n_port, cfg.n8n_port)],
            env,
            mounts,
            secrets: vec![cfg.n8n_encryption_key.clone(), cfg.db_password.clone()],
        }
    }
}

/// One row of `docker ps --format '{{json .}}'`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ContainerInfo {
    #[serde(rename = "Names")]
    pub names: String,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running") || self.status.starts_with("Up")
    }
}

/// Parse `docker ps` JSON lines; lines that are not valid JSON objects are skipped.
pub fn parse_ps_json(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| match serde_json::from_str::<ContainerInfo>(l) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(line = l, error = %e, "skipping unparsable docker ps line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_config;

    #[test]
    fn docker_host_is_passed_as_env() {
        let d = Docker::new("docker", Some("unix:///var/run/docker.sock".to_string()));
        let spec = d.ps_json();
        assert_eq!(spec.program, "docker");
        assert_eq!(spec.args, vec!["ps", "-a", "--format", "{{json .}}"]);
        assert_eq!(
            spec.env,
            vec![(
                "DOCKER_HOST".to_string(),
                "unix:///var/run/docker.sock".to_string()
            )]
        );
    }

    #[test]
    fn exec_with_env_masks_values() {
        let d = Docker::new("docker", None);
        let spec = d.exec_with_env("postgres", &[("PGPASSWORD", "s3cret")], ["pg_dump", "-U", "n8n"]);
        assert_eq!(
            spec.args,
            vec!["exec", "-e", "PGPASSWORD=s3cret", "postgres", "pg_dump", "-U", "n8n"]
        );
        assert_eq!(spec.display(), "docker exec -e PGPASSWORD=*** postgres pg_dump -U n8n");
    }

    #[test]
    fn run_spec_carries_env_mounts_and_redacts_secrets() {
        let root = crate::testing::tmp_dir("n8nbot-docker-run");
        let cfg = test_config(&root);
        let run = RunSpec::for_n8n(&cfg);
        let spec = Docker::from_config(&cfg).run(&run);

        assert_eq!(&spec.args[..4], &["run", "-d", "--name", "n8n"]);
        assert_eq!(spec.args.last().map(String::as_str), Some("n8nio/n8n:latest"));
        assert!(spec.args.contains(&"N8N_HOST=n8n.example.com".to_string()));
        assert!(spec.args.contains(&"WEBHOOK_URL=https://n8n.example.com/".to_string()));
        assert!(spec.args.contains(&"/srv/n8n-data:/home/node/.n8n".to_string()));
        assert!(spec.args.contains(&"5678:5678".to_string()));

        let shown = spec.display();
        assert!(!shown.contains("db-pass"));
        assert!(!shown.contains("enc-key"));
        assert!(shown.contains("N8N_ENCRYPTION_KEY=***"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn parses_ps_json_and_skips_garbage() {
        let out = r#"{"Names":"n8n","Image":"n8nio/n8n","State":"running","Status":"Up 2 hours"}
not json
{"Names":"postgres","Image":"postgres:16","State":"exited","Status":"Exited (0) 3 days ago"}
"#;
        let rows = parse_ps_json(out);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_running());
        assert!(!rows[1].is_running());
        assert_eq!(rows[1].names, "postgres");
    }
}
