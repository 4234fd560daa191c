use std::{collections::HashMap, env, path::PathBuf, time::Duration};

use crate::{archive::ArchiveFormat, errors::Error, security::UnauthorizedPolicy, Result};

/// Upper bound for every `*_SECS` setting (one day).
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Typed configuration, read once at startup and shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub operator_id: String,
    pub unauthorized_policy: UnauthorizedPolicy,

    // Automation server
    pub n8n_domain: String,
    pub n8n_protocol: String,
    pub n8n_port: u16,
    pub n8n_container: String,
    pub n8n_image: String,
    pub n8n_package: String,
    pub n8n_data_dir: PathBuf,
    pub n8n_files_dir: Option<PathBuf>,
    pub n8n_encryption_key: String,
    pub timezone: String,

    // Database
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub postgres_container: String,
    pub db_backup_script: Option<PathBuf>,

    // Container runtime + registry tooling
    pub docker_bin: String,
    pub docker_host: Option<String>,
    pub docker_network: Option<String>,
    pub npm_bin: String,

    // Backups
    pub temp_root: PathBuf,
    pub backup_config_files: Vec<PathBuf>,
    pub backup_format: ArchiveFormat,
    pub backup_include_credentials: bool,
    pub backup_before_update: bool,

    // Runtime constants
    pub log_tail_lines: u32,
    pub quick_command_timeout: Duration,
    pub inline_report_limit: usize,
    pub health_check_timeout: Duration,
    pub health_check_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // A missing .env is fine; existing environment always wins.
        let _ = dotenvy::dotenv();
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let get_any = |keys: &[&str]| keys.iter().find_map(|k| get(*k));
        let required = |keys: &[&str]| {
            get_any(keys).ok_or_else(|| {
                Error::Config(format!("{} environment variable is required", keys[0]))
            })
        };

        // Required env vars
        let telegram_bot_token = required(&["TELEGRAM_BOT_TOKEN", "TG_BOT_TOKEN"])?;
        let operator_id = required(&["TELEGRAM_OPERATOR_ID", "TG_USER_ID", "TELEGRAM_USER_ID"])?
            .trim()
            .to_string();
        let n8n_domain = required(&["N8N_DOMAIN", "DOMAIN_NAME"])?;
        let db_password = required(&["DB_POSTGRESDB_PASSWORD", "POSTGRES_PASSWORD"])?;
        let n8n_encryption_key = required(&["N8N_ENCRYPTION_KEY"])?;

        let unauthorized_policy = match get("UNAUTHORIZED_POLICY") {
            Some(raw) => raw.parse::<UnauthorizedPolicy>()?,
            None => UnauthorizedPolicy::Silent,
        };
        let backup_format = match get("BACKUP_FORMAT") {
            Some(raw) => raw.parse::<ArchiveFormat>()?,
            None => ArchiveFormat::TarGz,
        };

        let n8n_data_dir = PathBuf::from(get("N8N_DATA_DIR").unwrap_or("/root/.n8n".to_string()));
        let backup_config_files = parse_csv_paths(get("BACKUP_CONFIG_FILES")).unwrap_or_else(|| {
            vec![
                PathBuf::from(".env"),
                PathBuf::from("docker-compose.yml"),
                n8n_data_dir.join("config"),
            ]
        });

        let parse_num = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}"))),
                None => Ok(default),
            }
        };
        let parse_secs = |key: &str, default: u64| -> Result<Duration> {
            let secs = parse_num(key, default)?;
            if secs > MAX_TIMEOUT_SECS {
                return Err(Error::Config(format!(
                    "{key} must be at most {MAX_TIMEOUT_SECS} seconds, got {secs}"
                )));
            }
            Ok(Duration::from_secs(secs))
        };
        let parse_bool = |key: &str, default: bool| -> bool {
            get(key)
                .map(|s| {
                    matches!(
                        s.trim().to_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    )
                })
                .unwrap_or(default)
        };

        Ok(Self {
            telegram_bot_token,
            operator_id,
            unauthorized_policy,
            n8n_domain,
            n8n_protocol: get("N8N_PROTOCOL").unwrap_or("https".to_string()),
            n8n_port: port(parse_num("N8N_PORT", 5678)?, "N8N_PORT")?,
            n8n_container: get("N8N_CONTAINER").unwrap_or("n8n".to_string()),
            n8n_image: get("N8N_IMAGE").unwrap_or("docker.n8n.io/n8nio/n8n:latest".to_string()),
            n8n_package: get("N8N_PACKAGE").unwrap_or("n8n".to_string()),
            n8n_data_dir,
            n8n_files_dir: get("N8N_FILES_DIR").map(PathBuf::from),
            n8n_encryption_key,
            timezone: get("GENERIC_TIMEZONE").unwrap_or("UTC".to_string()),
            db_host: get("DB_POSTGRESDB_HOST").unwrap_or("postgres".to_string()),
            db_port: port(parse_num("DB_POSTGRESDB_PORT", 5432)?, "DB_POSTGRESDB_PORT")?,
            db_name: get("DB_POSTGRESDB_DATABASE").unwrap_or("n8n".to_string()),
            db_user: get("DB_POSTGRESDB_USER").unwrap_or("n8n".to_string()),
            db_password,
            postgres_container: get("POSTGRES_CONTAINER").unwrap_or("postgres".to_string()),
            db_backup_script: get("DB_BACKUP_SCRIPT").map(PathBuf::from),
            docker_bin: get("DOCKER_BIN").unwrap_or("docker".to_string()),
            docker_host: get("DOCKER_HOST"),
            docker_network: get("DOCKER_NETWORK"),
            npm_bin: get("NPM_BIN").unwrap_or("npm".to_string()),
            temp_root: PathBuf::from(get("TEMP_ROOT").unwrap_or("/tmp/n8nbot".to_string())),
            backup_config_files,
            backup_format,
            backup_include_credentials: parse_bool("BACKUP_INCLUDE_CREDENTIALS", true),
            backup_before_update: parse_bool("BACKUP_BEFORE_UPDATE", true),
            log_tail_lines: parse_num("LOG_TAIL_LINES", 50)?.clamp(1, 10_000) as u32,
            quick_command_timeout: parse_secs("QUICK_COMMAND_TIMEOUT_SECS", 15)?,
            inline_report_limit: (parse_num("INLINE_REPORT_LIMIT", 3900)? as usize).min(4000),
            health_check_timeout: parse_secs("HEALTH_CHECK_TIMEOUT_SECS", 60)?,
            health_check_interval: parse_secs("HEALTH_CHECK_INTERVAL_SECS", 3)?
                .max(Duration::from_secs(1)),
        })
    }

    /// Public base URL of the automation server.
    pub fn webhook_url(&self) -> String {
        format!("{}://{}/", self.n8n_protocol, self.n8n_domain)
    }
}

fn port(v: u64, key: &str) -> Result<u16> {
    u16::try_from(v).map_err(|_| Error::Config(format!("{key} is not a valid port: {v}")))
}

fn parse_csv_paths(v: Option<String>) -> Option<Vec<PathBuf>> {
    let v = v?;
    let out = v
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_OPERATOR_ID", " 111 "),
            ("N8N_DOMAIN", "n8n.example.com"),
            ("DB_POSTGRESDB_PASSWORD", "pw"),
            ("N8N_ENCRYPTION_KEY", "key"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<String, String>) -> Result<Config> {
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn loads_required_values_and_defaults() {
        let cfg = load(&base_vars()).unwrap();
        assert_eq!(cfg.operator_id, "111");
        assert_eq!(cfg.unauthorized_policy, UnauthorizedPolicy::Silent);
        assert_eq!(cfg.backup_format, ArchiveFormat::TarGz);
        assert_eq!(cfg.inline_report_limit, 3900);
        assert_eq!(cfg.quick_command_timeout, Duration::from_secs(15));
        assert_eq!(cfg.n8n_container, "n8n");
        assert_eq!(cfg.webhook_url(), "https://n8n.example.com/");
        assert!(cfg
            .backup_config_files
            .contains(&PathBuf::from("/root/.n8n/config")));
    }

    #[test]
    fn each_required_value_fails_fast_when_missing() {
        for key in [
            "TELEGRAM_BOT_TOKEN",
            "TELEGRAM_OPERATOR_ID",
            "N8N_DOMAIN",
            "DB_POSTGRESDB_PASSWORD",
            "N8N_ENCRYPTION_KEY",
        ] {
            let mut vars = base_vars();
            vars.remove(key);
            let err = load(&vars).unwrap_err();
            assert!(
                err.to_string().contains(key),
                "expected error naming {key}, got: {err}"
            );
        }
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let mut vars = base_vars();
        vars.insert("N8N_ENCRYPTION_KEY".to_string(), "   ".to_string());
        assert!(matches!(load(&vars), Err(Error::Config(_))));
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let mut vars = base_vars();
        vars.remove("TELEGRAM_BOT_TOKEN");
        vars.remove("TELEGRAM_OPERATOR_ID");
        vars.insert("TG_BOT_TOKEN".to_string(), "t".to_string());
        vars.insert("TG_USER_ID".to_string(), "222".to_string());
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.telegram_bot_token, "t");
        assert_eq!(cfg.operator_id, "222");
    }

    #[test]
    fn optional_overrides_are_parsed() {
        let mut vars = base_vars();
        vars.insert("UNAUTHORIZED_POLICY".to_string(), "reply".to_string());
        vars.insert("BACKUP_FORMAT".to_string(), "zip".to_string());
        vars.insert("BACKUP_CONFIG_FILES".to_string(), "/a, /b ,".to_string());
        vars.insert("BACKUP_BEFORE_UPDATE".to_string(), "no".to_string());
        vars.insert("LOG_TAIL_LINES".to_string(), "200".to_string());
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.unauthorized_policy, UnauthorizedPolicy::Reply);
        assert_eq!(cfg.backup_format, ArchiveFormat::Zip);
        assert_eq!(
            cfg.backup_config_files,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert!(!cfg.backup_before_update);
        assert_eq!(cfg.log_tail_lines, 200);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let mut vars = base_vars();
        vars.insert("N8N_PORT".to_string(), "http".to_string());
        assert!(matches!(load(&vars), Err(Error::Config(_))));
        vars.insert("N8N_PORT".to_string(), "70000".to_string());
        assert!(matches!(load(&vars), Err(Error::Config(_))));
    }

    #[test]
    fn oversized_timeouts_are_rejected() {
        for key in [
            "QUICK_COMMAND_TIMEOUT_SECS",
            "HEALTH_CHECK_TIMEOUT_SECS",
            "HEALTH_CHECK_INTERVAL_SECS",
        ] {
            let mut vars = base_vars();
            vars.insert(key.to_string(), u64::MAX.to_string());
            let err = load(&vars).unwrap_err();
            assert!(err.to_string().contains(key), "got: {err}");
        }

        let mut vars = base_vars();
        vars.insert("HEALTH_CHECK_TIMEOUT_SECS".to_string(), "86400".to_string());
        assert_eq!(
            load(&vars).unwrap().health_check_timeout,
            Duration::from_secs(86400)
        );
    }
}
