//! Test doubles for the process and messaging ports.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::MessagingPort,
    ports::{CommandSpec, ProcessOutput, ProcessRunner},
    Result,
};

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Fresh, empty directory under /tmp unique to this call.
pub fn tmp_dir(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let n = TMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    let p = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}-{n}"));
    let _ = fs::remove_dir_all(&p);
    fs::create_dir_all(&p).unwrap();
    p
}

/// Config with deterministic values; `root` hosts the temp root.
pub fn test_config(root: &Path) -> Config {
    let vars: HashMap<String, String> = [
        ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
        ("TELEGRAM_OPERATOR_ID", "111".to_string()),
        ("N8N_DOMAIN", "n8n.example.com".to_string()),
        ("DB_POSTGRESDB_PASSWORD", "db-pass".to_string()),
        ("N8N_ENCRYPTION_KEY", "enc-key".to_string()),
        ("N8N_IMAGE", "n8nio/n8n:latest".to_string()),
        ("N8N_DATA_DIR", "/srv/n8n-data".to_string()),
        ("TEMP_ROOT", root.join("tmp").to_string_lossy().to_string()),
        (
            "BACKUP_CONFIG_FILES",
            root.join("missing.env").to_string_lossy().to_string(),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut cfg = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
    cfg.health_check_interval = Duration::from_millis(10);
    cfg.health_check_timeout = Duration::from_millis(200);
    cfg
}

pub fn fail(spec: &CommandSpec, stderr: &str) -> Error {
    Error::CommandFailed {
        command: spec.display(),
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

type Handler = Box<dyn Fn(&CommandSpec) -> Result<ProcessOutput> + Send + Sync>;

/// Records every command and answers through a closure.
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    handler: Handler,
}

impl FakeRunner {
    pub fn new(
        handler: impl Fn(&CommandSpec) -> Result<ProcessOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every command succeeds with empty output.
    pub fn ok() -> Self {
        Self::new(|_| Ok(ProcessOutput::ok("")))
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Raw (unmasked) command lines, in call order.
    pub fn lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| {
                let mut parts = vec![c.program.clone()];
                parts.extend(c.args.iter().cloned());
                parts.join(" ")
            })
            .collect()
    }

    /// `true` if any command line starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.lines().iter().any(|l| l.starts_with(prefix))
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        (self.handler)(spec)
    }
}

#[derive(Clone, Debug)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
    },
    Html {
        chat_id: ChatId,
        html: String,
    },
    Document {
        chat_id: ChatId,
        path: PathBuf,
        file_name: String,
        caption: Option<String>,
        existed: bool,
        contents: Option<Vec<u8>>,
    },
}

impl Sent {
    pub fn body(&self) -> &str {
        match self {
            Sent::Text { text, .. } => text,
            Sent::Html { html, .. } => html,
            Sent::Document { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }
}

/// Records outbound messages; can be told to fail document uploads.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    fail_documents: bool,
    next_id: AtomicUsize,
}

impl RecordingMessenger {
    pub fn failing_documents() -> Self {
        Self {
            fail_documents: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// All message bodies and captions joined, for substring assertions.
    pub fn transcript(&self) -> String {
        self.sent()
            .iter()
            .map(|s| s.body().to_string())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    pub fn documents(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Document { .. }))
            .collect()
    }

    fn next_ref(&self, chat_id: ChatId) -> MessageRef {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32 + 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.next_ref(chat_id))
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent::Html {
            chat_id,
            html: html.to_string(),
        });
        Ok(self.next_ref(chat_id))
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        if self.fail_documents {
            return Err(Error::External("telegram error: upload refused".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Document {
            chat_id,
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            caption: caption.map(str::to_string),
            existed: path.exists(),
            contents: fs::read(path).ok(),
        });
        Ok(self.next_ref(chat_id))
    }
}
