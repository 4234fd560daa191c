//! Report formatter: inline monospace reply or file attachment.

use std::{fs, path::Path};

use crate::{
    domain::ChatId,
    formatting::{escape_html, pre_block},
    messaging::MessagingPort,
    workspace::RunWorkspace,
    Result,
};

/// How a block of command output will be delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Report {
    Inline,
    Attachment,
}

impl Report {
    /// Inline when the body fits `limit` characters, otherwise an attachment.
    pub fn classify(body: &str, limit: usize) -> Self {
        if body.chars().count() <= limit {
            Report::Inline
        } else {
            Report::Attachment
        }
    }
}

/// Send `body` under `title`.
///
/// Bodies up to `limit` characters go out as one HTML message with the body in a
/// `<pre>` block. Longer bodies are written to `<file_stem>.txt` inside a fresh run
/// workspace below `temp_root` and uploaded as a document; the workspace is
/// removed whether or not the upload succeeds.
pub async fn deliver_report(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    title: &str,
    body: &str,
    limit: usize,
    temp_root: &Path,
    file_stem: &str,
) -> Result<Report> {
    match Report::classify(body, limit) {
        Report::Inline => {
            let html = format!("{}\n{}", escape_html(title), pre_block(body));
            messenger.send_html(chat_id, &html).await?;
            Ok(Report::Inline)
        }
        Report::Attachment => {
            let ws = RunWorkspace::create(temp_root, "report")?;
            let file_name = format!("{file_stem}.txt");
            let path = ws.join(&file_name);
            fs::write(&path, body)?;

            let caption = format!(
                "{}\n<i>Output too long for a message ({} characters), attached as a file.</i>",
                escape_html(title),
                body.chars().count()
            );
            messenger
                .send_document(chat_id, &path, &file_name, Some(&caption))
                .await?;
            Ok(Report::Attachment)
        }
    }
}
