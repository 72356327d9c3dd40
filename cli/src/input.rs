use std::fs;
use std::io::Read;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, BufReader};

pub const STDIN: &str = "-";

/// Reads a JSON body from a file path, or from stdin when `input` is `-`.
pub fn read_json<T: DeserializeOwned>(input: &str) -> anyhow::Result<T> {
    let raw = if input.trim() == STDIN {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read JSON from stdin")?;
        buf
    } else {
        fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };
    parse_json(&raw).with_context(|| format!("invalid JSON input in {}", describe(input)))
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> serde_json::Result<T> {
    serde_json::from_str(raw)
}

pub async fn open_lines(input: &str) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if input.trim() == STDIN {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("failed to open {input}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn describe(input: &str) -> &str {
    if input.trim() == STDIN {
        "stdin"
    } else {
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhorizon_types::{Patch, TenantUpdate};
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn reads_update_bodies_from_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("update.json");
        fs::write(&path, r#"{"displayName": null, "deleted": false}"#).expect("write");
        let update: TenantUpdate = read_json(path.to_str().expect("utf-8 path")).expect("read");
        assert_eq!(update.display_name, Patch::Clear);
        assert_eq!(update.deleted, Patch::Set(false));
        assert_eq!(update.labels, Patch::Keep);
    }

    #[test]
    fn bad_json_names_the_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{").expect("write");
        let err = read_json::<serde_json::Value>(path.to_str().expect("utf-8 path")).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn open_lines_reads_files_line_by_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs.txt");
        fs::write(&path, "one\ntwo\n").expect("write");
        let reader = open_lines(path.to_str().expect("utf-8 path"))
            .await
            .expect("open");
        let mut lines = reader.lines();
        assert_eq!(lines.next_line().await.expect("read").as_deref(), Some("one"));
        assert_eq!(lines.next_line().await.expect("read").as_deref(), Some("two"));
        assert_eq!(lines.next_line().await.expect("read"), None);
    }
}
