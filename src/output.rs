use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{error::Result, merge::CallsDocument};

/// Serializes `document` as two-space indented JSON with non-ASCII text kept
/// as is.
pub fn render(document: &CallsDocument) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(document)?)
}

/// Replaces `path` with the rendered document. The bytes go to a sibling
/// temporary file first and are renamed into place.
pub fn write_document(document: &CallsDocument, path: &Path) -> Result<()> {
    let bytes = render(document)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path(path);
    fs::write(&tmp_path, bytes)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        merge::{merge_directory, Group},
    };
    use serde_json::{json, Map};

    #[test]
    fn renders_two_space_indent_and_literal_unicode() {
        let mut records = Map::new();
        records.insert("k".to_owned(), json!({ "agent_name": "José" }));
        let document = CallsDocument {
            calls: vec![Group {
                key: "2024-01-05".to_owned(),
                records,
            }],
        };

        let text = String::from_utf8(render(&document).unwrap()).unwrap();
        assert_eq!(
            text,
            "{\n  \"calls\": {\n    \"2024-01-05\": {\n      \"k\": {\n        \"agent_name\": \"José\"\n      }\n    }\n  }\n}"
        );
    }

    #[test]
    fn empty_document_renders_empty_calls() {
        let text = String::from_utf8(render(&CallsDocument::default()).unwrap()).unwrap();
        assert_eq!(text, "{\n  \"calls\": {}\n}");
    }

    #[test]
    fn write_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/all_calls.json");

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale contents that are much longer than the new file").unwrap();

        write_document(&CallsDocument::default(), &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\n  \"calls\": {}\n}");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let config = Config {
            input_dir: PathBuf::from("test-inputs"),
            ..Config::default()
        };

        let first = render(&merge_directory(&config).unwrap().document).unwrap();
        let second = render(&merge_directory(&config).unwrap().document).unwrap();
        assert_eq!(first, second);
    }
}
