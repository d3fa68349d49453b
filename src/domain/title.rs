use crate::domain::DocumentId;
use std::path::{Component, Path};
use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TitleError {
    #[error("path is outside the content root: {0}")]
    OutsideRoot(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),

    #[error("file name has an empty stem: {0}")]
    EmptyStem(String),
}

/// Builds the repository-relative id (`dir/file.md`) for `path` under `root`.
pub fn document_id_from_path(root: &Path, path: &Path) -> Result<DocumentId, TitleError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| TitleError::OutsideRoot(path.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| TitleError::NonUtf8(path.display().to_string()))?;
                parts.push(part);
            }
            _ => return Err(TitleError::OutsideRoot(path.display().to_string())),
        }
    }

    if parts.is_empty() {
        return Err(TitleError::MissingFileName(path.display().to_string()));
    }
    Ok(DocumentId::new(parts.join("/")))
}

/// Title rule: strip the root prefix and the extension, then turn `-`/`_` into spaces.
pub fn title_from_path(root: &Path, path: &Path) -> Result<String, TitleError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| TitleError::OutsideRoot(path.display().to_string()))?;
    let stem = relative
        .file_stem()
        .ok_or_else(|| TitleError::MissingFileName(path.display().to_string()))?;
    let stem = stem
        .to_str()
        .ok_or_else(|| TitleError::NonUtf8(path.display().to_string()))?;

    let title = stem
        .chars()
        .map(|ch| if ch == '-' || ch == '_' { ' ' } else { ch })
        .collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return Err(TitleError::EmptyStem(path.display().to_string()));
    }
    Ok(title)
}

/// Returns the text of a leading `# Heading`, skipping blank lines.
pub fn heading_title(body: &str) -> Option<String> {
    let first_line = body
        .lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())?;
    let heading = first_line.strip_prefix("# ")?.trim();
    if heading.is_empty() {
        return None;
    }
    Some(heading.to_string())
}
