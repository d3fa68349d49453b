use crate::domain::{
    DocumentId, DocumentSummary, TitleError, document_id_from_path, heading_title,
    title_from_path,
};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

const DOCUMENT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];
const MAX_HEADING_SCAN_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content directory does not exist: {0}")]
    RootMissing(String),

    #[error("document not found: {0}")]
    NotFound(DocumentId),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InvalidTitle(#[from] TitleError),
}

/// Read-only document source shared by every session.
pub trait ContentRepository: Send + Sync {
    fn list(&self) -> Result<Vec<DocumentSummary>, ContentError>;

    fn fetch(&self, id: &DocumentId) -> Result<String, ContentError>;
}

#[derive(Clone, Debug)]
pub struct DirectoryRepository {
    root: PathBuf,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, id: &DocumentId) -> Option<PathBuf> {
        let relative = Path::new(id.as_str());
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !contained || relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ContentRepository for DirectoryRepository {
    fn list(&self) -> Result<Vec<DocumentSummary>, ContentError> {
        if !self.root.is_dir() {
            return Err(ContentError::RootMissing(self.root.display().to_string()));
        }

        let mut documents = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(false).into_iter();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(%error, "skipping unreadable content entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_document(entry.path()) {
                continue;
            }

            match summarize(&self.root, entry.path()) {
                Ok(summary) => documents.push(summary),
                Err(error) => warn!(path = %entry.path().display(), %error, "skipping document"),
            }
        }

        documents.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(documents)
    }

    fn fetch(&self, id: &DocumentId) -> Result<String, ContentError> {
        let Some(path) = self.resolve(id) else {
            return Err(ContentError::NotFound(id.clone()));
        };
        match fs::read_to_string(&path) {
            Ok(body) => Ok(body),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(ContentError::NotFound(id.clone()))
            }
            Err(source) => Err(ContentError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DOCUMENT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn summarize(root: &Path, path: &Path) -> Result<DocumentSummary, ContentError> {
    let id = document_id_from_path(root, path)?;
    let derived_title = title_from_path(root, path)?;
    let metadata = fs::metadata(path).map_err(|source| ContentError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let title = read_heading(path).unwrap_or(derived_title);
    Ok(DocumentSummary {
        id,
        title,
        size_bytes: metadata.len(),
        modified: metadata.modified().ok(),
    })
}

fn read_heading(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut head = String::new();
    for line in reader.lines().take(MAX_HEADING_SCAN_LINES) {
        let line = line.ok()?;
        head.push_str(&line);
        head.push('\n');
    }
    heading_title(&head)
}

#[cfg(test)]
pub use memory::MemoryRepository;


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_markdown_documents_sorted_by_id() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("zeta.md"), "plain body").expect("write");
        fs::write(dir.path().join("alpha-post.md"), "# Alpha, Revisited\n\nbody").expect("write");
        fs::create_dir(dir.path().join("notes")).expect("mkdir");
        fs::write(dir.path().join("notes").join("todo_list.txt"), "x").expect("write");
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).expect("write");

        let repo = DirectoryRepository::new(dir.path());
        let documents = repo.list().expect("list");
        let ids = documents
            .iter()
            .map(|doc| doc.id.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["alpha-post.md", "notes/todo_list.txt", "zeta.md"]);

        assert_eq!(documents[0].title, "Alpha, Revisited");
        assert_eq!(documents[1].title, "todo list");
        assert_eq!(documents[2].title, "zeta");
        assert_eq!(documents[2].size_bytes, "plain body".len() as u64);
    }

    #[test]
    fn fetch_returns_body_by_id() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("2024")).expect("mkdir");
        fs::write(dir.path().join("2024").join("a.md"), "hello").expect("write");

        let repo = DirectoryRepository::new(dir.path());
        let body = repo.fetch(&DocumentId::new("2024/a.md")).expect("fetch");
        assert_eq!(body, "hello");
    }

    #[test]
    fn fetch_missing_document_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let repo = DirectoryRepository::new(dir.path());
        let result = repo.fetch(&DocumentId::new("missing"));
        assert!(matches!(result, Err(ContentError::NotFound(id)) if id.as_str() == "missing"));
    }

    #[test]
    fn fetch_refuses_to_escape_root() {
        let dir = tempdir().expect("tempdir");
        let inner = dir.path().join("inner");
        fs::create_dir(&inner).expect("mkdir");
        fs::write(dir.path().join("secret.md"), "nope").expect("write");

        let repo = DirectoryRepository::new(&inner);
        assert!(matches!(
            repo.fetch(&DocumentId::new("../secret.md")),
            Err(ContentError::NotFound(_))
        ));
        assert!(matches!(
            repo.fetch(&DocumentId::new("/etc/hostname")),
            Err(ContentError::NotFound(_))
        ));
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = tempdir().expect("tempdir");
        let repo = DirectoryRepository::new(dir.path().join("nope"));
        assert!(matches!(repo.list(), Err(ContentError::RootMissing(_))));
    }
}
