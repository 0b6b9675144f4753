//! Directory-backed storage.
//!
//! A media library keeps uploaded files under `uploads/` and an
//! `index.json` describing them. Content documents are plain files under
//! `content/`. All index writes are atomic (write to temp file, then rename).

use crate::document::AssetId;
use crate::errors::library_not_found;
use crate::storage::{AssetLookup, AssetUploader, ContentStore};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const UPLOADS_DIR: &str = "uploads";
const INDEX_FILE: &str = "index.json";
const CONTENT_DIR: &str = "content";

/// Index of every asset in a media library
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LibraryIndex {
    /// Schema version for future migrations
    schema_version: u32,
    /// Public URL prefix under which `uploads/` is served
    public_base_url: String,
    /// Next ID to hand out
    next_id: AssetId,
    assets: BTreeMap<AssetId, LibraryEntry>,
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// File name under `uploads/`
    pub file: String,
    /// Name suggested by the uploader
    pub original_name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Media library stored in a directory.
///
/// Serves as the destination store on import and as the source of URLs on
/// export. Uploads from concurrent fetch workers are serialized on the index.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
    index_lock: Arc<Mutex<()>>,
}

impl MediaLibrary {
    /// Create a library at `root` (idempotent, keeps an existing index).
    pub fn init<P: AsRef<Path>>(root: P, public_base_url: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(UPLOADS_DIR)).context("Failed to create uploads directory")?;

        let library = Self {
            root,
            index_lock: Arc::new(Mutex::new(())),
        };

        let index_path = library.index_path();
        if !index_path.exists() {
            let index = LibraryIndex {
                schema_version: 1,
                public_base_url: public_base_url.trim_end_matches('/').to_string(),
                next_id: 1,
                assets: BTreeMap::new(),
            };
            write_json(&index_path, &index)?;
        }

        Ok(library)
    }

    /// Open an existing library.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join(INDEX_FILE).is_file() {
            return Err(library_not_found(&root).into());
        }

        Ok(Self {
            root,
            index_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Library root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the uploaded files.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    /// Public URL prefix of the library.
    pub fn public_base_url(&self) -> Result<String> {
        Ok(self.load_index()?.public_base_url)
    }

    /// All entries, ordered by ID.
    pub fn entries(&self) -> Result<BTreeMap<AssetId, LibraryEntry>> {
        Ok(self.load_index()?.assets)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<LibraryIndex> {
        read_json(&self.index_path())
    }
}

impl AssetLookup for MediaLibrary {
    fn url_for_id(&self, id: AssetId) -> Result<Option<String>> {
        let index = self.load_index()?;
        Ok(index.assets.get(&id).map(|entry| {
            format!("{}/{}/{}", index.public_base_url, UPLOADS_DIR, entry.file)
        }))
    }

    fn urls_for_ids(
        &self,
        ids: &std::collections::BTreeSet<AssetId>,
    ) -> Result<BTreeMap<AssetId, String>> {
        // One index read for the whole batch
        let index = self.load_index()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                index.assets.get(id).map(|entry| {
                    (
                        *id,
                        format!("{}/{}/{}", index.public_base_url, UPLOADS_DIR, entry.file),
                    )
                })
            })
            .collect())
    }
}

impl AssetUploader for MediaLibrary {
    fn upload(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetId> {
        if bytes.is_empty() {
            bail!("Refusing to store an empty file: {}", suggested_name);
        }

        let _guard = self
            .index_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut index = self.load_index()?;
        let id = index.next_id;
        let file = format!("{}-{}", id, sanitize_file_name(suggested_name));

        let file_path = self.uploads_dir().join(&file);
        fs::write(&file_path, bytes)
            .with_context(|| format!("Failed to write upload: {}", file_path.display()))?;

        index.next_id += 1;
        index.assets.insert(
            id,
            LibraryEntry {
                file,
                original_name: suggested_name.to_string(),
                size: bytes.len() as u64,
                uploaded_at: Utc::now(),
            },
        );
        write_json(&self.index_path(), &index)?;

        Ok(id)
    }
}

/// Content documents stored as `content/<id>.html`.
#[derive(Debug, Clone)]
pub struct JsonContentStore {
    root: PathBuf,
}

impl JsonContentStore {
    /// Create a content store at `root` (the directory is created on demand).
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn document_path(&self, content_id: &str) -> Result<PathBuf> {
        let valid = !content_id.is_empty()
            && content_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            bail!("Invalid content ID: {:?}", content_id);
        }
        Ok(self.root.join(CONTENT_DIR).join(format!("{}.html", content_id)))
    }
}

impl ContentStore for JsonContentStore {
    fn load(&self, content_id: &str) -> Result<String> {
        let path = self.document_path(content_id)?;
        if !path.exists() {
            bail!("Content not found: {}", content_id);
        }
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn update(&self, content_id: &str, content: &str) -> Result<()> {
        let path = self.document_path(content_id)?;
        fs::create_dir_all(self.root.join(CONTENT_DIR))
            .context("Failed to create content directory")?;
        write_atomic(&path, content.as_bytes())
    }
}

/// Keep file names portable: ASCII letters, digits, `.`, `-` and `_`.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned.to_string()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, bytes).context("Failed to write temporary file")?;
    fs::rename(&temp_path, path).context("Failed to rename temporary file")?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize data")?;
    write_atomic(path, json.as_bytes())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&contents).context("Failed to deserialize data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn library() -> (TempDir, MediaLibrary) {
        let temp = TempDir::new().unwrap();
        let lib = MediaLibrary::init(temp.path().join("media"), "https://dest.test/media/").unwrap();
        (temp, lib)
    }

    #[test]
    fn test_upload_writes_file_and_index() {
        let (_temp, lib) = library();
        let id = lib.upload(b"\x89PNG", "hero.png").unwrap();
        assert_eq!(id, 1);

        let stored = fs::read(lib.uploads_dir().join("1-hero.png")).unwrap();
        assert_eq!(stored, b"\x89PNG");

        let entries = lib.entries().unwrap();
        assert_eq!(entries[&1].original_name, "hero.png");
        assert_eq!(entries[&1].size, 4);
    }

    #[test]
    fn test_url_for_id_uses_public_base() {
        let (_temp, lib) = library();
        let id = lib.upload(b"x", "a b.jpg").unwrap();
        assert_eq!(
            lib.url_for_id(id).unwrap().as_deref(),
            Some("https://dest.test/media/uploads/1-a-b.jpg")
        );
        assert_eq!(lib.url_for_id(99).unwrap(), None);
    }

    #[test]
    fn test_batch_lookup_omits_unknown_ids() {
        let (_temp, lib) = library();
        lib.upload(b"x", "x.png").unwrap();
        let urls = lib.urls_for_ids(&BTreeSet::from([1, 2])).unwrap();
        assert_eq!(urls.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_init_is_idempotent() {
        let (temp, lib) = library();
        lib.upload(b"x", "x.png").unwrap();
        let again = MediaLibrary::init(temp.path().join("media"), "https://other.test").unwrap();
        assert_eq!(again.entries().unwrap().len(), 1);
        assert_eq!(again.public_base_url().unwrap(), "https://dest.test/media");
    }

    #[test]
    fn test_open_missing_library_fails() {
        let temp = TempDir::new().unwrap();
        let err = MediaLibrary::open(temp.path().join("nowhere")).unwrap_err();
        assert!(err.to_string().contains("Media library not found"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("hero.png"), "hero.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "-..-etc-passwd");
        assert_eq!(sanitize_file_name("..."), "asset");
        assert_eq!(sanitize_file_name("caf%C3%A9.jpg"), "caf-C3-A9.jpg");
    }

    #[test]
    fn test_content_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = JsonContentStore::new(temp.path());
        store.update("post-7", "<p>hi</p>").unwrap();
        assert_eq!(store.load("post-7").unwrap(), "<p>hi</p>");
        assert!(store.load("post-8").is_err());
    }

    #[test]
    fn test_content_store_rejects_path_ids() {
        let temp = TempDir::new().unwrap();
        let store = JsonContentStore::new(temp.path());
        assert!(store.update("../escape", "x").is_err());
        assert!(store.update("", "x").is_err());
    }
}
