//! Segments repository: the session-level registry.
//!
//! The repository owns the page store, hands out shared file sources (one per
//! canonical path) and issues delta documents. File sources are tracked through
//! weak references, so a source lives exactly as long as the longest-lived
//! segment pointing into it.

use crate::document::DeltaDocument;
use crate::error::{Result, StorageError};
use crate::source::{FileSource, MemorySource, SharedMemorySource};
use crate::storage::{PageStore, PageStoreStats, TempPageStore};
use crate::types::DocumentId;
use crate::Config;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tempfile::NamedTempFile;
use tracing::debug;

/// Repository statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    /// Documents issued and not yet disposed
    pub open_documents: usize,
    /// File sources still referenced by some segment
    pub open_file_sources: usize,
    /// Page store allocation counters
    pub page_store: PageStoreStats,
}

/// State shared between the repository handle and its documents
pub(crate) struct RepositoryShared {
    config: Config,
    page_store: Arc<dyn PageStore>,
    file_sources: Mutex<HashMap<PathBuf, Weak<FileSource>>>,
    documents: Mutex<HashSet<DocumentId>>,
    next_document_id: AtomicU64,
    disposed: AtomicBool,
}

impl RepositoryShared {
    pub(crate) fn new_memory_source(&self) -> SharedMemorySource {
        let source = MemorySource::new(Arc::clone(&self.page_store), self.config.inline_threshold);
        Arc::new(RwLock::new(source))
    }

    pub(crate) fn register_document(&self) -> DocumentId {
        let id = DocumentId(self.next_document_id.fetch_add(1, Ordering::SeqCst));
        self.documents.lock().insert(id);
        id
    }

    pub(crate) fn unregister_document(&self, id: DocumentId) {
        self.documents.lock().remove(&id);
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StorageError::invalid_operation("repository has been disposed"));
        }
        Ok(())
    }

    fn open_file_source(&self, path: &Path) -> Result<Arc<FileSource>> {
        self.ensure_open()?;
        let canonical = path.canonicalize()?;
        let mut sources = self.file_sources.lock();
        if let Some(source) = sources.get(&canonical).and_then(Weak::upgrade) {
            return Ok(source);
        }
        let source = Arc::new(FileSource::open(&canonical)?);
        sources.insert(canonical, Arc::downgrade(&source));
        Ok(source)
    }
}

/// Factory and registry for file sources and delta documents
pub struct SegmentsRepository {
    shared: Arc<RepositoryShared>,
}

impl SegmentsRepository {
    /// Create a repository with a temp-file page store built from `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = TempPageStore::with_config(&config)?;
        debug!(
            dir = %store.dir().display(),
            page_size = config.page_size,
            "created segments repository"
        );
        Ok(Self::with_page_store(config, Arc::new(store)))
    }

    /// Create a repository on top of an existing page store.
    ///
    /// The store's page size takes precedence over the one in `config`.
    pub fn with_page_store(mut config: Config, page_store: Arc<dyn PageStore>) -> Self {
        config.page_size = page_store.page_size();
        Self {
            shared: Arc::new(RepositoryShared {
                config,
                page_store,
                file_sources: Mutex::new(HashMap::new()),
                documents: Mutex::new(HashSet::new()),
                next_document_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Configuration the repository runs with
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Page store backing every memory source of this repository
    pub fn page_store(&self) -> &Arc<dyn PageStore> {
        &self.shared.page_store
    }

    /// Shared read-only source for the file at `path`.
    ///
    /// Repeated calls for the same file return the same source for as long as
    /// anything still references it.
    pub fn open_file_source(&self, path: impl AsRef<Path>) -> Result<Arc<FileSource>> {
        self.shared.open_file_source(path.as_ref())
    }

    /// New document spanning `source`, or an empty one
    pub fn create_document(&self, source: Option<Arc<FileSource>>) -> Result<DeltaDocument> {
        self.shared.ensure_open()?;
        Ok(DeltaDocument::new(Arc::clone(&self.shared), source))
    }

    /// New document over the file at `path`
    pub fn open_document(&self, path: impl AsRef<Path>) -> Result<DeltaDocument> {
        let source = self.open_file_source(path)?;
        self.create_document(Some(source))
    }

    /// Independent copy of `document`
    pub fn create_copy(&self, document: &DeltaDocument) -> Result<DeltaDocument> {
        if !Arc::ptr_eq(document.repository(), &self.shared) {
            return Err(StorageError::invalid_operation(format!(
                "document {} belongs to another repository",
                document.id()
            )));
        }
        document.ensure_live()?;
        document.copy()
    }

    /// Write `document` to `path` and rebase it onto the saved file.
    ///
    /// The bytes go to a temporary file next to `path` which then replaces
    /// it, so the target is never observed half written. Afterwards the
    /// document is a single file segment over the new file; other documents
    /// keep reading the file version they were opened on.
    pub fn save_document(&self, document: &mut DeltaDocument, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        document.ensure_live()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(dir)?;
        let written = {
            let mut writer = BufWriter::new(staged.as_file_mut());
            document.save_to(&mut writer)?
        };
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| e.error)?;

        let canonical = path.canonicalize()?;
        let source = Arc::new(FileSource::open(&canonical)?);
        self.shared
            .file_sources
            .lock()
            .insert(canonical, Arc::downgrade(&source));
        document.rebase(source);
        debug!(document = %document.id(), path = %path.display(), bytes = written, "saved document");
        Ok(written)
    }

    /// Number of documents issued and not yet disposed
    pub fn open_documents(&self) -> usize {
        self.shared.documents.lock().len()
    }

    /// Paths of file sources that are still referenced
    pub fn open_file_sources(&self) -> Vec<PathBuf> {
        let mut sources = self.shared.file_sources.lock();
        sources.retain(|_, source| source.strong_count() > 0);
        let mut paths: Vec<PathBuf> = sources.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Current statistics
    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            open_documents: self.open_documents(),
            open_file_sources: self.open_file_sources().len(),
            page_store: self.shared.page_store.stats(),
        }
    }

    /// End the session: forget every tracked source and document and delete
    /// the page store's swap files.
    ///
    /// Documents still alive afterwards reject edits.
    pub fn dispose(&self) -> Result<()> {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.file_sources.lock().clear();
        self.shared.documents.lock().clear();
        self.shared.page_store.close()?;
        debug!("disposed segments repository");
        Ok(())
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SegmentsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentsRepository")
            .field("config", &self.shared.config)
            .field("documents", &self.open_documents())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
