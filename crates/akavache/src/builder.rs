//! Fluent builder wiring the four named caches
//! (`user_account`/`local_machine`/`secure`/`in_memory`) onto concrete
//! backends.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use akavache_core::{
    CacheBackend, CacheEntry, CacheError, EncryptionProvider, ForcedDateTimeKind, JsonSerializer,
    NoopEncryptionProvider, Result, Serializer,
};
use akavache_storage::{MemoryBackend, SqliteBackend, SqliteConfig};

use crate::fs::{FilesystemProvider, StdFilesystemProvider};
use crate::object_cache::ObjectCache;
use crate::queue::OperationQueue;
use crate::scheduler::{TaskScheduler, TokioScheduler};

/// Backend for one of the four root caches: either the SQLite file
/// fronted by an [`OperationQueue`], or a bare in-memory map. One
/// concrete type lets all four caches live behind the same
/// `ObjectCache<RootBackend, S>` regardless of which backing a given
/// deployment chose for it.
pub enum RootBackend {
    Sqlite(OperationQueue<SqliteBackend>),
    Memory(MemoryBackend),
}

#[async_trait]
impl CacheBackend for RootBackend {
    async fn insert(&self, entry: CacheEntry) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.insert(entry).await,
            RootBackend::Memory(b) => b.insert(entry).await,
        }
    }

    async fn insert_bulk(&self, entries: Vec<CacheEntry>) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.insert_bulk(entries).await,
            RootBackend::Memory(b) => b.insert_bulk(entries).await,
        }
    }

    async fn get(&self, key: &str, type_tag: Option<&str>) -> Result<Option<CacheEntry>> {
        match self {
            RootBackend::Sqlite(b) => b.get(key, type_tag).await,
            RootBackend::Memory(b) => b.get(key, type_tag).await,
        }
    }

    async fn get_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<Vec<Option<CacheEntry>>> {
        match self {
            RootBackend::Sqlite(b) => b.get_bulk(keys, type_tag).await,
            RootBackend::Memory(b) => b.get_bulk(keys, type_tag).await,
        }
    }

    async fn get_all_keys(&self, type_tag: Option<&str>) -> Result<Vec<String>> {
        match self {
            RootBackend::Sqlite(b) => b.get_all_keys(type_tag).await,
            RootBackend::Memory(b) => b.get_all_keys(type_tag).await,
        }
    }

    async fn get_created_at(&self, key: &str, type_tag: Option<&str>) -> Result<Option<DateTime<Utc>>> {
        match self {
            RootBackend::Sqlite(b) => b.get_created_at(key, type_tag).await,
            RootBackend::Memory(b) => b.get_created_at(key, type_tag).await,
        }
    }

    async fn invalidate(&self, key: &str, type_tag: Option<&str>) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.invalidate(key, type_tag).await,
            RootBackend::Memory(b) => b.invalidate(key, type_tag).await,
        }
    }

    async fn invalidate_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.invalidate_bulk(keys, type_tag).await,
            RootBackend::Memory(b) => b.invalidate_bulk(keys, type_tag).await,
        }
    }

    async fn invalidate_all(&self, type_tag: Option<&str>) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.invalidate_all(type_tag).await,
            RootBackend::Memory(b) => b.invalidate_all(type_tag).await,
        }
    }

    async fn vacuum(&self) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.vacuum().await,
            RootBackend::Memory(b) => b.vacuum().await,
        }
    }

    async fn flush(&self, type_tag: Option<&str>) -> Result<()> {
        match self {
            RootBackend::Sqlite(b) => b.flush(type_tag).await,
            RootBackend::Memory(b) => b.flush(type_tag).await,
        }
    }
}

/// The four root caches a fully wired deployment gets: an explicit,
/// constructed object threaded through call sites rather than relying
/// on process-wide `UserAccount`/`LocalMachine`/`Secure`/`InMemory`
/// singletons.
pub struct Akavache<S: Serializer = JsonSerializer> {
    pub user_account: ObjectCache<RootBackend, S>,
    pub local_machine: ObjectCache<RootBackend, S>,
    pub secure: ObjectCache<RootBackend, S>,
    pub in_memory: ObjectCache<RootBackend, S>,
}

impl<S: Serializer> Akavache<S> {
    /// Flushes and disposes every root cache. Idempotent.
    pub async fn dispose_all(&self) -> Result<()> {
        self.user_account.blob_cache().dispose().await?;
        self.local_machine.blob_cache().dispose().await?;
        self.secure.blob_cache().dispose().await?;
        self.in_memory.blob_cache().dispose().await?;
        Ok(())
    }
}

/// Fluent builder for [`Akavache`]: a chained configuration object,
/// consuming `self` at each step.
pub struct AkavacheBuilder<S: Serializer = JsonSerializer> {
    application_name: String,
    serializer: S,
    encryption_provider: Arc<dyn EncryptionProvider>,
    filesystem_provider: Arc<dyn FilesystemProvider>,
    scheduler: Arc<dyn TaskScheduler>,
    sqlite_defaults: bool,
    settings_cache_path: Option<PathBuf>,
}

impl AkavacheBuilder<JsonSerializer> {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            serializer: JsonSerializer::new(),
            encryption_provider: Arc::new(NoopEncryptionProvider),
            filesystem_provider: Arc::new(StdFilesystemProvider::default()),
            scheduler: Arc::new(TokioScheduler),
            sqlite_defaults: true,
            settings_cache_path: None,
        }
    }

    /// Only available while the serializer is still the default
    /// `JsonSerializer`: rewrites it in place with the requested
    /// date-time normalization. Setting a custom serializer via
    /// [`AkavacheBuilder::serializer`] supersedes this; construct that
    /// serializer with its own `with_forced_date_time_kind` instead.
    pub fn forced_date_time_kind(mut self, kind: ForcedDateTimeKind) -> Self {
        self.serializer = JsonSerializer::with_forced_date_time_kind(kind);
        self
    }
}

impl<S: Serializer> AkavacheBuilder<S> {
    /// Swaps the serializer, changing the builder's (and the resulting
    /// [`Akavache`]'s) type parameter. A type-state step rather than a
    /// mutation, since the serializer fixes `T` bounds downstream.
    pub fn serializer<S2: Serializer>(self, serializer: S2) -> AkavacheBuilder<S2> {
        AkavacheBuilder {
            application_name: self.application_name,
            serializer,
            encryption_provider: self.encryption_provider,
            filesystem_provider: self.filesystem_provider,
            scheduler: self.scheduler,
            sqlite_defaults: self.sqlite_defaults,
            settings_cache_path: self.settings_cache_path,
        }
    }

    /// Encryption applies only to the `secure` root cache; the other
    /// three keep [`NoopEncryptionProvider`], matching the split between
    /// one encrypted "Secure" store and the plaintext User/Local/InMemory
    /// ones.
    pub fn encryption_provider(mut self, provider: impl EncryptionProvider + 'static) -> Self {
        self.encryption_provider = Arc::new(provider);
        self
    }

    pub fn filesystem_provider(mut self, provider: impl FilesystemProvider + 'static) -> Self {
        self.filesystem_provider = Arc::new(provider);
        self
    }

    pub fn scheduler(mut self, scheduler: impl TaskScheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Whether `user_account`/`local_machine`/`secure` are SQLite-backed
    /// (the default) or fall back to in-memory maps, e.g. for tests
    /// that want every root cache ephemeral.
    pub fn sqlite_defaults(mut self, enabled: bool) -> Self {
        self.sqlite_defaults = enabled;
        self
    }

    pub fn settings_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_cache_path = Some(path.into());
        self
    }

    fn open_root(&self, dir: PathBuf, file_name: &str) -> Result<RootBackend> {
        if !self.sqlite_defaults {
            return Ok(RootBackend::Memory(MemoryBackend::with_defaults()));
        }
        self.filesystem_provider.create_recursive(&dir)?;
        let backend = SqliteBackend::open(dir.join(file_name), SqliteConfig::default())?;
        Ok(RootBackend::Sqlite(OperationQueue::with_scheduler(
            backend,
            self.scheduler.clone(),
        )))
    }

    pub fn build(self) -> Result<Akavache<S>> {
        let roaming_dir = self
            .settings_cache_path
            .clone()
            .unwrap_or(self.filesystem_provider.default_roaming_dir(&self.application_name)?);
        let local_dir = self
            .settings_cache_path
            .clone()
            .unwrap_or(self.filesystem_provider.default_local_machine_dir(&self.application_name)?);
        let secret_dir = self
            .settings_cache_path
            .clone()
            .unwrap_or(self.filesystem_provider.default_secret_dir(&self.application_name)?);

        let user_account_backend = self.open_root(roaming_dir, "user-account.db")?;
        let local_machine_backend = self.open_root(local_dir, "local-machine.db")?;
        let secure_backend = self.open_root(secret_dir, "secure.db")?;

        Ok(Akavache {
            user_account: ObjectCache::new(
                crate::blob_cache::BlobCache::new(user_account_backend),
                self.serializer.clone(),
            ),
            local_machine: ObjectCache::new(
                crate::blob_cache::BlobCache::new(local_machine_backend),
                self.serializer.clone(),
            ),
            secure: ObjectCache::new(
                crate::blob_cache::BlobCache::with_encryption(secure_backend, self.encryption_provider.clone()),
                self.serializer.clone(),
            ),
            in_memory: ObjectCache::new(
                crate::blob_cache::BlobCache::new(RootBackend::Memory(MemoryBackend::with_defaults())),
                self.serializer,
            ),
        })
    }
}
