//! The adapter manager: mediates every read between a caching adapter and a
//! ground-truth adapter.
//!
//! Read protocol, in order:
//!
//! 1. Unless the call forces a refresh, ask the caching adapter. A hit
//!    resolves the handle immediately; a miss may still recover partial data;
//!    a cache-side error is logged and downgraded to a miss.
//! 2. If the ground-truth adapter cannot serve the operation, the call fails
//!    with [`FetchError::ServiceUnavailable`], carrying the recovered partial
//!    data.
//! 3. Otherwise the fetch runs on the shared background pool and, on success,
//!    the result is ingested into the cache by a detached task. Ingestion
//!    failures are logged and never affect the delivered result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use adapter_sqlite::SqliteAdapterFactory;
use core_adapter::models::{
    Album, AlbumDetails, Artist, CoverArt, Directory, Genre, Playlist, PlaylistDetails, Song,
};
use core_adapter::{
    Adapter, AdapterFactory, CacheRead, CachingAdapter, CachingAdapterFactory, FetchParams,
    IngestPayload, Operation,
};
use core_task::{AsyncHandle, PoolConfig, TaskPool};
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::{FetchError, ManagerError};
use crate::options::FetchOptions;

/// Handle to the eventual result of a manager read operation.
pub type FetchHandle<T> = AsyncHandle<T, FetchError<T>>;

#[derive(Clone)]
struct AdapterPair {
    ground_truth: Arc<dyn Adapter>,
    caching: Option<Arc<dyn CachingAdapter>>,
}

/// Mediator between the host application and the configured adapter pair.
///
/// Explicitly constructed and owned by the host; nothing here is global
/// state. All methods take `&self`, so the manager is typically wrapped in an
/// `Arc` and shared.
pub struct AdapterManager {
    pool: TaskPool,
    factories: RwLock<HashMap<&'static str, Arc<dyn AdapterFactory>>>,
    caching_factory: Arc<dyn CachingAdapterFactory>,
    pair: tokio::sync::RwLock<Option<AdapterPair>>,
    shutting_down: AtomicBool,
}

impl AdapterManager {
    /// Create a manager with the default SQLite caching adapter.
    pub fn new(pool_config: PoolConfig) -> Self {
        Self::with_caching_factory(pool_config, Arc::new(SqliteAdapterFactory))
    }

    pub fn with_caching_factory(
        pool_config: PoolConfig,
        caching_factory: Arc<dyn CachingAdapterFactory>,
    ) -> Self {
        Self {
            pool: TaskPool::new(pool_config),
            factories: RwLock::new(HashMap::new()),
            caching_factory,
            pair: tokio::sync::RwLock::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register a ground-truth adapter factory. A factory registered under an
    /// already-known kind replaces the previous one.
    pub fn register_adapter(&self, factory: Arc<dyn AdapterFactory>) {
        let kind = factory.kind();
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if factories.insert(kind, factory).is_some() {
            warn!(kind, "replacing previously registered adapter factory");
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Tear down the current adapter pair and build a new one from the host
    /// configuration.
    ///
    /// Each server gets its own storage subtree keyed by its identity hash,
    /// so switching servers never mixes caches. The caching adapter is only
    /// built when caching is enabled and the ground-truth factory allows it.
    ///
    /// The previous pair is fully torn down before the replacement serves
    /// its first request. If building the replacement fails, the manager is
    /// left unconfigured (the previous pair is already gone).
    pub async fn reset(&self, config: &HostConfig) -> Result<(), ManagerError> {
        if self.is_shutting_down() {
            return Err(ManagerError::ShuttingDown);
        }
        let server = config
            .current_server()
            .ok_or(ManagerError::NoServerSelected)?;

        let factory = {
            let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
            factories
                .get(server.kind.as_str())
                .cloned()
                .ok_or_else(|| ManagerError::UnknownAdapterKind(server.kind.clone()))?
        };

        let mut params = HashMap::new();
        for parameter in factory.config_parameters() {
            match server.parameter(parameter.key) {
                Some(value) => {
                    params.insert(parameter.key.to_string(), value.to_string());
                }
                None if parameter.required => {
                    return Err(ManagerError::MissingParameter {
                        server: server.name.clone(),
                        key: parameter.key,
                    });
                }
                None => {}
            }
        }

        let server_root = config.cache_location.join(server.identity_hash());
        let ground_dir = server_root.join("ground");
        let cache_dir = server_root.join("cache");
        tokio::fs::create_dir_all(&ground_dir)
            .await
            .map_err(|e| ManagerError::Io(e.to_string()))?;

        // The write lock is held from teardown through installation: reads
        // issued mid-reset wait and are serviced by the new pair, never by a
        // pair whose teardown is still in flight.
        let mut pair = self.pair.write().await;
        if let Some(previous) = pair.take() {
            Self::teardown(previous).await;
        }

        info!(server = %server.name, kind = %server.kind, "building adapter pair");
        let ground_truth = factory.build(&params, &ground_dir).await?;

        let caching = if config.cache_enabled && factory.can_be_cached() {
            tokio::fs::create_dir_all(&cache_dir)
                .await
                .map_err(|e| ManagerError::Io(e.to_string()))?;
            Some(
                self.caching_factory
                    .build(&HashMap::new(), &cache_dir)
                    .await?,
            )
        } else {
            debug!(server = %server.name, "caching disabled for this adapter");
            None
        };

        *pair = Some(AdapterPair {
            ground_truth,
            caching,
        });
        Ok(())
    }

    async fn teardown(pair: AdapterPair) {
        pair.ground_truth.shutdown().await;
        if let Some(caching) = pair.caching {
            caching.shutdown().await;
        }
    }

    /// Stop accepting work, tear down the adapter pair, and drain the pool.
    ///
    /// Idempotent; reads issued afterwards fail with
    /// [`FetchError::ShuttingDown`].
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("adapter manager shutting down");
        if let Some(pair) = self.pair.write().await.take() {
            Self::teardown(pair).await;
        }
        self.pool.shutdown().await;
    }

    /// Whether `operation` can currently be served at all.
    ///
    /// True only when an adapter pair is configured and the ground-truth
    /// adapter is reachable and implements the operation. A populated cache
    /// alone does not make an operation available.
    pub async fn can(&self, operation: Operation) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        match &*self.pair.read().await {
            Some(pair) => {
                pair.ground_truth.can_service_requests() && pair.ground_truth.can(operation)
            }
            None => false,
        }
    }

    async fn fetch<T, RF, R, GF, G>(
        &self,
        operation: Operation,
        params: FetchParams,
        options: FetchOptions,
        read_cache: RF,
        fetch_ground: GF,
        to_payload: fn(T) -> IngestPayload,
    ) -> FetchHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        RF: FnOnce(Arc<dyn CachingAdapter>) -> R,
        R: Future<Output = core_adapter::Result<CacheRead<T>>>,
        GF: FnOnce(Arc<dyn Adapter>) -> G,
        G: Future<Output = core_adapter::Result<T>> + Send + 'static,
    {
        if self.is_shutting_down() {
            return AsyncHandle::failed(FetchError::ShuttingDown);
        }
        let Some(pair) = self.pair.read().await.clone() else {
            return AsyncHandle::failed(FetchError::NotConfigured);
        };

        let mut partial = None;
        if let Some(caching) = &pair.caching {
            if options.force {
                // Soft invalidation; failure only costs cache freshness.
                if let Err(e) = caching.invalidate(operation, &params).await {
                    warn!(%operation, error = %e, "cache invalidation failed");
                }
            }
            match read_cache(Arc::clone(caching)).await {
                Ok(CacheRead::Hit(value)) if !options.force => {
                    debug!(%operation, "cache hit");
                    return AsyncHandle::ready(value);
                }
                Ok(read) => {
                    partial = read.into_partial();
                    debug!(%operation, has_partial = partial.is_some(), "cache miss");
                }
                Err(e) => {
                    warn!(%operation, error = %e, "cache read failed, treating as miss");
                }
            }
        }

        let ground = Arc::clone(&pair.ground_truth);
        if !(ground.can_service_requests() && ground.can(operation)) {
            debug!(%operation, "no adapter can service the operation");
            return AsyncHandle::failed(FetchError::ServiceUnavailable { operation, partial });
        }

        let work = fetch_ground(ground);
        let before_download = options.before_download.clone();
        let handle = AsyncHandle::spawn(&self.pool, async move {
            if let Some(callback) = &before_download {
                callback();
            }
            work.await.map_err(FetchError::from)
        });

        if let Some(caching) = pair.caching {
            let pool = self.pool.clone();
            handle.add_done_callback(move |outcome| {
                let Ok(value) = outcome else { return };
                let payload = to_payload(value);
                let submitted = pool.spawn_detached(async move {
                    if let Err(e) = caching.ingest_new_data(operation, &params, payload).await {
                        warn!(%operation, error = %e, "cache ingestion failed");
                    }
                });
                if !submitted {
                    debug!(%operation, "pool shut down before ingestion could run");
                }
            });
        }
        handle
    }

    pub async fn get_playlists(&self, options: FetchOptions) -> FetchHandle<Vec<Playlist>> {
        self.fetch(
            Operation::GetPlaylists,
            FetchParams::none(),
            options,
            |cache| async move { cache.cached_playlists().await },
            |ground| async move { ground.get_playlists().await },
            IngestPayload::Playlists,
        )
        .await
    }

    pub async fn get_playlist_details(
        &self,
        playlist_id: &str,
        options: FetchOptions,
    ) -> FetchHandle<PlaylistDetails> {
        let cache_id = playlist_id.to_string();
        let ground_id = playlist_id.to_string();
        self.fetch(
            Operation::GetPlaylistDetails,
            FetchParams::one(playlist_id),
            options,
            move |cache| async move { cache.cached_playlist_details(&cache_id).await },
            move |ground| async move { ground.get_playlist_details(&ground_id).await },
            IngestPayload::PlaylistDetails,
        )
        .await
    }

    pub async fn get_artists(&self, options: FetchOptions) -> FetchHandle<Vec<Artist>> {
        self.fetch(
            Operation::GetArtists,
            FetchParams::none(),
            options,
            |cache| async move { cache.cached_artists().await },
            |ground| async move { ground.get_artists().await },
            IngestPayload::Artists,
        )
        .await
    }

    pub async fn get_artist(&self, artist_id: &str, options: FetchOptions) -> FetchHandle<Artist> {
        let cache_id = artist_id.to_string();
        let ground_id = artist_id.to_string();
        self.fetch(
            Operation::GetArtist,
            FetchParams::one(artist_id),
            options,
            move |cache| async move { cache.cached_artist(&cache_id).await },
            move |ground| async move { ground.get_artist(&ground_id).await },
            IngestPayload::Artist,
        )
        .await
    }

    pub async fn get_albums(&self, options: FetchOptions) -> FetchHandle<Vec<Album>> {
        self.fetch(
            Operation::GetAlbums,
            FetchParams::none(),
            options,
            |cache| async move { cache.cached_albums().await },
            |ground| async move { ground.get_albums().await },
            IngestPayload::Albums,
        )
        .await
    }

    pub async fn get_album(
        &self,
        album_id: &str,
        options: FetchOptions,
    ) -> FetchHandle<AlbumDetails> {
        let cache_id = album_id.to_string();
        let ground_id = album_id.to_string();
        self.fetch(
            Operation::GetAlbum,
            FetchParams::one(album_id),
            options,
            move |cache| async move { cache.cached_album(&cache_id).await },
            move |ground| async move { ground.get_album(&ground_id).await },
            IngestPayload::Album,
        )
        .await
    }

    pub async fn get_song(&self, song_id: &str, options: FetchOptions) -> FetchHandle<Song> {
        let cache_id = song_id.to_string();
        let ground_id = song_id.to_string();
        self.fetch(
            Operation::GetSong,
            FetchParams::one(song_id),
            options,
            move |cache| async move { cache.cached_song(&cache_id).await },
            move |ground| async move { ground.get_song(&ground_id).await },
            IngestPayload::Song,
        )
        .await
    }

    pub async fn get_genres(&self, options: FetchOptions) -> FetchHandle<Vec<Genre>> {
        self.fetch(
            Operation::GetGenres,
            FetchParams::none(),
            options,
            |cache| async move { cache.cached_genres().await },
            |ground| async move { ground.get_genres().await },
            IngestPayload::Genres,
        )
        .await
    }

    pub async fn get_directory(
        &self,
        directory_id: &str,
        options: FetchOptions,
    ) -> FetchHandle<Directory> {
        let cache_id = directory_id.to_string();
        let ground_id = directory_id.to_string();
        self.fetch(
            Operation::GetDirectory,
            FetchParams::one(directory_id),
            options,
            move |cache| async move { cache.cached_directory(&cache_id).await },
            move |ground| async move { ground.get_directory(&ground_id).await },
            IngestPayload::Directory,
        )
        .await
    }

    pub async fn get_cover_art(
        &self,
        cover_art_id: &str,
        options: FetchOptions,
    ) -> FetchHandle<CoverArt> {
        let cache_id = cover_art_id.to_string();
        let ground_id = cover_art_id.to_string();
        self.fetch(
            Operation::GetCoverArt,
            FetchParams::one(cover_art_id),
            options,
            move |cache| async move { cache.cached_cover_art(&cache_id).await },
            move |ground| async move { ground.get_cover_art(&ground_id).await },
            IngestPayload::CoverArt,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    use async_trait::async_trait;
    use core_adapter::ConfigParameter;
    use mockall::mock;
    use std::path::Path;

    mock! {
        GroundTruth {}

        #[async_trait]
        impl Adapter for GroundTruth {
            fn can_service_requests(&self) -> bool;
            fn can(&self, operation: Operation) -> bool;
            async fn shutdown(&self);
            async fn get_playlists(&self) -> core_adapter::Result<Vec<Playlist>>;
        }
    }

    /// Factory handing out one pre-built adapter.
    struct FixedFactory {
        adapter: Arc<dyn Adapter>,
        cacheable: bool,
    }

    #[async_trait]
    impl AdapterFactory for FixedFactory {
        fn kind(&self) -> &'static str {
            "fixed"
        }

        fn config_parameters(&self) -> Vec<ConfigParameter> {
            vec![ConfigParameter::required("address")]
        }

        fn can_be_cached(&self) -> bool {
            self.cacheable
        }

        async fn build(
            &self,
            _params: &HashMap<String, String>,
            _data_dir: &Path,
        ) -> core_adapter::Result<Arc<dyn Adapter>> {
            Ok(Arc::clone(&self.adapter))
        }
    }

    fn host_config(dir: &Path) -> HostConfig {
        HostConfig::new(dir)
            .server(ServerConfig::new("unit", "fixed").address("https://unit.example"))
            .select(0)
    }

    async fn manager_with(adapter: Arc<dyn Adapter>, cache_enabled: bool) -> AdapterManager {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = AdapterManager::new(PoolConfig::default());
        manager.register_adapter(Arc::new(FixedFactory {
            adapter,
            cacheable: true,
        }));
        manager
            .reset(&host_config(dir.path()).cache_enabled(cache_enabled))
            .await
            .expect("reset");
        // Leak the tempdir so the sqlite files outlive this helper.
        std::mem::forget(dir);
        manager
    }

    #[tokio::test]
    async fn reads_before_reset_fail_with_not_configured() {
        let manager = AdapterManager::new(PoolConfig::default());
        let handle = manager.get_playlists(FetchOptions::default()).await;
        assert_eq!(handle.wait().await, Err(FetchError::NotConfigured));
    }

    #[tokio::test]
    async fn reset_requires_a_selected_server() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = AdapterManager::new(PoolConfig::default());
        let config = HostConfig::new(dir.path());
        assert!(matches!(
            manager.reset(&config).await,
            Err(ManagerError::NoServerSelected)
        ));
    }

    #[tokio::test]
    async fn reset_rejects_unknown_adapter_kinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = AdapterManager::new(PoolConfig::default());
        let result = manager.reset(&host_config(dir.path())).await;
        assert!(matches!(result, Err(ManagerError::UnknownAdapterKind(k)) if k == "fixed"));
    }

    #[tokio::test]
    async fn reset_rejects_missing_required_parameters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = AdapterManager::new(PoolConfig::default());
        let mut mock = MockGroundTruth::new();
        mock.expect_shutdown().return_const(());
        manager.register_adapter(Arc::new(FixedFactory {
            adapter: Arc::new(mock),
            cacheable: true,
        }));

        // No address on the server entry.
        let config = HostConfig::new(dir.path())
            .server(ServerConfig::new("unit", "fixed"))
            .select(0);
        assert!(matches!(
            manager.reset(&config).await,
            Err(ManagerError::MissingParameter { key: "address", .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_ground_truth_yields_service_unavailable() {
        let mut mock = MockGroundTruth::new();
        mock.expect_can_service_requests().return_const(false);
        mock.expect_can().return_const(true);
        mock.expect_shutdown().return_const(());

        let manager = manager_with(Arc::new(mock), true).await;
        let handle = manager.get_playlists(FetchOptions::default()).await;
        assert_eq!(
            handle.wait().await,
            Err(FetchError::ServiceUnavailable {
                operation: Operation::GetPlaylists,
                partial: None,
            })
        );
        assert!(!manager.can(Operation::GetPlaylists).await);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unsupported_operation_yields_service_unavailable() {
        let mut mock = MockGroundTruth::new();
        mock.expect_can_service_requests().return_const(true);
        mock.expect_can()
            .returning(|op| op != Operation::GetPlaylists);
        mock.expect_shutdown().return_const(());

        let manager = manager_with(Arc::new(mock), true).await;
        assert!(!manager.can(Operation::GetPlaylists).await);
        assert!(manager.can(Operation::GetGenres).await);

        let handle = manager.get_playlists(FetchOptions::default()).await;
        assert!(matches!(
            handle.wait().await,
            Err(FetchError::ServiceUnavailable { .. })
        ));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn reads_after_shutdown_fail_fast() {
        let mut mock = MockGroundTruth::new();
        mock.expect_can_service_requests().return_const(true);
        mock.expect_can().return_const(true);
        mock.expect_shutdown().return_const(());

        let manager = manager_with(Arc::new(mock), false).await;
        manager.shutdown().await;
        manager.shutdown().await;

        let handle = manager.get_playlists(FetchOptions::default()).await;
        assert_eq!(handle.wait().await, Err(FetchError::ShuttingDown));
        assert!(!manager.can(Operation::GetPlaylists).await);
    }

    #[tokio::test]
    async fn fetch_without_cache_goes_straight_to_ground_truth() {
        let mut mock = MockGroundTruth::new();
        mock.expect_can_service_requests().return_const(true);
        mock.expect_can().return_const(true);
        mock.expect_shutdown().return_const(());
        mock.expect_get_playlists().returning(|| Ok(Vec::new()));

        let manager = manager_with(Arc::new(mock), false).await;
        let handle = manager.get_playlists(FetchOptions::default()).await;
        assert_eq!(handle.wait().await, Ok(Vec::new()));
        manager.shutdown().await;
    }
}
