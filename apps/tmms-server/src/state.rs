use std::sync::Arc;
use std::time::Instant;

use tmms_core::{ManifestCatalog, ManifestResolver, NodeRegistry};
use tokio::sync::Mutex;

use crate::bindings::BindingStore;
use crate::builder::{BuildPaths, BuildTrigger};
use crate::config::AppConfig;
use crate::customize::ImageCustomizer;
use crate::images::ImageCatalog;

/// Shared handler state. Components are built in dependency order and handed
/// in; nothing is looked up lazily.
#[derive(Clone)]
pub struct AppState {
    start: Instant,
    config: Arc<AppConfig>,
    registry: Arc<NodeRegistry>,
    manifests: Arc<dyn ManifestResolver>,
    bindings: Arc<Mutex<BindingStore>>,
    builder: Arc<BuildTrigger>,
    images: Arc<ImageCatalog>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: NodeRegistry,
        manifests: Arc<dyn ManifestResolver>,
        bindings: BindingStore,
        builder: BuildTrigger,
        images: ImageCatalog,
    ) -> Self {
        Self {
            start: Instant::now(),
            config: Arc::new(config),
            registry: Arc::new(registry),
            manifests,
            bindings: Arc::new(Mutex::new(bindings)),
            builder: Arc::new(builder),
            images: Arc::new(images),
        }
    }

    /// Wires the file-backed components described by `config`.
    pub fn from_config(
        config: AppConfig,
        registry: NodeRegistry,
        customizer: Arc<dyn ImageCustomizer>,
    ) -> Self {
        let manifests: Arc<dyn ManifestResolver> =
            Arc::new(ManifestCatalog::new(config.manifest_uploads()));
        let bindings = BindingStore::load(config.node_binding());
        let builder = BuildTrigger::new(BuildPaths::from_config(&config), config.dry_run, customizer);
        let images = ImageCatalog::scan(&config.images_dir());
        Self::new(config, registry, manifests, bindings, builder, images)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn manifests(&self) -> &dyn ManifestResolver {
        self.manifests.as_ref()
    }

    pub fn bindings(&self) -> &Mutex<BindingStore> {
        &self.bindings
    }

    pub fn builder(&self) -> &BuildTrigger {
        &self.builder
    }

    pub fn images(&self) -> &ImageCatalog {
        &self.images
    }
}
