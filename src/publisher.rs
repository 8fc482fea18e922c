//! Run publisher
//!
//! Sequences a whole run: run-level XML and InterOp files first, then each
//! product's alignment, index, ancillary, genotype and qc files. Every
//! category call is isolated. A failure inside one is logged, counted once
//! against the error budget and the run moves on. Once the budget is
//! exceeded the remaining calls are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use seqpub_catalog::{discover_files, Catalog, Category, FileCatalog};
use seqpub_store::{join_path, RemoteStore};

use crate::checkpoint::CheckpointStore;
use crate::composition::Product;
use crate::config::PublishConfig;
use crate::error::PublishError;
use crate::integrity::{IntegrityFacts, IntegrityResolver};
use crate::metadata::{IdentityProvider, MetadataError, MetadataSynthesizer};
use crate::summary::{CategoryReport, PublishSummary};
use crate::sync::{BatchCounts, ErrorBudget, RemoteObject, SyncEngine};

/// Publishes one run directory.
pub struct RunPublisher {
    config: PublishConfig,
    catalog: Catalog,
    products: Vec<Arc<Product>>,
    resolver: IntegrityResolver,
    synthesizer: MetadataSynthesizer,
    engine: SyncEngine,
    reports: Vec<CategoryReport>,
    duration_ms: u64,
}

impl RunPublisher {
    /// Discover the run directory and prepare to publish it.
    ///
    /// Configuration, discovery and composition errors are returned here and
    /// never deferred to publication.
    pub fn new(
        config: PublishConfig,
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, PublishError> {
        config.validate()?;
        let files = discover_files(config.source_directory())?;
        Self::with_files(config, files, store, identity)
    }

    /// Prepare to publish an explicit list of files.
    pub fn with_files(
        config: PublishConfig,
        mut files: Vec<PathBuf>,
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, PublishError> {
        config.validate()?;

        let restart_path = config.restart_path();
        files.retain(|f| f != &restart_path);

        let catalog = FileCatalog::new(config.catalog_config()).classify(&files);
        for path in &catalog.unassigned {
            warn!(file = %path.display(), "file matches no category, not published");
        }

        let products = catalog
            .compositions
            .values()
            .map(|descriptor| Product::load(descriptor).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            id_run = config.id_run,
            files = files.len(),
            classified = catalog.len(),
            products = products.len(),
            "run discovered"
        );

        let resolver = IntegrityResolver::new(files, config.integrity.num_reads_property.clone());
        let synthesizer = MetadataSynthesizer::from_config(&config, identity);
        let engine = SyncEngine::new(
            store,
            CheckpointStore::new(config.restart_path()),
            config.max_errors,
            config.force,
        )
        .with_managed_owners(synthesizer.managed_owners());

        Ok(Self {
            config,
            catalog,
            products,
            resolver,
            synthesizer,
            engine,
            reports: Vec::new(),
            duration_ms: 0,
        })
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn products(&self) -> Vec<Arc<Product>> {
        self.products.clone()
    }

    pub fn budget(&self) -> &ErrorBudget {
        self.engine.budget()
    }

    pub fn reports(&self) -> &[CategoryReport] {
        &self.reports
    }

    /// Collection for run-level XML.
    pub fn base_collection(&self) -> String {
        self.config.base_collection()
    }

    /// Collection for product files: the base collection, plus the
    /// alt-process name when one is configured.
    pub fn destination_collection(&self) -> String {
        let base = self.base_collection();
        match &self.config.alt_process {
            Some(alt) => join_path(&base, alt),
            None => base,
        }
    }

    pub fn qc_collection(&self) -> String {
        join_path(&self.destination_collection(), &self.config.formats.qc_subdir)
    }

    pub fn publish_xml_files(&mut self) -> Result<BatchCounts, PublishError> {
        let files = self.catalog.run_files(Category::Xml);
        let collection = self.base_collection();
        self.publish_category(Category::Xml, None, &files, &collection, None, false)
    }

    pub fn publish_interop_files(&mut self) -> Result<BatchCounts, PublishError> {
        let files = self.catalog.run_files(Category::Interop);
        let collection = join_path(&self.base_collection(), &self.config.formats.interop_dir);
        self.publish_category(Category::Interop, None, &files, &collection, None, false)
    }

    /// Alignment files in the configured format, tagged with read count,
    /// digest and composition.
    pub fn publish_alignment_files(
        &mut self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        let extension = self.config.file_format.extension();
        let files: Vec<PathBuf> = self
            .catalog
            .product_files(Category::Alignment, &product.name)
            .into_iter()
            .filter(|f| has_extension(f, extension))
            .collect();
        if files.is_empty() {
            return Ok(BatchCounts::default());
        }

        let facts = self.resolver.resolve(&product.name)?;
        let collection = self.destination_collection();
        self.publish_category(
            Category::Alignment,
            Some(product),
            &files,
            &collection,
            Some(facts),
            with_spiked_control,
        )
    }

    /// Index files, only when the product has reads.
    pub fn publish_index_files(
        &mut self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        let files = self.catalog.product_files(Category::Index, &product.name);
        if files.is_empty() {
            return Ok(BatchCounts::default());
        }

        let num_reads = self.resolver.num_reads(&product.name)?;
        if num_reads == 0 {
            info!(product = %product.name, "no reads, index files not published");
            return Ok(BatchCounts::default());
        }

        let collection = self.destination_collection();
        self.publish_category(
            Category::Index,
            Some(product),
            &files,
            &collection,
            None,
            with_spiked_control,
        )
    }

    pub fn publish_ancillary_files(
        &mut self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        let files = self.catalog.product_files(Category::Ancillary, &product.name);
        let collection = self.destination_collection();
        self.publish_category(
            Category::Ancillary,
            Some(product),
            &files,
            &collection,
            None,
            with_spiked_control,
        )
    }

    pub fn publish_genotype_files(
        &mut self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        let files = self.catalog.product_files(Category::Genotype, &product.name);
        let collection = self.destination_collection();
        self.publish_category(
            Category::Genotype,
            Some(product),
            &files,
            &collection,
            None,
            with_spiked_control,
        )
    }

    /// QC files go to the qc sub-collection, never the main one.
    pub fn publish_qc_files(
        &mut self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        let files = self.catalog.product_files(Category::Qc, &product.name);
        let collection = self.qc_collection();
        self.publish_category(
            Category::Qc,
            Some(product),
            &files,
            &collection,
            None,
            with_spiked_control,
        )
    }

    /// Publish the whole run and return the summed counts.
    #[instrument(skip(self), fields(id_run = self.config.id_run))]
    pub fn publish_all(&mut self, with_spiked_control: bool) -> BatchCounts {
        let started = Instant::now();
        self.reports.clear();
        let mut totals = BatchCounts::default();

        for category in Category::RUN_LEVEL {
            totals += self.guarded(category, None, with_spiked_control);
        }

        for product in self.products.clone() {
            for category in Category::PRODUCT_LEVEL {
                totals += self.guarded(category, Some(&product), with_spiked_control);
            }
        }

        self.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            considered = totals.considered,
            published = totals.published,
            errors = totals.errors,
            duration_ms = self.duration_ms,
            "run published"
        );
        totals
    }

    /// Summary of the last `publish_all`.
    pub fn summary(&self) -> PublishSummary {
        PublishSummary::new(
            self.config.id_run,
            self.config.source_directory.clone(),
            self.destination_collection(),
            self.reports.clone(),
            self.engine.budget(),
            self.duration_ms,
        )
    }

    /// Run one category call, converting any failure into one counted error.
    fn guarded(
        &mut self,
        category: Category,
        product: Option<&Product>,
        with_spiked_control: bool,
    ) -> BatchCounts {
        let name = product.map(|p| p.name.clone());

        if let Err(e) = self.engine.budget().check() {
            warn!(%category, product = ?name, error = %e, "category skipped");
            self.reports.push(CategoryReport::skipped(category, name, &e));
            return BatchCounts::default();
        }

        let report = match self.dispatch(category, product, with_spiked_control) {
            Ok(counts) => CategoryReport::completed(category, name, counts),
            Err(e) => {
                let errors = self.engine.charge_error();
                error!(%category, product = ?name, error = %e, kind = e.kind(), errors, "category failed");
                CategoryReport::failed(category, name, &e)
            }
        };

        let counts = report.counts;
        self.reports.push(report);
        counts
    }

    fn dispatch(
        &mut self,
        category: Category,
        product: Option<&Product>,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        match (category, product) {
            (Category::Xml, _) => self.publish_xml_files(),
            (Category::Interop, _) => self.publish_interop_files(),
            (Category::Alignment, Some(p)) => self.publish_alignment_files(p, with_spiked_control),
            (Category::Index, Some(p)) => self.publish_index_files(p, with_spiked_control),
            (Category::Ancillary, Some(p)) => self.publish_ancillary_files(p, with_spiked_control),
            (Category::Genotype, Some(p)) => self.publish_genotype_files(p, with_spiked_control),
            (Category::Qc, Some(p)) => self.publish_qc_files(p, with_spiked_control),
            (_, None) => Err(MetadataError::MissingProduct(category).into()),
        }
    }

    /// Wire tag callbacks for one category and hand the files to the engine.
    #[instrument(
        skip(self, product, files, facts),
        fields(product = product.map(|p| p.name.as_str()).unwrap_or("-"))
    )]
    fn publish_category(
        &mut self,
        category: Category,
        product: Option<&Product>,
        files: &[PathBuf],
        collection: &str,
        facts: Option<IntegrityFacts>,
        with_spiked_control: bool,
    ) -> Result<BatchCounts, PublishError> {
        let synthesizer = &self.synthesizer;
        let primary = |_: &RemoteObject<'_>| {
            synthesizer.primary_tags(category, product, facts.as_ref())
        };
        let secondary = |_: &RemoteObject<'_>| synthesizer.secondary_tags(product, with_spiked_control);

        Ok(self
            .engine
            .publish_batch(files, collection, &primary, &secondary))
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NoIdentity;
    use seqpub_store::{MemoryStore, StoreOp};
    use std::fs;
    use tempfile::TempDir;

    const COMPOSITION: &str = r#"{"components":[{"id_run":1,"position":1}]}"#;
    const SEQCHKSUM: &str = "all\tall\t10\ta\tb\tc\td\n1#1\tall\t10\ta\tb\tc\td\n";

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn publisher(dir: &TempDir, store: Arc<MemoryStore>) -> RunPublisher {
        let config = PublishConfig::new(1, dir.path());
        RunPublisher::new(config, store, Arc::new(NoIdentity)).unwrap()
    }

    #[test]
    fn test_destination_collection_with_alt_process() {
        let dir = TempDir::new().unwrap();
        let mut config = PublishConfig::new(1, dir.path());
        config.alt_process = Some("alt".to_string());
        let publisher =
            RunPublisher::new(config, Arc::new(MemoryStore::new()), Arc::new(NoIdentity)).unwrap();

        assert_eq!(publisher.base_collection(), "/seq/1");
        assert_eq!(publisher.destination_collection(), "/seq/1/alt");
        assert_eq!(publisher.qc_collection(), "/seq/1/alt/qc");
    }

    #[test]
    fn test_run_level_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "RunInfo.xml", "<run/>");
        write(dir.path(), "InterOp/TileMetricsOut.bin", "tiles");
        let store = Arc::new(MemoryStore::new());

        let mut publisher = publisher(&dir, store.clone());
        let totals = publisher.publish_all(false);

        assert_eq!(totals, BatchCounts::new(2, 2, 0));
        assert!(store.content("/seq/1/RunInfo.xml").is_some());
        assert!(store.content("/seq/1/InterOp/TileMetricsOut.bin").is_some());
        assert_eq!(
            store.object_acl("/seq/1/RunInfo.xml"),
            vec![seqpub_store::Permission::read("public")]
        );
    }

    #[test]
    fn test_empty_run_level_group_grants_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "RunInfo.xml", "<run/>");
        let store = Arc::new(MemoryStore::new());

        let mut config = PublishConfig::new(1, dir.path());
        config.permissions.run_level_group = Some(String::new());
        let totals = RunPublisher::new(config, store.clone(), Arc::new(NoIdentity))
            .unwrap()
            .publish_all(false);

        assert_eq!(totals, BatchCounts::new(1, 1, 0));
        assert!(store.object_acl("/seq/1/RunInfo.xml").is_empty());
    }

    #[test]
    fn test_missing_integrity_file_is_one_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "s1.composition.json", COMPOSITION);
        write(dir.path(), "s1.cram", "reads");
        write(dir.path(), "s1.seqchksum", SEQCHKSUM);
        write(dir.path(), "s1.bamcheck", "check");
        let store = Arc::new(MemoryStore::new());

        let mut publisher = publisher(&dir, store.clone());
        let totals = publisher.publish_all(false);

        // Alignment fails for the missing flagstats; ancillary still goes.
        assert_eq!(totals, BatchCounts::new(1, 1, 1));
        assert_eq!(store.count_for(StoreOp::Put, "/seq/1/s1.cram"), 0);
        assert!(store.content("/seq/1/s1.bamcheck").is_some());

        let failed: Vec<_> = publisher.reports().iter().filter(|r| r.error.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].category, Category::Alignment);
        assert_eq!(failed[0].error_kind.as_deref(), Some("integrity"));
    }

    #[test]
    fn test_bad_composition_fails_construction() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "s1.composition.json", "{}");
        let result = RunPublisher::new(
            PublishConfig::new(1, dir.path()),
            Arc::new(MemoryStore::new()),
            Arc::new(NoIdentity),
        );
        assert!(matches!(result, Err(PublishError::Composition(_))));
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let dir = TempDir::new().unwrap();
        let mut config = PublishConfig::new(1, dir.path());
        config.dest_collection = Some("relative".to_string());
        let result = RunPublisher::new(config, Arc::new(MemoryStore::new()), Arc::new(NoIdentity));
        assert!(matches!(result, Err(PublishError::Config(_))));
    }

    #[test]
    fn test_custom_restart_file_not_published() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "RunInfo.xml", "<run/>");
        write(dir.path(), "restart.xml", "{}");
        let mut config = PublishConfig::new(1, dir.path());
        config.restart_file = Some(dir.path().join("restart.xml"));

        let publisher =
            RunPublisher::new(config, Arc::new(MemoryStore::new()), Arc::new(NoIdentity)).unwrap();
        assert_eq!(publisher.catalog().files(Category::Xml).len(), 1);
    }
}
