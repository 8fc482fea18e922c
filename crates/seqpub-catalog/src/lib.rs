//! Classification of sequencing run output into publishable categories.
//!
//! A run directory holds run-level files (instrument XML, InterOp metrics)
//! and per-product files that share a product name as their filename prefix.
//! Products are defined by their `<name>.composition.json` descriptors.

mod config;
mod discover;
mod lookup;

pub use config::{
    AlignmentFormat, CatalogConfig, DEFAULT_ANCILLARY_SUFFIXES, DEFAULT_GENOTYPE_SUFFIXES,
    DEFAULT_INTEROP_DIR, DEFAULT_QC_SUBDIR,
};
pub use discover::{discover_files, DEFAULT_RESTART_FILE};
pub use lookup::{
    exact_name_pattern, match_exactly_one, parse_product_name, DiscoveryError, ProductPath,
    COMPOSITION_SUFFIX,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// File category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Xml,
    Interop,
    Alignment,
    Index,
    Ancillary,
    Genotype,
    Qc,
}

impl Category {
    /// Run-level categories, in publication order.
    pub const RUN_LEVEL: [Category; 2] = [Category::Xml, Category::Interop];

    /// Product categories, in publication order.
    pub const PRODUCT_LEVEL: [Category; 5] = [
        Category::Alignment,
        Category::Index,
        Category::Ancillary,
        Category::Genotype,
        Category::Qc,
    ];

    /// Whether files in this category belong to the run rather than a product.
    pub fn is_run_level(&self) -> bool {
        matches!(self, Category::Xml | Category::Interop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Xml => "xml",
            Category::Interop => "interop",
            Category::Alignment => "alignment",
            Category::Index => "index",
            Category::Ancillary => "ancillary",
            Category::Genotype => "genotype",
            Category::Qc => "qc",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered local file with its category and owning product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFile {
    pub path: PathBuf,
    pub category: Category,
    /// Owning product; `None` for run-level files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// Result of classifying a run directory's files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Files by category, each list in path order.
    pub groups: BTreeMap<Category, Vec<RunFile>>,
    /// Composition descriptors by product name.
    pub compositions: BTreeMap<String, PathBuf>,
    /// Files matching no rule, or product-scoped files with no owning product.
    pub unassigned: Vec<PathBuf>,
}

impl Catalog {
    /// All files in a category.
    pub fn files(&self, category: Category) -> &[RunFile] {
        self.groups.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Paths in a category belonging to one product.
    pub fn product_files(&self, category: Category, product: &str) -> Vec<PathBuf> {
        self.files(category)
            .iter()
            .filter(|f| f.product.as_deref() == Some(product))
            .map(|f| f.path.clone())
            .collect()
    }

    /// Paths of a run-level category.
    pub fn run_files(&self, category: Category) -> Vec<PathBuf> {
        self.files(category).iter().map(|f| f.path.clone()).collect()
    }

    /// Product names in sorted order.
    pub fn products(&self) -> Vec<String> {
        self.compositions.keys().cloned().collect()
    }

    /// Total number of classified files.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classifier for run output files.
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    config: CatalogConfig,
}

impl FileCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Classify a flat list of paths.
    ///
    /// Products are taken from the composition descriptors in `paths`; each
    /// product file is assigned to the longest product name it starts with.
    pub fn classify(&self, paths: &[PathBuf]) -> Catalog {
        let mut catalog = Catalog::default();

        for path in paths {
            if let Ok(product) = parse_product_name(path) {
                catalog.compositions.insert(product.name, path.clone());
            }
        }

        let mut names: Vec<&str> = catalog.compositions.keys().map(String::as_str).collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));

        let mut unassigned = Vec::new();
        let mut groups: BTreeMap<Category, Vec<RunFile>> = BTreeMap::new();

        for path in paths {
            if catalog.compositions.values().any(|p| p == path) {
                continue;
            }

            let Some(category) = self.category_of(path) else {
                unassigned.push(path.clone());
                continue;
            };

            let product = if category.is_run_level() {
                None
            } else {
                match owning_product(path, &names) {
                    Some(name) => Some(name.to_string()),
                    None => {
                        unassigned.push(path.clone());
                        continue;
                    }
                }
            };

            groups.entry(category).or_default().push(RunFile {
                path: path.clone(),
                category,
                product,
            });
        }

        for files in groups.values_mut() {
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }
        unassigned.sort();

        catalog.groups = groups;
        catalog.unassigned = unassigned;
        catalog
    }

    /// Category of a single path, if any rule matches.
    pub fn category_of(&self, path: &Path) -> Option<Category> {
        let file_name = path.file_name()?.to_str()?;
        if file_name.ends_with(&format!(".{}", COMPOSITION_SUFFIX)) {
            return None;
        }
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if extension == "json" && has_component(path, &self.config.qc_subdir) {
            return Some(Category::Qc);
        }
        if extension == "xml" {
            return Some(Category::Xml);
        }
        if extension == "bin" && has_component(path, &self.config.interop_dir) {
            return Some(Category::Interop);
        }

        let format = self.config.file_format;
        if extension == format.extension() {
            return Some(Category::Alignment);
        }
        if extension == format.index_extension() {
            return Some(Category::Index);
        }
        if has_suffix(file_name, &self.config.genotype_suffixes) {
            return Some(Category::Genotype);
        }
        if has_suffix(file_name, &self.config.ancillary_suffixes) {
            return Some(Category::Ancillary);
        }

        None
    }
}

fn has_component(path: &Path, component: &str) -> bool {
    path.parent()
        .map(|parent| parent.components().any(|c| c.as_os_str() == component))
        .unwrap_or(false)
}

fn has_suffix(file_name: &str, suffixes: &[String]) -> bool {
    suffixes
        .iter()
        .any(|s| file_name.len() > s.len() + 1 && file_name.ends_with(&format!(".{}", s)))
}

/// Longest product name (names sorted longest first) that `path` starts with.
fn owning_product<'a>(path: &Path, names_longest_first: &[&'a str]) -> Option<&'a str> {
    let file_name = path.file_name()?.to_str()?;
    names_longest_first.iter().copied().find(|name| {
        file_name
            .strip_prefix(name)
            .map(|rest| rest.starts_with('.') || rest.starts_with('_'))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_paths() -> Vec<PathBuf> {
        [
            "/run/RunInfo.xml",
            "/run/runParameters.xml",
            "/run/InterOp/TileMetricsOut.bin",
            "/run/InterOp/QMetricsOut.bin",
            "/run/sample1.composition.json",
            "/run/sample1.cram",
            "/run/sample1.cram.crai",
            "/run/sample1.bed",
            "/run/sample1_F0xB00.stats",
            "/run/sample1.bcf",
            "/run/qc/sample1.insert_size.json",
            "/run/sample1_phix.composition.json",
            "/run/sample1_phix.cram",
            "/run/orphan.cram",
            "/run/notes.md",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    }

    #[test]
    fn test_classify_run_level() {
        let catalog = FileCatalog::default().classify(&run_paths());
        assert_eq!(catalog.files(Category::Xml).len(), 2);
        assert_eq!(catalog.files(Category::Interop).len(), 2);
        assert!(catalog.files(Category::Xml).iter().all(|f| f.product.is_none()));
    }

    #[test]
    fn test_classify_product_files() {
        let catalog = FileCatalog::default().classify(&run_paths());
        assert_eq!(catalog.products(), vec!["sample1", "sample1_phix"]);

        assert_eq!(
            catalog.product_files(Category::Alignment, "sample1"),
            vec![PathBuf::from("/run/sample1.cram")]
        );
        assert_eq!(
            catalog.product_files(Category::Alignment, "sample1_phix"),
            vec![PathBuf::from("/run/sample1_phix.cram")]
        );
        assert_eq!(
            catalog.product_files(Category::Index, "sample1"),
            vec![PathBuf::from("/run/sample1.cram.crai")]
        );
        assert_eq!(catalog.product_files(Category::Ancillary, "sample1").len(), 2);
        assert_eq!(
            catalog.product_files(Category::Genotype, "sample1"),
            vec![PathBuf::from("/run/sample1.bcf")]
        );
        assert_eq!(
            catalog.product_files(Category::Qc, "sample1"),
            vec![PathBuf::from("/run/qc/sample1.insert_size.json")]
        );
    }

    #[test]
    fn test_unowned_and_unknown_files_are_unassigned() {
        let catalog = FileCatalog::default().classify(&run_paths());
        assert_eq!(
            catalog.unassigned,
            vec![PathBuf::from("/run/notes.md"), PathBuf::from("/run/orphan.cram")]
        );
    }

    #[test]
    fn test_compositions_are_not_categorised() {
        let catalog = FileCatalog::default().classify(&run_paths());
        for files in catalog.groups.values() {
            assert!(files
                .iter()
                .all(|f| !f.path.to_string_lossy().ends_with("composition.json")));
        }
    }

    #[test]
    fn test_bam_format_switches_alignment_and_index() {
        let catalog = FileCatalog::new(CatalogConfig {
            file_format: AlignmentFormat::Bam,
            ..Default::default()
        });
        assert_eq!(catalog.category_of(Path::new("/r/s.bam")), Some(Category::Alignment));
        assert_eq!(catalog.category_of(Path::new("/r/s.bai")), Some(Category::Index));
        assert_eq!(catalog.category_of(Path::new("/r/s.cram")), None);
    }

    #[test]
    fn test_json_outside_qc_is_not_qc() {
        let catalog = FileCatalog::default();
        assert_eq!(catalog.category_of(Path::new("/r/s.bam_flagstats.json")), None);
        assert_eq!(
            catalog.category_of(Path::new("/r/qc/s.bam_flagstats.json")),
            Some(Category::Qc)
        );
    }

    #[test]
    fn test_classification_is_order_independent() {
        let mut reversed = run_paths();
        reversed.reverse();
        let a = FileCatalog::default().classify(&run_paths());
        let b = FileCatalog::default().classify(&reversed);
        assert_eq!(a.groups, b.groups);
        assert_eq!(a.unassigned, b.unassigned);
    }
}
