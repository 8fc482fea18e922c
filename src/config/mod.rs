//! Configuration layering
//!
//! Three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;
mod publish;

pub use defaults::{
    BuiltinDefaults, DEFAULT_COLLECTION_ROOT, DEFAULT_NUM_READS_PROPERTY, DEFAULT_RUN_LEVEL_GROUP,
};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use publish::{
    FormatConfig, IdentityConfig, IntegrityConfig, PermissionConfig, PublishConfig, RunFacts,
    StoreConfig,
};
