use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::semantic::hybrid::{
    default_section_boosts, ScoringParams, DEFAULT_ALPHA_SEM, DEFAULT_MIN_CONFIDENCE,
};

/// Environment variable overriding the base directory
pub const BASE_PATH_ENV: &str = "INGREDIENT_SEARCH_BASE_PATH";

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_MULTIVECTOR_PATH: &str = "data/novel_foods_multivectors.csv";
const DEFAULT_CARDS_PATH: &str = "data/novel_foods_cards.csv";

/// Default embedding model, multilingual so Latin and English names share one space
const DEFAULT_SEMANTIC_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_BATCH_SIZE: usize = 256;

const DEFAULT_TOP_K: usize = 10;
const DEFAULT_RECALL_K: usize = 200;

const DEFAULT_BIND: &str = "0.0.0.0:5001";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("couldn't find home dir: {0}")]
    HomeDir(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Catalog sources
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// One row per searchable text variant
    #[serde(default = "default_multivector_path")]
    pub multivector_path: PathBuf,

    /// Canonical names per entity; searching works without it
    #[serde(default = "default_cards_path")]
    pub cards_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            multivector_path: default_multivector_path(),
            cards_path: default_cards_path(),
        }
    }
}

fn default_multivector_path() -> PathBuf {
    PathBuf::from(DEFAULT_MULTIVECTOR_PATH)
}

fn default_cards_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_CARDS_PATH))
}

/// Configuration for the embedding model and its cache
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Model name for embeddings (e.g., "paraphrase-multilingual-minilm-l12-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Build and persist the flat inner-product index; brute-force cosine otherwise
    #[serde(default = "default_true")]
    pub use_index: bool,

    /// Texts per embedding call while building the cache
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SEMANTIC_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            use_index: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_SEMANTIC_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Ranking parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,

    /// Candidates recalled before lexical scoring
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,

    /// Semantic weight of the blend [0.0, 1.0]
    #[serde(default = "default_alpha_sem")]
    pub alpha_sem: f64,

    /// Minimum blended score [0.0, 1.0]
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_section_boosts")]
    pub section_boosts: BTreeMap<String, f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k_default: DEFAULT_TOP_K,
            recall_k: DEFAULT_RECALL_K,
            alpha_sem: DEFAULT_ALPHA_SEM,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            section_boosts: default_section_boosts(),
        }
    }
}

impl SearchConfig {
    pub fn scoring(&self) -> ScoringParams {
        ScoringParams {
            alpha_sem: self.alpha_sem,
            min_confidence: self.min_confidence,
            section_boosts: self.section_boosts.clone(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_recall_k() -> usize {
    DEFAULT_RECALL_K
}

fn default_alpha_sem() -> f64 {
    DEFAULT_ALPHA_SEM
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Defaults to `<base>/cache`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

/// `$INGREDIENT_SEARCH_BASE_PATH`, else `~/.local/share/ingredient-search`.
pub fn base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(BASE_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .map_err(|e| ConfigError::HomeDir(e.to_string()))?
        .ok_or_else(|| ConfigError::HomeDir("no home directory".to_string()))?;

    Ok(home.join(".local/share/ingredient-search"))
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if !(0.0..=1.0).contains(&search.alpha_sem) {
            return Err(ConfigError::Invalid(format!(
                "search.alpha_sem must be between 0.0 and 1.0, got {}",
                search.alpha_sem
            )));
        }

        if !(0.0..=1.0).contains(&search.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "search.min_confidence must be between 0.0 and 1.0, got {}",
                search.min_confidence
            )));
        }

        if search.recall_k == 0 {
            return Err(ConfigError::Invalid(
                "search.recall_k must be greater than 0".to_string(),
            ));
        }

        if search.top_k_default == 0 {
            return Err(ConfigError::Invalid(
                "search.top_k_default must be greater than 0".to_string(),
            ));
        }

        if let Some((section, boost)) = search
            .section_boosts
            .iter()
            .find(|(_, boost)| !boost.is_finite() || **boost < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "search.section_boosts.{section} must be a non-negative number, got {boost}"
            )));
        }

        let sem = &self.semantic_search;
        if sem.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "semantic_search.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if sem.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "semantic_search.batch_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&base_path()?)
    }

    /// Read `config.yaml` under `base_path`, creating it with defaults first
    /// if missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path).map_err(|source| ConfigError::Io {
            path: base_path.to_path_buf(),
            source,
        })?;

        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            let mut config = Self::default();
            config.base_path = base_path.to_path_buf();
            config.save()?;
        }

        let config_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.base_path.join(CONFIG_FILE);
        let temp_path = path.with_extension("yaml.tmp");

        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&temp_path, config_str.as_bytes())
            .and_then(|_| std::fs::rename(&temp_path, &path))
            .map_err(|source| ConfigError::Io { path, source })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Relative paths are taken from the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn multivector_path(&self) -> PathBuf {
        self.resolve(&self.data.multivector_path)
    }

    pub fn cards_path(&self) -> Option<PathBuf> {
        self.data.cards_path.as_deref().map(|p| self.resolve(p))
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => self.resolve(dir),
            None => self.base_path.join("cache"),
        }
    }
}
