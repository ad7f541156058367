use std::path::{Path, PathBuf};

use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::queue_item::ProcessorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct WatchedDirectory {
    pub path: PathBuf,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_true")]
    pub auto_process: bool,
    #[serde(default)]
    pub processing_tasks: Vec<String>,
    #[serde(default)]
    pub store_in_vector_db: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_patterns() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

impl WatchedDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            patterns: default_patterns(),
            recursive: true,
            auto_process: true,
            processing_tasks: Vec::new(),
            store_in_vector_db: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Whether `candidate` matches one of this directory's glob patterns.
    pub fn matches(&self, candidate: &Path) -> bool {
        let file_name = match candidate.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        match builder.build() {
            Ok(set) => set.is_match(file_name),
            Err(_) => false,
        }
    }

    /// True when `candidate` lives under this directory's root (and, unless
    /// `recursive`, is a direct child of it).
    pub fn contains(&self, candidate: &Path) -> bool {
        let Ok(relative) = candidate.strip_prefix(&self.path) else {
            return false;
        };
        self.recursive || relative.components().count() <= 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct MonitorConfig {
    #[serde(default)]
    pub watched: Vec<WatchedDirectory>,
    #[serde(default = "default_true")]
    pub processing_enabled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: f64,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_extensions")]
    pub supported_extensions: Vec<String>,
    #[serde(default = "default_processor")]
    pub default_processor: ProcessorKind,
    #[serde(default = "default_queue_max_size")]
    pub queue_max_size: usize,
}

fn default_batch_size() -> usize {
    10
}
fn default_max_concurrent() -> usize {
    4
}
fn default_debounce_seconds() -> f64 {
    2.0
}
fn default_extensions() -> Vec<String> {
    vec![
        ".txt".into(),
        ".md".into(),
        ".markdown".into(),
        ".json".into(),
    ]
}
fn default_processor() -> ProcessorKind {
    ProcessorKind::LocalLlm
}
fn default_queue_max_size() -> usize {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watched: Vec::new(),
            processing_enabled: true,
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            debounce_seconds: default_debounce_seconds(),
            ignore_patterns: Vec::new(),
            supported_extensions: default_extensions(),
            default_processor: default_processor(),
            queue_max_size: default_queue_max_size(),
        }
    }
}

impl MonitorConfig {
    /// Add a watched directory, resolving to an absolute path and skipping
    /// duplicates of an already-watched path.
    pub fn add_watched_directory(&mut self, dir: WatchedDirectory) {
        let resolved = dir
            .path
            .canonicalize()
            .unwrap_or_else(|_| dir.path.clone());
        if self
            .watched
            .iter()
            .any(|w| w.path == resolved || w.path == dir.path)
        {
            return;
        }
        let mut dir = dir;
        dir.path = resolved;
        self.watched.push(dir);
    }

    pub fn remove_watched_directory(&mut self, path: &Path) -> bool {
        let before = self.watched.len();
        self.watched.retain(|w| w.path != path);
        self.watched.len() != before
    }

    pub fn is_file_supported(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .supported_extensions
                .iter()
                .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    pub fn should_ignore_file(&self, path: &Path) -> bool {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return true,
        };
        self.ignore_patterns.iter().any(|pattern| {
            Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(file_name))
                .unwrap_or(false)
        })
    }

    /// The `WatchedDirectory` that owns `path`, if any.
    pub fn directory_for(&self, path: &Path) -> Option<&WatchedDirectory> {
        self.watched.iter().find(|w| w.contains(path))
    }

    /// Human-readable list of configuration problems; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.watched.is_empty() {
            issues.push("no watched directories configured".to_string());
        }
        for dir in &self.watched {
            if !dir.path.exists() {
                issues.push(format!("watched path does not exist: {}", dir.path.display()));
            }
            if dir.patterns.is_empty() {
                issues.push(format!(
                    "watched directory {} has no patterns",
                    dir.path.display()
                ));
            }
        }
        if self.batch_size == 0 {
            issues.push("batch_size must be greater than zero".to_string());
        }
        if self.max_concurrent == 0 {
            issues.push("max_concurrent must be greater than zero".to_string());
        }
        if self.debounce_seconds < 0.0 {
            issues.push("debounce_seconds must not be negative".to_string());
        }
        if self.queue_max_size == 0 {
            issues.push("queue_max_size must be greater than zero".to_string());
        }
        issues
    }

    pub fn summary(&self) -> MonitorConfigSummary {
        MonitorConfigSummary {
            watched_directories: self.watched.len(),
            processing_enabled: self.processing_enabled,
            total_tasks: self
                .watched
                .iter()
                .map(|w| w.processing_tasks.len())
                .sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfigSummary {
    pub watched_directories: usize,
    pub processing_enabled: bool,
    pub total_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_flags_empty_watch_list() {
        let cfg = MonitorConfig::default();
        assert!(cfg.validate().iter().any(|i| i.contains("no watched")));
    }

    #[test]
    fn is_file_supported_matches_extension_case_insensitively() {
        let cfg = MonitorConfig::default();
        assert!(cfg.is_file_supported(Path::new("notes/a.MD")));
        assert!(!cfg.is_file_supported(Path::new("notes/a.png")));
    }

    #[test]
    fn watched_directory_matches_glob_pattern() {
        let dir = WatchedDirectory {
            patterns: vec!["*.txt".to_string()],
            ..WatchedDirectory::new("/tmp/notes")
        };
        assert!(dir.matches(Path::new("/tmp/notes/hello.txt")));
        assert!(!dir.matches(Path::new("/tmp/notes/hello.png")));
    }
}
