//! Operator rule files.
//!
//! A rule file is a JSON object mapping field kinds to CSS selectors, named
//! after the publisher domain it applies to:
//!
//! ```json
//! { "title": "h1.headline", "author": "span.byline a" }
//! ```
//!
//! Rules are read from a custom directory (default `~/.config/gleaner/rules`)
//! and a standard directory. A file for the exact domain beats a parent-domain
//! file from either directory; for the same file name the custom directory wins. Loaded sets are installed into a [`SelectorCache`] as
//! taught selectors.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{SelectorCache, SelectorSet, normalize_domain};
use crate::{GleanerError, Result};

const RULE_EXTENSION: &str = "json";

/// Loads per-domain selector sets from rule directories.
#[derive(Debug, Clone)]
pub struct RuleLoader {
    /// Custom rules directory path
    custom_dir: Option<PathBuf>,
    /// Standard rules directory path
    standard_dir: Option<PathBuf>,
    /// Memoized lookups, including misses
    loaded: HashMap<String, Option<SelectorSet>>,
}

impl RuleLoader {
    pub fn new() -> Self {
        Self { custom_dir: None, standard_dir: None, loaded: HashMap::new() }
    }

    /// Rules for the domain of `url`.
    pub fn load_for_url(&mut self, url: &str) -> Result<Option<SelectorSet>> {
        let domain = crate::cache::domain_of(url)?;
        self.load_for_domain(&domain)
    }

    /// Rules for a domain, merged from the domain's file and its parent domains' files.
    ///
    /// More specific files win over parent-domain files regardless of directory;
    /// for the same file name the custom directory wins over the standard one.
    /// Returns `None` when no file exists.
    pub fn load_for_domain(&mut self, domain: &str) -> Result<Option<SelectorSet>> {
        let domain = normalize_domain(domain)
            .ok_or_else(|| GleanerError::RulesError(format!("Not a domain: {}", domain)))?;

        if let Some(rules) = self.loaded.get(&domain) {
            return Ok(rules.clone());
        }

        let mut merged = SelectorSet::new();
        let mut found = false;

        for file_path in self.find_rule_files(&domain).iter().rev() {
            match Self::parse_file(file_path) {
                Ok(set) => {
                    merged.merge(&set);
                    found = true;
                }
                Err(e) => tracing::warn!(path = %file_path.display(), error = %e, "Skipping unreadable rule file"),
            }
        }

        let rules = if found { Some(merged) } else { None };
        self.loaded.insert(domain, rules.clone());
        Ok(rules)
    }

    /// Parses one rule file.
    pub fn parse_file(path: &Path) -> Result<SelectorSet> {
        if !path.exists() {
            return Err(GleanerError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| GleanerError::RulesError(format!("{}: {}", path.display(), e)))
    }

    /// Teaches every rule file found in both directories to `cache`.
    ///
    /// Returns the number of domains taught.
    pub fn teach_all(&mut self, cache: &SelectorCache) -> Result<usize> {
        let mut domains: Vec<String> = Vec::new();
        for dir in [&self.standard_dir, &self.custom_dir].into_iter().flatten() {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RULE_EXTENSION) {
                    continue;
                }
                if let Some(domain) = path.file_stem().and_then(|s| s.to_str()).and_then(normalize_domain)
                    && !domains.contains(&domain)
                {
                    domains.push(domain);
                }
            }
        }

        let mut taught = 0;
        for domain in domains {
            if let Some(set) = self.load_for_domain(&domain)?
                && !set.is_empty()
            {
                cache.teach(&domain, &set);
                taught += 1;
            }
        }
        tracing::info!(domains = taught, "Loaded operator rules");
        Ok(taught)
    }

    /// Writes every cache entry to `dir` as `<domain>.json`, returning the paths written.
    pub fn save_snapshot(cache: &SelectorCache, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (domain, set) in cache.snapshot() {
            let path = dir.join(format!("{}.{}", domain, RULE_EXTENSION));
            fs::write(&path, serde_json::to_string_pretty(&set)?)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Clear the memoized lookups
    pub fn clear_cache(&mut self) {
        self.loaded.clear();
    }

    /// All rule files for a domain, most specific first, custom before standard per name.
    fn find_rule_files(&self, domain: &str) -> Vec<PathBuf> {
        let mut rule_files = Vec::new();

        for name in Self::rule_names(domain) {
            for dir in [&self.custom_dir, &self.standard_dir].into_iter().flatten() {
                let file_path = dir.join(&name);
                if file_path.exists() && !rule_files.contains(&file_path) {
                    rule_files.push(file_path);
                }
            }
        }

        rule_files
    }

    /// Candidate file names: the domain itself, then parent domains above the registrable level.
    fn rule_names(domain: &str) -> Vec<String> {
        let mut names = vec![format!("{}.{}", domain, RULE_EXTENSION)];

        let parts: Vec<&str> = domain.split('.').collect();
        for i in 1..parts.len().saturating_sub(1) {
            let parent = parts[i..].join(".");
            if parent.contains('.') {
                names.push(format!("{}.{}", parent, RULE_EXTENSION));
            }
        }

        names
    }

    /// Default custom rules directory (~/.config/gleaner/rules)
    pub fn default_custom_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("gleaner").join("rules"))
    }
}

impl Default for RuleLoader {
    fn default() -> Self {
        let mut builder = RuleLoaderBuilder::new();

        if let Some(custom_dir) = Self::default_custom_dir() {
            builder = builder.custom_dir(custom_dir);
        }

        let standard_dir = PathBuf::from("rules");
        if standard_dir.is_dir() {
            builder = builder.standard_dir(standard_dir);
        }

        builder.build()
    }
}

/// Builder for RuleLoader
#[derive(Debug, Default)]
pub struct RuleLoaderBuilder {
    custom_dir: Option<PathBuf>,
    standard_dir: Option<PathBuf>,
}

impl RuleLoaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom rules directory
    pub fn custom_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.custom_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set standard rules directory
    pub fn standard_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.standard_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> RuleLoader {
        RuleLoader { custom_dir: self.custom_dir, standard_dir: self.standard_dir, loaded: HashMap::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SelectorOrigin;
    use crate::field::FieldKind;
    use tempfile::TempDir;

    fn dirs_with(custom: &[(&str, &str)], standard: &[(&str, &str)]) -> (TempDir, RuleLoader) {
        let temp_dir = TempDir::new().unwrap();
        let custom_path = temp_dir.path().join("custom");
        let standard_path = temp_dir.path().join("standard");
        fs::create_dir_all(&custom_path).unwrap();
        fs::create_dir_all(&standard_path).unwrap();

        for (name, body) in custom {
            fs::write(custom_path.join(name), body).unwrap();
        }
        for (name, body) in standard {
            fs::write(standard_path.join(name), body).unwrap();
        }

        let loader = RuleLoaderBuilder::new().custom_dir(&custom_path).standard_dir(&standard_path).build();
        (temp_dir, loader)
    }

    #[test]
    fn test_rule_names_parent_domains() {
        let names = RuleLoader::rule_names("news.bbc.co.uk");
        assert!(names.contains(&"news.bbc.co.uk.json".to_string()));
        assert!(names.contains(&"bbc.co.uk.json".to_string()));
        assert!(!names.iter().any(|n| n == "uk.json"));
    }

    #[test]
    fn test_load_for_domain() {
        let (_tmp, mut loader) = dirs_with(&[("example.com.json", r#"{"title": "h1.headline"}"#)], &[]);
        let set = loader.load_for_domain("www.example.com").unwrap().unwrap();
        assert_eq!(set.get(FieldKind::Title), Some("h1.headline"));
        assert_eq!(loader.load_for_domain("other.org").unwrap(), None);
    }

    #[test]
    fn test_custom_overrides_standard() {
        let (_tmp, mut loader) = dirs_with(
            &[("example.com.json", r#"{"title": "h1.custom"}"#)],
            &[("example.com.json", r#"{"title": "h1.standard", "author": ".byline"}"#)],
        );
        let set = loader.load_for_domain("example.com").unwrap().unwrap();
        assert_eq!(set.get(FieldKind::Title), Some("h1.custom"));
        assert_eq!(set.get(FieldKind::Author), Some(".byline"));
    }

    #[test]
    fn test_subdomain_inherits_parent_rules() {
        let (_tmp, mut loader) = dirs_with(
            &[
                ("example.com.json", r#"{"title": "h1", "category": ".section"}"#),
                ("sport.example.com.json", r#"{"title": "h1.sport"}"#),
            ],
            &[],
        );
        let set = loader.load_for_url("https://sport.example.com/match").unwrap().unwrap();
        assert_eq!(set.get(FieldKind::Title), Some("h1.sport"));
        assert_eq!(set.get(FieldKind::Category), Some(".section"));
    }

    #[test]
    fn test_standard_exact_domain_beats_custom_parent() {
        let (_tmp, mut loader) = dirs_with(
            &[("example.com.json", r#"{"title": "h1.parent", "category": ".section"}"#)],
            &[("sport.example.com.json", r#"{"title": "h1.sport"}"#)],
        );
        let set = loader.load_for_domain("sport.example.com").unwrap().unwrap();
        assert_eq!(set.get(FieldKind::Title), Some("h1.sport"));
        assert_eq!(set.get(FieldKind::Category), Some(".section"));
    }

    #[test]
    fn test_invalid_file_is_skipped() {
        let (_tmp, mut loader) = dirs_with(&[("example.com.json", "{ not json")], &[]);
        assert_eq!(loader.load_for_domain("example.com").unwrap(), None);
        assert!(matches!(
            RuleLoader::parse_file(Path::new("/nonexistent/example.com.json")),
            Err(GleanerError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_teach_all_installs_taught_sets() {
        let (_tmp, mut loader) = dirs_with(
            &[("example.com.json", r#"{"title": "h1.headline"}"#), ("notes.txt", "ignored")],
            &[("news.example.org.json", r#"{"author": ".byline"}"#)],
        );
        let cache = SelectorCache::new();
        assert_eq!(loader.teach_all(&cache).unwrap(), 2);

        let entry = cache.entry("example.com").unwrap();
        assert_eq!(entry.origin(FieldKind::Title), Some(SelectorOrigin::Taught));
        assert!(cache.get("news.example.org").unwrap().contains(FieldKind::Author));
    }

    #[test]
    fn test_save_snapshot_round_trips_through_loader() {
        let cache = SelectorCache::new();
        cache.merge(
            "example.com",
            &SelectorSet::new().with(FieldKind::MainContent, "div.story-body"),
            SelectorOrigin::Learned,
        );

        let out = TempDir::new().unwrap();
        let written = RuleLoader::save_snapshot(&cache, out.path()).unwrap();
        assert_eq!(written, vec![out.path().join("example.com.json")]);

        let mut loader = RuleLoaderBuilder::new().custom_dir(out.path()).build();
        let set = loader.load_for_domain("example.com").unwrap().unwrap();
        assert_eq!(set.get(FieldKind::MainContent), Some("div.story-body"));
    }
}
