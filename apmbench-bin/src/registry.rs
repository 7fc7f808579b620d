use crate::config::{ConfigError, VariantConfig};
use http::Uri;
use std::collections::HashSet;

/// The closed set of benchmark variants for this run.
///
/// Every variant is known up front; only the enabled ones receive traffic.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Vec<VariantConfig>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<VariantConfig>) -> Result<TargetRegistry, ConfigError> {
        let mut seen = HashSet::new();
        for t in targets.iter() {
            if !seen.insert(t.name.as_str()) {
                return Err(ConfigError::DuplicateVariant(t.name.clone()));
            }
        }
        Ok(TargetRegistry { targets })
    }

    /// Enabled variants and their urls, in declaration order.
    pub fn enabled_variants(&self) -> Vec<(&str, &Uri)> {
        self.enabled().map(|t| (t.name.as_str(), &t.url)).collect()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &VariantConfig> {
        self.targets.iter().filter(|t| t.enabled)
    }

    /// Every declared variant, enabled or not.
    pub fn variant_ids(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name.as_str())
    }

    pub fn all(&self) -> &[VariantConfig] {
        &self.targets
    }

    pub fn get(&self, name: &str) -> Option<&VariantConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Enable exactly the named variants and disable the rest.
    ///
    /// Fails on the first name that is not declared, leaving the registry as it was.
    pub fn enable_only<I, S>(&mut self, names: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut wanted = HashSet::new();
        for n in names {
            let n = n.as_ref();
            if self.get(n).is_none() {
                return Err(ConfigError::UnknownVariant(n.to_string()));
            }
            wanted.insert(n.to_string());
        }
        for t in self.targets.iter_mut() {
            t.enabled = wanted.contains(&t.name);
        }
        Ok(())
    }
}
