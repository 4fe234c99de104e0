//! Binder configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::decoder::{BodyDecoder, JsonDecoder};
use crate::handler::{Handler, HandlerId};
use crate::upload::UploadConfig;

// ============================================================================
// Dependency overrides
// ============================================================================

/// Replacement callables applied when dependencies are compiled
#[derive(Clone, Default)]
pub struct DependencyOverrides {
    replacements: HashMap<HandlerId, Arc<Handler>>,
}

impl DependencyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `replacement` wherever `original` is declared as a dependency
    pub fn insert(&mut self, original: &Arc<Handler>, replacement: &Arc<Handler>) {
        self.replacements.insert(original.id(), Arc::clone(replacement));
    }

    /// The callable that will actually run for `handler`
    pub fn resolve(&self, handler: &Arc<Handler>) -> Arc<Handler> {
        self.replacements
            .get(&handler.id())
            .cloned()
            .unwrap_or_else(|| Arc::clone(handler))
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

impl fmt::Debug for DependencyOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.replacements.iter().map(|(id, handler)| (id, handler.name())))
            .finish()
    }
}

// ============================================================================
// BinderConfig
// ============================================================================

/// Configuration shared by every binder compiled from it
#[derive(Clone)]
pub struct BinderConfig {
    /// Decoder for body payloads
    pub decoder: Arc<dyn BodyDecoder>,
    /// Parameter names bound to the request itself
    pub request_aliases: Vec<String>,
    /// Limits applied to file parameters
    pub upload: UploadConfig,
    /// Resolve independent async dependencies concurrently
    pub concurrent_dependencies: bool,
    pub overrides: DependencyOverrides,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            decoder: Arc::new(JsonDecoder),
            request_aliases: vec!["request".to_string(), "req".to_string()],
            upload: UploadConfig::default(),
            concurrent_dependencies: true,
            overrides: DependencyOverrides::default(),
        }
    }
}

impl BinderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the body decoder
    pub fn decoder(mut self, decoder: Arc<dyn BodyDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replace the reserved request parameter names
    pub fn request_aliases(mut self, aliases: Vec<String>) -> Self {
        self.request_aliases = aliases;
        self
    }

    /// Add a reserved request parameter name
    pub fn request_alias(mut self, alias: impl Into<String>) -> Self {
        self.request_aliases.push(alias.into());
        self
    }

    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    pub fn concurrent_dependencies(mut self, enabled: bool) -> Self {
        self.concurrent_dependencies = enabled;
        self
    }

    /// Override one dependency callable with another
    pub fn override_dependency(mut self, original: &Arc<Handler>, replacement: &Arc<Handler>) -> Self {
        self.overrides.insert(original, replacement);
        self
    }

    pub fn is_request_alias(&self, name: &str) -> bool {
        self.request_aliases.iter().any(|alias| alias == name)
    }
}

impl fmt::Debug for BinderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinderConfig")
            .field("decoder", &self.decoder.name())
            .field("request_aliases", &self.request_aliases)
            .field("upload", &self.upload)
            .field("concurrent_dependencies", &self.concurrent_dependencies)
            .field("overrides", &self.overrides)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Arg, Value};

    fn handler(name: &str) -> Arc<Handler> {
        Handler::builder(name).build_async(|_| async { Ok(Arg::Value(Value::Null)) })
    }

    #[test]
    fn test_default_config() {
        let config = BinderConfig::default();
        assert!(config.is_request_alias("request"));
        assert!(config.is_request_alias("req"));
        assert!(!config.is_request_alias("body"));
        assert!(config.concurrent_dependencies);
        assert_eq!(config.decoder.name(), "json");
    }

    #[test]
    fn test_builder_methods() {
        let config = BinderConfig::new()
            .request_alias("ctx")
            .concurrent_dependencies(false)
            .upload(UploadConfig::new().max_size(10));
        assert!(config.is_request_alias("ctx"));
        assert!(!config.concurrent_dependencies);
        assert_eq!(config.upload.max_size, Some(10));
    }

    #[test]
    fn test_overrides_resolve() {
        let real = handler("get_db");
        let fake = handler("fake_db");
        let config = BinderConfig::new().override_dependency(&real, &fake);

        assert_eq!(config.overrides.resolve(&real).id(), fake.id());
        assert_eq!(config.overrides.resolve(&fake).id(), fake.id());
        assert_eq!(config.overrides.len(), 1);
    }
}
