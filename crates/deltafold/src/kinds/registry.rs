//! Kind tag -> plugin table.
//!
//! Built once at startup and read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::{KindPlugin, VisibilityPolicy, builtin_plugins};
use crate::error::RegistryError;

/// Reveal band for `text` artifacts.
pub const TEXT_BAND: VisibilityPolicy = VisibilityPolicy::Band {
    lower: 400,
    upper: 450,
};

/// Reveal band for `code` artifacts.
pub const CODE_BAND: VisibilityPolicy = VisibilityPolicy::Band {
    lower: 300,
    upper: 310,
};

static BUILTIN: Lazy<Arc<KindRegistry>> =
    Lazy::new(|| Arc::new(KindRegistry::standard(TEXT_BAND, CODE_BAND)));

/// Immutable mapping from kind tag to plugin.
#[derive(Clone, Default)]
pub struct KindRegistry {
    plugins: HashMap<String, Arc<dyn KindPlugin>>,
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.kinds().collect();
        kinds.sort_unstable();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

impl KindRegistry {
    pub fn builder() -> KindRegistryBuilder {
        KindRegistryBuilder::default()
    }

    /// The process-wide registry with the built-in kinds and default bands.
    pub fn builtin() -> Arc<KindRegistry> {
        Arc::clone(&BUILTIN)
    }

    /// The built-in kinds with custom reveal bands for text and code.
    pub fn standard(text_band: VisibilityPolicy, code_band: VisibilityPolicy) -> Self {
        let plugins = builtin_plugins(text_band, code_band)
            .into_iter()
            .map(|plugin| (plugin.kind().to_string(), plugin))
            .collect();
        Self { plugins }
    }

    pub fn get(&self, kind: &str) -> Option<&dyn KindPlugin> {
        self.plugins.get(kind).map(|p| p.as_ref())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Collects plugins, rejecting duplicate kind tags.
#[derive(Default)]
pub struct KindRegistryBuilder {
    plugins: HashMap<String, Arc<dyn KindPlugin>>,
}

impl KindRegistryBuilder {
    /// Start from the built-in kinds so callers only add their own.
    pub fn with_builtins(text_band: VisibilityPolicy, code_band: VisibilityPolicy) -> Self {
        Self {
            plugins: KindRegistry::standard(text_band, code_band).plugins,
        }
    }

    pub fn register(self, plugin: impl KindPlugin + 'static) -> Result<Self, RegistryError> {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(mut self, plugin: Arc<dyn KindPlugin>) -> Result<Self, RegistryError> {
        if let VisibilityPolicy::Band { lower, upper } = plugin.visibility()
            && lower >= upper
        {
            return Err(RegistryError::InvalidBand {
                kind: plugin.kind().to_string(),
                lower,
                upper,
            });
        }

        let kind = plugin.kind().to_string();
        if self.plugins.contains_key(&kind) {
            return Err(RegistryError::DuplicateKind(kind));
        }
        self.plugins.insert(kind, plugin);
        Ok(self)
    }

    pub fn build(self) -> KindRegistry {
        KindRegistry {
            plugins: self.plugins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{FoldMode, StreamingKind};

    fn markdown() -> StreamingKind {
        StreamingKind::new(
            "markdown",
            "markdown-delta",
            FoldMode::Append,
            VisibilityPolicy::Band {
                lower: 100,
                upper: 110,
            },
        )
    }

    #[test]
    fn test_builtin_registry() {
        let registry = KindRegistry::builtin();
        assert_eq!(registry.len(), 5);
        for kind in ["text", "code", "sheet", "image", "html"] {
            assert!(registry.contains(kind), "missing {kind}");
        }
        assert_eq!(registry.get("text").unwrap().visibility(), TEXT_BAND);
        assert_eq!(registry.get("code").unwrap().visibility(), CODE_BAND);
        assert!(registry.get("html").unwrap().claims("html"));

        // Same table every time.
        assert!(Arc::ptr_eq(&registry, &KindRegistry::builtin()));
    }

    #[test]
    fn test_register_custom_kind() {
        let registry = KindRegistryBuilder::with_builtins(TEXT_BAND, CODE_BAND)
            .register(markdown())
            .unwrap()
            .build();
        assert_eq!(registry.len(), 6);
        assert!(registry.get("markdown").unwrap().claims("markdown-delta"));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let result = KindRegistry::builder()
            .register(markdown())
            .and_then(|b| b.register(markdown()));
        assert!(matches!(result, Err(RegistryError::DuplicateKind(k)) if k == "markdown"));

        let shadow = StreamingKind::new(
            "text",
            "text-delta",
            FoldMode::Append,
            VisibilityPolicy::Never,
        );
        let result = KindRegistryBuilder::with_builtins(TEXT_BAND, CODE_BAND).register(shadow);
        assert!(matches!(result, Err(RegistryError::DuplicateKind(_))));
    }

    #[test]
    fn test_inverted_band_rejected() {
        let result = KindRegistry::builder().register(StreamingKind::new(
            "odd",
            "odd-delta",
            FoldMode::Append,
            VisibilityPolicy::Band {
                lower: 50,
                upper: 50,
            },
        ));
        assert!(matches!(result, Err(RegistryError::InvalidBand { .. })));
    }
}
