use crate::adapters::{AsuraAdapter, ErosAdapter, MadaraAdapter};
use crate::error::{GrabError, Result};
use crate::models::SiteId;
use crate::traits::SiteAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Registry for site adapters. Built once at startup and shared read-only.
pub struct AdapterRegistry {
    adapters: HashMap<SiteId, Arc<dyn SiteAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Register built-in adapters
        registry.register(Arc::new(ErosAdapter::new()));
        registry.register(Arc::new(AsuraAdapter::new()));
        registry.register(Arc::new(MadaraAdapter::new()));

        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        self.adapters.insert(adapter.site(), adapter);
    }

    /// Resolves a site identifier; unknown identifiers and sites without an adapter fail closed.
    pub fn lookup(&self, site: &str) -> Result<Arc<dyn SiteAdapter>> {
        let id: SiteId = site.parse()?;
        self.get(id)
            .ok_or_else(|| GrabError::site_not_supported(site.trim()))
    }

    pub fn get(&self, id: SiteId) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.get(&id).cloned()
    }

    /// Picks the adapter claiming the URL's host (exact or subdomain match).
    pub fn detect(&self, url: &Url) -> Option<Arc<dyn SiteAdapter>> {
        let host = url.host_str()?.to_lowercase();
        SiteId::ALL
            .iter()
            .filter_map(|id| self.adapters.get(id))
            .find(|adapter| {
                adapter
                    .hosts()
                    .iter()
                    .any(|claimed| host == *claimed || host.ends_with(&format!(".{}", claimed)))
            })
            .cloned()
    }

    /// Every accepted identifier of every registered site, sorted.
    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self
            .adapters
            .keys()
            .flat_map(|id| id.identifiers().iter().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn SiteAdapter>> {
        SiteId::ALL.iter().filter_map(|id| self.adapters.get(id))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_identifier_and_alias() {
        let registry = AdapterRegistry::new();
        assert_eq!(registry.lookup("ErosScans").unwrap().site(), SiteId::Eros);
        assert_eq!(registry.lookup("asura").unwrap().site(), SiteId::Asura);
        assert_eq!(registry.lookup("THUNDER").unwrap().site(), SiteId::Madara);
    }

    #[test]
    fn test_lookup_fails_closed() {
        let registry = AdapterRegistry::new();
        for site in ["colamanga", "nhentai", "hitomi", ""] {
            assert!(matches!(
                registry.lookup(site),
                Err(GrabError::SiteNotSupported(_))
            ));
        }

        let empty = AdapterRegistry::empty();
        assert!(matches!(
            empty.lookup("erosscans"),
            Err(GrabError::SiteNotSupported(_))
        ));
    }

    #[test]
    fn test_detect_by_host() {
        let registry = AdapterRegistry::new();
        let detect = |raw: &str| {
            registry
                .detect(&Url::parse(raw).unwrap())
                .map(|adapter| adapter.site())
        };

        assert_eq!(detect("https://erosscans.com/x-chapter-1/"), Some(SiteId::Eros));
        assert_eq!(detect("https://www.asuracomic.net/series/x"), Some(SiteId::Asura));
        assert_eq!(detect("https://notasuracomic.net/"), None);
        assert_eq!(detect("https://www.colamanga.com/manga-1/"), None);
    }

    #[test]
    fn test_identifiers_list_registered_sites_only() {
        let mut registry = AdapterRegistry::empty();
        registry.register(Arc::new(AsuraAdapter::new()));
        assert_eq!(registry.identifiers(), vec!["asura", "asurascans"]);

        let full = AdapterRegistry::new();
        assert_eq!(full.identifiers().len(), 6);
        assert!(full.identifiers().contains(&"erosscans"));
    }
}
