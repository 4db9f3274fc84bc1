//! Smart-link resolution.
//!
//! A card link of type `smart` asks the EMR to launch a registered application. The resolver
//! looks the link's `url` up in an [`AppRegistry`] by exact launch-URI match:
//! - no match: the link is shown without an action (a quiet miss, not an error)
//! - one match: that app
//! - several matches: the app with the lexicographically smallest registry id, with a warning
//!
//! Links on one card resolve concurrently; the resolved actions keep the card's link order.

use crate::cards::{CardLink, DecisionCard};
use crate::{CdsError, CdsResult};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A registered application that can be launched from a card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LaunchableApp {
    pub id: String,
    pub name: String,
    pub launch_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// Lookup of registered applications.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    /// All apps whose launch URI equals `launch_uri` exactly.
    async fn find_by_launch_uri(&self, launch_uri: &str) -> CdsResult<Vec<LaunchableApp>>;
}

/// In-memory registry, optionally loaded from YAML.
///
/// ```yaml
/// apps:
///   - id: growth-chart
///     name: Growth Chart
///     launchUri: https://apps.example.org/growth/launch
///     redirectUri: https://apps.example.org/growth/
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticAppRegistry {
    apps: Vec<LaunchableApp>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    apps: Vec<LaunchableApp>,
}

impl StaticAppRegistry {
    pub fn new(apps: Vec<LaunchableApp>) -> Self {
        Self { apps }
    }

    pub fn apps(&self) -> &[LaunchableApp] {
        &self.apps
    }

    /// Parse a registry document.
    ///
    /// Schema mismatches report the failing path (for example `apps[0].launchUri`).
    pub fn from_yaml(yaml_text: &str) -> CdsResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let file = serde_path_to_error::deserialize::<_, RegistryFile>(deserializer).map_err(|err| {
            let path = err.path().to_string();
            let source = err.into_inner();
            CdsError::Registry(format!("app registry schema mismatch at {path}: {source}"))
        })?;
        Ok(Self::new(file.apps))
    }

    /// Read and parse a registry file.
    pub fn load(path: &Path) -> CdsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CdsError::Registry(format!("failed to read {}: {e}", path.display()))
        })?;
        let registry = Self::from_yaml(&text)?;
        tracing::info!(
            count = registry.apps.len(),
            path = %path.display(),
            "loaded app registry"
        );
        Ok(registry)
    }
}

#[async_trait]
impl AppRegistry for StaticAppRegistry {
    async fn find_by_launch_uri(&self, launch_uri: &str) -> CdsResult<Vec<LaunchableApp>> {
        Ok(self
            .apps
            .iter()
            .filter(|app| app.launch_uri == launch_uri)
            .cloned()
            .collect())
    }
}

/// A card link together with what the presentation layer can do with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAction {
    pub link: CardLink,
    /// The app to launch, when the link is a resolved smart link.
    pub app: Option<LaunchableApp>,
    /// Why resolution failed, if it did. The link is then inert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkAction {
    fn inert(link: CardLink) -> Self {
        Self {
            link,
            app: None,
            error: None,
        }
    }

    /// True when this link renders as a launch button.
    pub fn is_launchable(&self) -> bool {
        self.app.is_some()
    }
}

#[derive(Clone)]
pub struct SmartLinkResolver {
    registry: Arc<dyn AppRegistry>,
}

impl SmartLinkResolver {
    pub fn new(registry: Arc<dyn AppRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve one smart link to its registered app.
    ///
    /// Non-smart links are never looked up and resolve to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::LinkResolution`] if the registry lookup fails.
    pub async fn resolve_launch_app(&self, link: &CardLink) -> CdsResult<Option<LaunchableApp>> {
        if !link.is_smart() {
            return Ok(None);
        }

        let mut matches = self
            .registry
            .find_by_launch_uri(&link.url)
            .await
            .map_err(|e| CdsError::LinkResolution {
                url: link.url.clone(),
                message: e.to_string(),
            })?;

        if matches.len() > 1 {
            matches.sort_by(|a, b| a.id.cmp(&b.id));
            let candidates: Vec<&str> = matches.iter().map(|app| app.id.as_str()).collect();
            tracing::warn!(
                launch_uri = %link.url,
                ?candidates,
                "several registered apps share a launch URI; using '{}'",
                candidates[0]
            );
        }

        Ok(matches.into_iter().next())
    }

    /// Resolve every link on `card`, concurrently, preserving link order.
    ///
    /// Lookup failures degrade to inert links carrying the error message.
    pub async fn resolve_card(&self, card: &DecisionCard) -> Vec<LinkAction> {
        join_all(card.links.iter().cloned().map(|link| async move {
            if !link.is_smart() {
                return LinkAction::inert(link);
            }
            match self.resolve_launch_app(&link).await {
                Ok(app) => LinkAction {
                    link,
                    app,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(card = %card.id, "link resolution failed: {e}");
                    LinkAction {
                        link,
                        app: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Indicator;
    use std::sync::Mutex;
    use std::time::Duration;

    const GROWTH_URI: &str = "https://apps.example.org/growth/launch";

    fn app(id: &str, launch_uri: &str) -> LaunchableApp {
        LaunchableApp {
            id: id.into(),
            name: format!("{id} app"),
            launch_uri: launch_uri.into(),
            redirect_uri: None,
        }
    }

    fn link(url: &str, link_type: &str) -> CardLink {
        CardLink {
            label: format!("{link_type} link"),
            url: url.into(),
            link_type: link_type.into(),
        }
    }

    fn card(links: Vec<CardLink>) -> DecisionCard {
        DecisionCard {
            id: "card-1".into(),
            summary: "s".into(),
            detail: String::new(),
            indicator: Indicator::Info,
            links,
            encounter_context: None,
        }
    }

    /// Records every lookup and optionally delays answers in reverse order.
    struct RecordingRegistry {
        inner: StaticAppRegistry,
        lookups: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingRegistry {
        fn new(apps: Vec<LaunchableApp>) -> Self {
            Self {
                inner: StaticAppRegistry::new(apps),
                lookups: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl AppRegistry for RecordingRegistry {
        async fn find_by_launch_uri(&self, launch_uri: &str) -> CdsResult<Vec<LaunchableApp>> {
            self.lookups.lock().unwrap().push(launch_uri.to_string());
            if self.fail {
                return Err(CdsError::Registry("registry offline".into()));
            }
            // Earlier links answer later.
            let delay = if launch_uri.ends_with("/a") { 30 } else { 1 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.inner.find_by_launch_uri(launch_uri).await
        }
    }

    #[tokio::test]
    async fn test_resolves_exact_match() {
        let resolver = SmartLinkResolver::new(Arc::new(StaticAppRegistry::new(vec![
            app("growth", GROWTH_URI),
            app("other", "https://apps.example.org/other"),
        ])));

        let found = resolver
            .resolve_launch_app(&link(GROWTH_URI, "smart"))
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some("growth".to_string()));
    }

    #[tokio::test]
    async fn test_zero_matches_is_quiet_none() {
        let resolver = SmartLinkResolver::new(Arc::new(StaticAppRegistry::default()));
        let found = resolver
            .resolve_launch_app(&link(GROWTH_URI, "smart"))
            .await
            .expect("a miss is not an error");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_launch_uri_match_is_exact() {
        let resolver =
            SmartLinkResolver::new(Arc::new(StaticAppRegistry::new(vec![app("growth", GROWTH_URI)])));
        let found = resolver
            .resolve_launch_app(&link(&format!("{GROWTH_URI}/"), "smart"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_matches_pick_smallest_id() {
        let resolver = SmartLinkResolver::new(Arc::new(StaticAppRegistry::new(vec![
            app("zeta", GROWTH_URI),
            app("alpha", GROWTH_URI),
            app("mid", GROWTH_URI),
        ])));

        let found = resolver
            .resolve_launch_app(&link(GROWTH_URI, "smart"))
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some("alpha".to_string()));
    }

    #[tokio::test]
    async fn test_non_smart_links_never_reach_registry() {
        let registry = Arc::new(RecordingRegistry::new(vec![app("growth", GROWTH_URI)]));
        let resolver = SmartLinkResolver::new(registry.clone());

        let actions = resolver
            .resolve_card(&card(vec![
                link(GROWTH_URI, "absolute"),
                link(GROWTH_URI, "SMART"),
                link(GROWTH_URI, ""),
            ]))
            .await;

        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| !a.is_launchable()));
        assert!(registry.lookups.lock().unwrap().is_empty());

        assert!(resolver
            .resolve_launch_app(&link(GROWTH_URI, "absolute"))
            .await
            .unwrap()
            .is_none());
        assert!(registry.lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolved_actions_keep_link_order() {
        let registry = Arc::new(RecordingRegistry::new(vec![
            app("app-a", "https://apps.test/a"),
            app("app-b", "https://apps.test/b"),
        ]));
        let resolver = SmartLinkResolver::new(registry);

        let actions = resolver
            .resolve_card(&card(vec![
                link("https://apps.test/a", "smart"),
                link("https://example.org/info", "absolute"),
                link("https://apps.test/b", "smart"),
            ]))
            .await;

        let ids: Vec<Option<&str>> = actions
            .iter()
            .map(|a| a.app.as_ref().map(|app| app.id.as_str()))
            .collect();
        assert_eq!(ids, vec![Some("app-a"), None, Some("app-b")]);
    }

    #[tokio::test]
    async fn test_registry_failure_degrades_to_inert_link() {
        let mut registry = RecordingRegistry::new(vec![]);
        registry.fail = true;
        let resolver = SmartLinkResolver::new(Arc::new(registry));

        let actions = resolver
            .resolve_card(&card(vec![link(GROWTH_URI, "smart")]))
            .await;

        assert_eq!(actions.len(), 1);
        assert!(!actions[0].is_launchable());
        assert!(actions[0]
            .error
            .as_deref()
            .unwrap()
            .contains("registry offline"));
    }

    #[test]
    fn test_parses_registry_yaml() {
        let registry = StaticAppRegistry::from_yaml(
            r#"apps:
  - id: growth
    name: Growth Chart
    launchUri: https://apps.example.org/growth/launch
    redirectUri: https://apps.example.org/growth/
  - id: meds
    name: Medication Review
    launchUri: https://apps.example.org/meds/launch
"#,
        )
        .expect("valid registry");

        assert_eq!(registry.apps().len(), 2);
        assert_eq!(
            registry.apps()[0].redirect_uri.as_deref(),
            Some("https://apps.example.org/growth/")
        );
        assert!(registry.apps()[1].redirect_uri.is_none());
    }

    #[test]
    fn test_registry_yaml_reports_failing_path() {
        let err = StaticAppRegistry::from_yaml(
            r#"apps:
  - id: growth
    name: Growth Chart
"#,
        )
        .expect_err("launchUri is required");
        match err {
            CdsError::Registry(msg) => assert!(msg.contains("apps[0]"), "{msg}"),
            other => panic!("expected Registry error, got {other:?}"),
        }
    }

    #[test]
    fn test_registry_yaml_rejects_unknown_keys() {
        let err = StaticAppRegistry::from_yaml("apps: []\nclients: []\n").expect_err("unknown key");
        assert!(matches!(err, CdsError::Registry(_)));
    }

    #[test]
    fn test_loads_registry_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("apps.yaml");
        std::fs::write(
            &path,
            "apps:\n  - id: growth\n    name: Growth\n    launchUri: https://apps.test/g\n",
        )
        .unwrap();

        let registry = StaticAppRegistry::load(&path).expect("load");
        assert_eq!(registry.apps()[0].id, "growth");

        assert!(StaticAppRegistry::load(&dir.path().join("missing.yaml")).is_err());
    }
}
