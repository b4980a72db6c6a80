//! Scenario Catalog
//!
//! Scenarios are loaded once at startup from a [`ScenarioSource`]. Whatever the source
//! does, the catalog always offers one extra synthetic option, "Custom", whose
//! scenario is built from the text the user typed into the custom field.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Key of the synthetic, user-authored scenario.
pub const CUSTOM_SCENARIO_KEY: &str = "Custom";

/// The premise of a simulated conversation.
///
/// Field names follow the scenario documents and the agent endpoint. Fields the
/// catalog doesn't know about are carried along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(rename = "Scenario")]
    pub description: String,
    #[serde(rename = "Persona", default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Scenario {
    /// Builds a user-authored scenario that only has a description.
    pub fn custom(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            persona: None,
            gender: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read scenarios from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to fetch scenarios: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed scenario document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown scenario: '{0}'")]
    UnknownScenario(String),
    #[error("The custom scenario text is empty")]
    EmptyCustomScenario,
}

/// Where scenarios come from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScenarioSource: Send + Sync {
    /// Returns `(name, scenario)` pairs in document order.
    async fn fetch(&self) -> Result<Vec<(String, Scenario)>, CatalogError>;
}

/// Parses a scenario document: a JSON object mapping names to scenarios.
pub fn parse_scenarios(document: &str) -> Result<Vec<(String, Scenario)>, CatalogError> {
    let entries: Map<String, Value> = serde_json::from_str(document)?;
    entries
        .into_iter()
        .map(|(name, value)| -> Result<(String, Scenario), CatalogError> {
            Ok((name, serde_json::from_value(value)?))
        })
        .collect()
}

/// Reads scenarios from a JSON file on disk.
pub struct JsonFileScenarioSource {
    path: PathBuf,
}

impl JsonFileScenarioSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScenarioSource for JsonFileScenarioSource {
    async fn fetch(&self) -> Result<Vec<(String, Scenario)>, CatalogError> {
        let document =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| CatalogError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        parse_scenarios(&document)
    }
}

/// Fetches scenarios from an HTTP endpoint serving the same JSON document.
pub struct HttpScenarioSource {
    client: reqwest::Client,
    url: String,
}

impl HttpScenarioSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ScenarioSource for HttpScenarioSource {
    async fn fetch(&self) -> Result<Vec<(String, Scenario)>, CatalogError> {
        let document = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_scenarios(&document)
    }
}

/// One selectable entry of the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScenarioOption<'a> {
    Named { key: &'a str, scenario: &'a Scenario },
    Custom,
}

impl ScenarioOption<'_> {
    pub fn key(&self) -> &str {
        match self {
            ScenarioOption::Named { key, .. } => key,
            ScenarioOption::Custom => CUSTOM_SCENARIO_KEY,
        }
    }
}

/// The scenarios the user can pick from.
#[derive(Debug, Default)]
pub struct ScenarioCatalog {
    entries: Vec<(String, Scenario)>,
    custom_draft: String,
    load_error: Option<String>,
}

impl ScenarioCatalog {
    /// Loads the catalog once. A failing source leaves only the "Custom" option.
    pub async fn load(source: &dyn ScenarioSource) -> Self {
        match source.fetch().await {
            Ok(entries) => {
                let catalog = Self::from_entries(entries);
                info!(scenarios = catalog.entries.len(), "Scenario catalog loaded");
                catalog
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Error loading scenarios; only the custom scenario is available"
                );
                Self {
                    load_error: Some(e.to_string()),
                    ..Self::default()
                }
            }
        }
    }

    pub fn from_entries(entries: Vec<(String, Scenario)>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|(key, _)| {
                if key == CUSTOM_SCENARIO_KEY {
                    warn!(
                        "Ignoring source scenario named '{CUSTOM_SCENARIO_KEY}'; the name is reserved"
                    );
                    return false;
                }
                true
            })
            .collect();
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Loaded scenarios in source order, followed by the custom option.
    pub fn options(&self) -> impl Iterator<Item = ScenarioOption<'_>> {
        self.entries
            .iter()
            .map(|(key, scenario)| ScenarioOption::Named { key, scenario })
            .chain(std::iter::once(ScenarioOption::Custom))
    }

    /// Number of selectable options, the custom one included.
    pub fn len(&self) -> usize {
        self.entries.len() + 1
    }

    /// The catalog always has at least the custom option.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn set_custom_draft(&mut self, text: impl Into<String>) {
        self.custom_draft = text.into();
    }

    pub fn custom_draft(&self) -> &str {
        &self.custom_draft
    }

    pub fn resolve(&self, key: &str) -> Result<Scenario, CatalogError> {
        if key == CUSTOM_SCENARIO_KEY {
            let draft = self.custom_draft.trim();
            if draft.is_empty() {
                return Err(CatalogError::EmptyCustomScenario);
            }
            return Ok(Scenario::custom(draft));
        }
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, scenario)| scenario.clone())
            .ok_or_else(|| CatalogError::UnknownScenario(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT: &str = r#"{
        "Pancreatic cancer": {
            "Scenario": "Tell Mr Jones his scan shows a pancreatic mass.",
            "Persona": "A 64 year old retired teacher.",
            "Gender": "Male"
        },
        "Miscarriage": {
            "Scenario": "Tell Ms Ahmed the pregnancy is not viable.",
            "Persona": "A 31 year old nurse.",
            "Gender": "Female",
            "Setting": "Early pregnancy unit"
        }
    }"#;

    #[test]
    fn test_parse_keeps_document_order_and_extra_fields() {
        let entries = parse_scenarios(DOCUMENT).unwrap();

        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Pancreatic cancer", "Miscarriage"]);

        let miscarriage = &entries[1].1;
        assert_eq!(miscarriage.gender.as_deref(), Some("Female"));
        assert_eq!(
            miscarriage.extra.get("Setting"),
            Some(&Value::from("Early pregnancy unit"))
        );
    }

    #[test]
    fn test_scenario_serializes_with_document_field_names() {
        let json = serde_json::to_value(Scenario::custom("Discuss a new diagnosis")).unwrap();
        assert_eq!(json, serde_json::json!({ "Scenario": "Discuss a new diagnosis" }));
    }

    #[tokio::test]
    async fn test_load_failure_leaves_only_custom() {
        let mut source = MockScenarioSource::new();
        source
            .expect_fetch()
            .returning(|| {
                Err(CatalogError::Io {
                    path: "static/data/scenarios.json".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                })
            })
            .once();

        let catalog = ScenarioCatalog::load(&source).await;

        let keys: Vec<String> = catalog.options().map(|o| o.key().to_string()).collect();
        assert_eq!(keys, vec![CUSTOM_SCENARIO_KEY.to_string()]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.load_error().is_some());
    }

    #[tokio::test]
    async fn test_load_appends_custom_after_entries() {
        let mut source = MockScenarioSource::new();
        source
            .expect_fetch()
            .returning(|| parse_scenarios(DOCUMENT))
            .once();

        let catalog = ScenarioCatalog::load(&source).await;

        let keys: Vec<String> = catalog.options().map(|o| o.key().to_string()).collect();
        assert_eq!(keys, vec!["Pancreatic cancer", "Miscarriage", "Custom"]);
        assert!(catalog.load_error().is_none());
    }

    #[test]
    fn test_reserved_custom_name_in_source_is_dropped() {
        let catalog = ScenarioCatalog::from_entries(vec![
            ("Custom".into(), Scenario::custom("shadowing")),
            ("Stroke".into(), Scenario::custom("Explain the stroke")),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.options().filter(|o| *o == ScenarioOption::Custom).count(),
            1
        );
    }

    #[test]
    fn test_resolve_named_custom_and_unknown() {
        let mut catalog = ScenarioCatalog::from_entries(parse_scenarios(DOCUMENT).unwrap());

        let named = catalog.resolve("Miscarriage").unwrap();
        assert_eq!(named.persona.as_deref(), Some("A 31 year old nurse."));

        assert!(matches!(
            catalog.resolve("Custom"),
            Err(CatalogError::EmptyCustomScenario)
        ));

        catalog.set_custom_draft("  Tell a parent their child needs surgery.  ");
        let custom = catalog.resolve("Custom").unwrap();
        assert_eq!(custom.description, "Tell a parent their child needs surgery.");
        assert!(custom.persona.is_none());

        assert!(matches!(
            catalog.resolve("Nope"),
            Err(CatalogError::UnknownScenario(key)) if key == "Nope"
        ));
    }

    #[tokio::test]
    async fn test_json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();

        let entries = JsonFileScenarioSource::new(file.path()).fetch().await.unwrap();
        assert_eq!(entries.len(), 2);

        let missing = JsonFileScenarioSource::new("/definitely/not/here.json")
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(missing, CatalogError::Io { .. }));
    }

    #[tokio::test]
    async fn test_malformed_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[1, 2, 3]").unwrap();

        let catalog = ScenarioCatalog::load(&JsonFileScenarioSource::new(file.path())).await;

        assert_eq!(catalog.len(), 1);
        assert!(catalog.load_error().unwrap().starts_with("Malformed scenario document"));
    }
}
