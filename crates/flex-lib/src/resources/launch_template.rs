//! Launch template reconstruction
//!
//! Templates are identified by id but groups may reference them by name.
//! The folded templates live in a single store addressed by a synthetic key,
//! with one lookup table per natural key pointing into it.

use super::Reconstructor;
use crate::events::{TemplateAction, TemplateEvent, TypedEvent};
use crate::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Sentinel version key aliasing the default version
pub const VERSION_DEFAULT: &str = "$Default";
/// Sentinel version key aliasing the highest version
pub const VERSION_LATEST: &str = "$Latest";

/// How a template version is referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionKey {
    Default,
    Latest,
    Number(u32),
}

impl VersionKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            VERSION_DEFAULT => Some(Self::Default),
            VERSION_LATEST => Some(Self::Latest),
            other => other.parse().ok().map(Self::Number),
        }
    }
}

/// A reference to a template version by template id or name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Template id or template name
    pub key: String,
    pub version: VersionKey,
}

impl TemplateRef {
    pub fn new(key: String, version: VersionKey) -> Self {
        Self { key, version }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplateVersion {
    pub created_at: DateTime<Utc>,
    pub version_number: u32,
    pub uses_heterogeneous_requirements: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplate {
    pub id: String,
    pub name: String,
    pub versions: BTreeMap<u32, LaunchTemplateVersion>,
    /// Version number the default alias points at
    pub default_version: Option<u32>,
}

impl LaunchTemplate {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            versions: BTreeMap::new(),
            default_version: None,
        }
    }

    fn hydrate(&mut self, event: &TemplateEvent) {
        self.id.clone_from(&event.template_id);
        self.name.clone_from(&event.template_name);

        match event.action {
            TemplateAction::Create {
                uses_heterogeneous_requirements,
            } => {
                self.versions.insert(
                    1,
                    LaunchTemplateVersion {
                        created_at: event.time,
                        version_number: 1,
                        uses_heterogeneous_requirements,
                    },
                );
                self.default_version = Some(1);
            }
            TemplateAction::CreateVersion {
                version_number,
                is_default,
                uses_heterogeneous_requirements,
            } => {
                self.versions.insert(
                    version_number,
                    LaunchTemplateVersion {
                        created_at: event.time,
                        version_number,
                        uses_heterogeneous_requirements,
                    },
                );
                if is_default {
                    self.default_version = Some(version_number);
                }
            }
            TemplateAction::Modify {
                default_version: Some(version),
            } => {
                // Only a version we have already observed can become the default
                if self.versions.contains_key(&version) {
                    self.default_version = Some(version);
                } else {
                    debug!(
                        template_id = %self.id,
                        version = version,
                        "Ignoring default repoint to an unobserved version"
                    );
                }
            }
            TemplateAction::Modify {
                default_version: None,
            } => {}
        }
    }

    /// Resolve a version key to an observed version
    pub fn version(&self, key: VersionKey) -> Option<&LaunchTemplateVersion> {
        match key {
            VersionKey::Default => self.default_version.and_then(|v| self.versions.get(&v)),
            VersionKey::Latest => self.versions.values().next_back(),
            VersionKey::Number(n) => self.versions.get(&n),
        }
    }
}

/// Synthetic primary key of a template in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey(usize);

/// Launch templates addressable by either id or name
#[derive(Debug, Clone, Default)]
pub struct LaunchTemplateCatalog {
    templates: Vec<LaunchTemplate>,
    by_id: HashMap<String, TemplateKey>,
    by_name: HashMap<String, TemplateKey>,
}

impl LaunchTemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a template, replacing any template with the same id
    pub fn insert(&mut self, template: LaunchTemplate) -> TemplateKey {
        let key = match self.by_id.get(&template.id) {
            Some(&key) => {
                let previous = std::mem::replace(&mut self.templates[key.0], template);
                if self.by_name.get(&previous.name) == Some(&key) {
                    self.by_name.remove(&previous.name);
                }
                key
            }
            None => {
                self.templates.push(template);
                TemplateKey(self.templates.len() - 1)
            }
        };

        let stored = &self.templates[key.0];
        self.by_id.insert(stored.id.clone(), key);
        self.by_name.insert(stored.name.clone(), key);
        key
    }

    /// Move every template of `other` into this catalog
    pub fn merge(&mut self, other: LaunchTemplateCatalog) {
        for template in other.templates {
            self.insert(template);
        }
    }

    /// Look a template up by id, falling back to name
    pub fn get(&self, id_or_name: &str) -> Option<&LaunchTemplate> {
        self.by_id
            .get(id_or_name)
            .or_else(|| self.by_name.get(id_or_name))
            .map(|key| &self.templates[key.0])
    }

    pub fn key_of(&self, id_or_name: &str) -> Option<TemplateKey> {
        self.by_id
            .get(id_or_name)
            .or_else(|| self.by_name.get(id_or_name))
            .copied()
    }

    /// Resolve a reference to a concrete version
    pub fn resolve(&self, reference: &TemplateRef) -> Option<&LaunchTemplateVersion> {
        self.get(&reference.key)?.version(reference.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LaunchTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Folds launch template events keyed by template id
#[derive(Debug, Default)]
pub struct LaunchTemplateReconstructor {
    templates: BTreeMap<String, LaunchTemplate>,
}

impl LaunchTemplateReconstructor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reconstructor for LaunchTemplateReconstructor {
    type Output = LaunchTemplateCatalog;

    fn apply(&mut self, event: TypedEvent) {
        let TypedEvent::LaunchTemplate(event) = event else {
            return;
        };

        self.templates
            .entry(event.template_id.clone())
            .or_insert_with(|| LaunchTemplate::new(&event.template_id, &event.template_name))
            .hydrate(&event);
    }

    fn finish(self, _window: &TimeWindow) -> LaunchTemplateCatalog {
        let mut catalog = LaunchTemplateCatalog::new();
        for template in self.templates.into_values() {
            catalog.insert(template);
        }
        catalog
    }
}
