//! Visual templates: what a node of a given type looks like on the canvas.
//!
//! A template is a list of elements. Single-element templates become one
//! shape; multi-element templates become a group whose *master* element
//! carries the node's label. Style values may reference design tokens
//! (`"$primary"`), resolved through `TemplateManager::resolve_style`.

use crate::error::{SyncError, SyncResult};
use crate::widget::Style;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One visual element inside a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateElement {
    /// Canvas shape name (`rectangle`, `circle`, `round_rectangle`, …).
    /// `"text"` creates a text widget instead of a shape.
    #[serde(default = "default_shape")]
    pub shape: String,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    /// Offset from the template origin, used for multi-element layouts.
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    /// Fixed text; `{label}` is replaced with the node label.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub style: Style,
}

fn default_shape() -> String {
    "rectangle".to_string()
}

impl TemplateElement {
    pub fn is_text(&self) -> bool {
        self.shape == "text"
    }

    /// Element text with the label substituted.
    pub fn render_text(&self, label: &str) -> Option<String> {
        self.text.as_ref().map(|t| t.replace("{label}", label))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,
    pub elements: Vec<TemplateElement>,
    /// Index of the element carrying the label. Default: the first.
    #[serde(default)]
    pub master_element: Option<usize>,
}

impl TemplateDefinition {
    pub fn master_index(&self) -> usize {
        self.master_element.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorTemplate {
    pub name: String,
    #[serde(default)]
    pub shape: Option<String>,
    #[serde(default)]
    pub style: Style,
}

/// Lookup of node and connector templates plus style token resolution.
pub trait TemplateManager: Send + Sync {
    fn get_template(&self, name: &str) -> Option<&TemplateDefinition>;
    fn get_connector_template(&self, name: &str) -> Option<&ConnectorTemplate>;
    fn resolve_style(&self, raw: &Style) -> Style;
}

/// In-memory template registry, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateRegistry {
    pub templates: HashMap<String, TemplateDefinition>,
    pub connectors: HashMap<String, ConnectorTemplate>,
    /// Design tokens, referenced from style values as `$name`.
    pub tokens: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    templates: Vec<TemplateDefinition>,
    #[serde(default)]
    connectors: Vec<ConnectorTemplate>,
    #[serde(default)]
    tokens: HashMap<String, String>,
}

impl TemplateRegistry {
    /// Built-in templates: one per basic shape plus a plain connector.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.tokens.insert("primary".into(), "#4262ff".into());
        registry.tokens.insert("surface".into(), "#ffffff".into());
        registry.tokens.insert("ink".into(), "#1a1a1a".into());
        for (name, shape) in [
            ("Rectangle", "rectangle"),
            ("Circle", "circle"),
            ("Rounded", "round_rectangle"),
            ("Diamond", "rhombus"),
        ] {
            registry.insert(TemplateDefinition {
                name: name.to_string(),
                elements: vec![TemplateElement {
                    shape: shape.to_string(),
                    width: None,
                    height: None,
                    dx: 0.0,
                    dy: 0.0,
                    text: None,
                    style: [("fillColor", "$surface"), ("borderColor", "$primary"), ("color", "$ink")]
                        .into_iter()
                        .collect(),
                }],
                master_element: None,
            });
        }
        registry.insert_connector(ConnectorTemplate {
            name: "default".to_string(),
            shape: Some("elbowed".to_string()),
            style: [("strokeColor", "$ink")].into_iter().collect(),
        });
        registry
    }

    /// Load templates from a JSON document
    /// `{ "templates": [...], "connectors": [...], "tokens": {...} }`.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let file: RegistryFile =
            serde_json::from_str(text).map_err(|e| SyncError::InvalidFile(format!("templates: {e}")))?;
        let mut registry = Self {
            tokens: file.tokens,
            ..Self::default()
        };
        for t in file.templates {
            registry.insert(t);
        }
        for c in file.connectors {
            registry.insert_connector(c);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, template: TemplateDefinition) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn insert_connector(&mut self, template: ConnectorTemplate) {
        self.connectors.insert(template.name.clone(), template);
    }
}

impl TemplateManager for TemplateRegistry {
    fn get_template(&self, name: &str) -> Option<&TemplateDefinition> {
        self.templates.get(name)
    }

    fn get_connector_template(&self, name: &str) -> Option<&ConnectorTemplate> {
        self.connectors.get(name)
    }

    /// Replace `$token` values with their definition. Unknown tokens are
    /// left as written.
    fn resolve_style(&self, raw: &Style) -> Style {
        raw.0
            .iter()
            .map(|(k, v)| {
                let resolved = v
                    .strip_prefix('$')
                    .and_then(|token| self.tokens.get(token))
                    .unwrap_or(v);
                (k.clone(), resolved.clone())
            })
            .collect()
    }
}
