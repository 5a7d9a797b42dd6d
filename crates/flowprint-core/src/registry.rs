//! Query registry: the declarative classification rules for both domains.
//!
//! Pure configuration. Rules are assembled through a builder and validated
//! once, before any matching begins; a registry value that exists is a valid
//! one. The built-in rules reproduce the stock waste keyword queries and the
//! material market prefix table; both can be replaced from JSON files.
//!
//! Matching is deliberately literal: substring tests are case-sensitive and
//! punctuation-sensitive, so a trailing comma in a prefix (`"market for
//! water,"`) is a meaningful disambiguator, not noise.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::Category;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("waste query with empty name")]
    EmptyQueryName,

    #[error("waste query {name:?} has an empty unit")]
    EmptyUnit { name: String },

    #[error("waste query {name:?} has no required (AND) terms")]
    NoRequiredTerms { name: String },

    #[error("duplicate waste query ({name}, {unit})")]
    DuplicateWasteQuery { name: String, unit: String },

    #[error("material query with empty prefix")]
    EmptyPrefix,

    #[error("material query {prefix:?} has an empty group")]
    EmptyGroup { prefix: String },

    #[error("duplicate material prefix {prefix:?}")]
    DuplicatePrefix { prefix: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A waste-domain keyword query.
///
/// A flat row matches iff its exchange unit equals `unit`, its amount is
/// non-zero, its exchange name contains every `all` term, at least one `any`
/// term when `any` is non-empty, and no `none` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasteQuery {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub any: Vec<String>,
    #[serde(default)]
    pub none: Vec<String>,
}

impl WasteQuery {
    pub fn category(&self) -> Category {
        Category::Waste {
            subcategory: self.name.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// A material-domain prefix query: processes whose name starts with `prefix`
/// roll up into `group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialQuery {
    pub prefix: String,
    pub group: String,
}

/// Validated, immutable rule set for one pipeline run.
#[derive(Debug, Clone)]
pub struct QueryRegistry {
    waste: Vec<WasteQuery>,
    materials: Vec<MaterialQuery>,
}

impl QueryRegistry {
    pub fn builder() -> QueryRegistryBuilder {
        QueryRegistryBuilder::default()
    }

    /// The stock rule set: eight waste subcategories at kilogram and cubic
    /// meter, plus the material market prefix table.
    pub fn default_rules() -> Self {
        let mut builder = Self::builder();
        for unit in ["kilogram", "cubic meter"] {
            for query in default_waste_queries(unit) {
                builder = builder.waste_query(query);
            }
        }
        for (prefix, group) in DEFAULT_MATERIALS {
            builder = builder.material_query(*prefix, *group);
        }
        builder
            .build()
            .expect("built-in classification rules validate")
    }

    /// Load rules from JSON files, falling back to the built-in table for
    /// whichever domain has no file.
    ///
    /// Waste file: an array of `WasteQuery` objects. Material file: an array
    /// of `[prefix, group]` pairs.
    pub fn from_json_files(
        waste_path: Option<&Path>,
        material_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();

        match waste_path {
            Some(path) => {
                let queries: Vec<WasteQuery> =
                    serde_json::from_str(&std::fs::read_to_string(path)?)?;
                for query in queries {
                    builder = builder.waste_query(query);
                }
            }
            None => {
                for unit in ["kilogram", "cubic meter"] {
                    for query in default_waste_queries(unit) {
                        builder = builder.waste_query(query);
                    }
                }
            }
        }

        match material_path {
            Some(path) => {
                let pairs: Vec<(String, String)> =
                    serde_json::from_str(&std::fs::read_to_string(path)?)?;
                for (prefix, group) in pairs {
                    builder = builder.material_query(prefix, group);
                }
            }
            None => {
                for (prefix, group) in DEFAULT_MATERIALS {
                    builder = builder.material_query(*prefix, *group);
                }
            }
        }

        builder.build()
    }

    pub fn waste_queries(&self) -> &[WasteQuery] {
        &self.waste
    }

    /// Material queries, longest prefix first. First-match iteration over
    /// this slice implements longest-prefix-wins.
    pub fn material_queries(&self) -> &[MaterialQuery] {
        &self.materials
    }

    /// Every category this registry can produce: one per waste query plus one
    /// per distinct material group.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.waste.iter().map(|q| q.category()).collect();
        let mut seen = HashSet::new();
        for query in &self.materials {
            if seen.insert(query.group.as_str()) {
                categories.push(Category::Material {
                    group: query.group.clone(),
                });
            }
        }
        categories
    }
}

#[derive(Debug, Default)]
pub struct QueryRegistryBuilder {
    waste: Vec<WasteQuery>,
    materials: Vec<MaterialQuery>,
}

impl QueryRegistryBuilder {
    pub fn waste_query(mut self, query: WasteQuery) -> Self {
        self.waste.push(query);
        self
    }

    pub fn material_query(mut self, prefix: impl Into<String>, group: impl Into<String>) -> Self {
        self.materials.push(MaterialQuery {
            prefix: prefix.into(),
            group: group.into(),
        });
        self
    }

    /// Validate and freeze the rule set. All configuration failures surface
    /// here, before any matching runs.
    pub fn build(self) -> Result<QueryRegistry, ConfigError> {
        let mut seen_waste = HashSet::new();
        for query in &self.waste {
            if query.name.is_empty() {
                return Err(ConfigError::EmptyQueryName);
            }
            if query.unit.is_empty() {
                return Err(ConfigError::EmptyUnit {
                    name: query.name.clone(),
                });
            }
            if query.all.is_empty() || query.all.iter().any(String::is_empty) {
                return Err(ConfigError::NoRequiredTerms {
                    name: query.name.clone(),
                });
            }
            if !seen_waste.insert((query.name.clone(), query.unit.clone())) {
                return Err(ConfigError::DuplicateWasteQuery {
                    name: query.name.clone(),
                    unit: query.unit.clone(),
                });
            }
        }

        let mut seen_prefix = HashSet::new();
        for query in &self.materials {
            if query.prefix.is_empty() {
                return Err(ConfigError::EmptyPrefix);
            }
            if query.group.is_empty() {
                return Err(ConfigError::EmptyGroup {
                    prefix: query.prefix.clone(),
                });
            }
            if !seen_prefix.insert(query.prefix.clone()) {
                return Err(ConfigError::DuplicatePrefix {
                    prefix: query.prefix.clone(),
                });
            }
        }

        // Longest prefix first, so one prefix being a substring of another
        // resolves to the more specific rule. Identical lengths cannot
        // collide ambiguously: equal prefixes were rejected above.
        let mut materials = self.materials;
        materials.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        Ok(QueryRegistry {
            waste: self.waste,
            materials,
        })
    }
}

// ============================================================================
// Built-in rules
// ============================================================================

fn default_waste_queries(unit: &str) -> Vec<WasteQuery> {
    let q = |name: &str, all: &[&str], any: &[&str], none: &[&str]| WasteQuery {
        name: name.to_string(),
        unit: unit.to_string(),
        all: all.iter().map(|s| s.to_string()).collect(),
        any: any.iter().map(|s| s.to_string()).collect(),
        none: none.iter().map(|s| s.to_string()).collect(),
    };

    vec![
        q("digestion", &["waste", "digestion"], &[], &[]),
        q("composting", &["waste", "composting"], &[], &[]),
        q("open_burning", &["waste", "burning"], &[], &[]),
        q("incineration", &["waste", "incineration"], &[], &[]),
        q("recycling", &["waste", "recycling"], &[], &[]),
        q("landfill", &["waste"], &["landfill", "dumped", "deposit"], &[]),
        q(
            "hazardous",
            &["waste"],
            &["hazardous", "radioactive"],
            &["non-hazardous", "non-radioactive"],
        ),
        q("total", &["waste"], &[], &[]),
    ]
}

/// Material market prefixes and their demand groups. Trailing commas narrow a
/// prefix to a specific market family (e.g. `"market for water,"` does not
/// capture `"market for tap water"`).
const DEFAULT_MATERIALS: &[(&str, &str)] = &[
    ("market for aluminium", "aluminium"),
    ("market for antimony", "antimony"),
    ("market for bauxite", "bauxite"),
    ("market for beryllium", "beryllium"),
    ("market for bismuth", "bismuth"),
    ("market for cadmium", "cadmium"),
    ("market for calcium borates", "borates"),
    ("market for cement", "cement"),
    ("market for cerium", "cerium"),
    ("market for chromium", "chromium"),
    ("market for coal", "coal"),
    ("market for cobalt", "cobalt"),
    ("market for coke", "coke"),
    ("market for copper", "copper"),
    ("market for dysprosium", "dysprosium"),
    ("market for erbium", "erbium"),
    ("market for europium", "europium"),
    ("market for electricity,", "electricity"),
    ("market for ferroniobium,", "niobium"),
    ("market for fluorspar,", "fluorspar"),
    ("market for gadolinium", "gadolinium"),
    ("market for gallium", "gallium"),
    ("market for gold", "gold"),
    ("market for graphite", "graphite"),
    ("market for hafnium", "hafnium"),
    ("market for helium", "helium"),
    ("market for holmium", "holmium"),
    ("market for hydrogen,", "hydrogen"),
    ("market for indium", "indium"),
    ("market for latex", "latex"),
    ("market for lithium", "lithium"),
    ("market for magnesium", "magnesium"),
    ("market for natural gas,", "natural gas"),
    ("market for nickel", "nickel"),
    ("market for palladium", "palladium"),
    ("market for petroleum", "petroleum"),
    ("market for phosphate", "phosphate rock"),
    ("market for platinum", "platinum"),
    ("market for rare earth", "rare earth"),
    ("market for rhodium", "rhodium"),
    ("market for sand", "sand"),
    ("market for selenium", "selenium"),
    ("market for scandium", "scandium"),
    ("market for silicon", "silicon"),
    ("market for silver", "silver"),
    ("market for sodium borates", "borates"),
    ("market for strontium", "strontium"),
    ("market for tantalum", "tantalum"),
    ("market for tellurium", "tellurium"),
    ("market for tin", "tin"),
    ("market for titanium", "titanium"),
    ("market for uranium", "uranium"),
    ("market for tungsten", "tungsten"),
    ("market for vanadium", "vanadium"),
    ("market for vegetable oil,", "vegetable oil"),
    ("market for tap water", "water"),
    ("market for water,", "water"),
    ("market for zinc", "zinc"),
    ("market for zirconium", "zirconium"),
];
