//! Region source schemas: declared field mappings, resolved once at load

use crate::error::{Error, Result};
use crate::region::AdminLevel;
use serde::{Deserialize, Serialize};

/// Field mapping for a region source.
///
/// The primary-name field is declared as an ordered candidate list; it is
/// resolved against the source exactly once, at load time. A source where no
/// candidate is present fails loading with a schema error instead of falling
/// back feature-by-feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSchema {
    level: AdminLevel,
    name_candidates: Vec<String>,
    code_field: Option<String>,
}

impl RegionSchema {
    /// Schema with a single declared name field
    pub fn new(level: AdminLevel, name_field: impl Into<String>) -> Self {
        Self {
            level,
            name_candidates: vec![name_field.into()],
            code_field: None,
        }
    }

    /// Schema with ordered name-field candidates (first present wins)
    pub fn with_candidates(level: AdminLevel, candidates: Vec<String>) -> Self {
        Self {
            level,
            name_candidates: candidates,
            code_field: None,
        }
    }

    /// GADM-style schema for a level: NAME_<depth> with GID_<depth> codes
    pub fn gadm(level: AdminLevel) -> Self {
        let depth = level.depth();
        Self {
            level,
            name_candidates: vec![format!("NAME_{}", depth)],
            code_field: Some(format!("GID_{}", depth)),
        }
    }

    /// Declare the property holding a region code
    pub fn with_code_field(mut self, field: impl Into<String>) -> Self {
        self.code_field = Some(field.into());
        self
    }

    pub fn level(&self) -> AdminLevel {
        self.level
    }

    pub fn name_candidates(&self) -> &[String] {
        &self.name_candidates
    }

    pub fn code_field(&self) -> Option<&str> {
        self.code_field.as_deref()
    }

    /// Resolve against the property keys of a source's first feature.
    ///
    /// `source_name` only labels the error.
    pub fn resolve<'a, I>(&self, source_name: &str, available: I) -> Result<ResolvedSchema>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keys: Vec<&str> = available.into_iter().collect();
        let name_field = self
            .name_candidates
            .iter()
            .find(|c| keys.contains(&c.as_str()))
            .cloned()
            .ok_or_else(|| Error::SchemaMismatch {
                source_name: source_name.to_string(),
                candidates: self.name_candidates.clone(),
            })?;

        Ok(ResolvedSchema {
            level: self.level,
            name_field,
            code_field: self.code_field.clone(),
        })
    }
}

/// A schema pinned to one concrete source: the name field is fixed ahead of
/// any per-feature reads.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub level: AdminLevel,
    pub name_field: String,
    pub code_field: Option<String>,
}
