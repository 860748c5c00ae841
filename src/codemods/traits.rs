use anyhow::Result;
use serde::{Deserialize, Serialize};
use tree_sitter::Tree;

use crate::model::source::SourceUnit;
use crate::model::span::ByteSpan;
use crate::model::symbols::{Resolution, SymbolTable};

/// What a codemod sees of one file.
pub struct CodemodContext<'a> {
    pub unit: &'a SourceUnit,
    /// The executor's private copy of the unit's tree, if the unit has one
    pub tree: Option<&'a Tree>,
    pub symbols: &'a SymbolTable,
}

impl<'a> CodemodContext<'a> {
    pub fn new(unit: &'a SourceUnit, symbols: &'a SymbolTable) -> Self {
        Self {
            unit,
            tree: unit.tree(),
            symbols,
        }
    }

    pub fn text(&self) -> &'a str {
        &self.unit.text
    }

    /// Whether the type reference at `span` resolved to `fqn`.
    pub fn type_is(&self, span: ByteSpan, fqn: &str) -> TypeMatch {
        let reference = self.symbols.reference_at(&self.unit.path, span);
        match reference.map(|r| &r.resolution) {
            Some(Resolution::Type(resolved)) if resolved == fqn => TypeMatch::Yes,
            Some(Resolution::Type(_)) | Some(Resolution::TypeParameter) => TypeMatch::No,
            Some(Resolution::Gap(_)) | None => TypeMatch::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMatch {
    Yes,
    No,
    /// Resolution gap: the site is reported, then skipped
    Unknown,
}

/// A place a codemod can rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    /// Text the codemod will replace
    pub span: ByteSpan,
    /// Type references that must resolve for the rewrite to be safe
    pub needs: Vec<ByteSpan>,
}

impl Site {
    pub fn new(span: ByteSpan) -> Self {
        Self {
            span,
            needs: Vec::new(),
        }
    }

    pub fn needing(mut self, reference: ByteSpan) -> Self {
        self.needs.push(reference);
        self
    }
}

/// New text for a span of the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub span: ByteSpan,
    pub text: String,
    pub description: Option<String>,
}

impl Replacement {
    pub fn new(span: ByteSpan, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait Codemod: Send + Sync {
    /// Stable identifier, e.g. `pixee:java/secure-random`
    fn id(&self) -> &str;

    fn version(&self) -> &str;

    /// One-line description for listings
    fn summary(&self) -> &str;

    /// Higher wins when sites overlap
    fn priority(&self) -> i32 {
        0
    }

    /// Finding rule ids this codemod addresses
    fn handles(&self) -> &[&str];

    /// Whether every applicable unit is scanned for sites without a finding
    fn scans(&self) -> bool {
        false
    }

    /// Whether sites carry type references that must resolve before applying
    fn requires_resolution(&self) -> bool {
        false
    }

    fn applies_to(&self, unit: &SourceUnit) -> bool;

    /// Sites in the unit, limited to those touching `region` when one is given.
    fn locate(&self, ctx: &CodemodContext, region: Option<ByteSpan>) -> Vec<Site>;

    /// Produce the replacement for one site. Must not depend on anything but
    /// the context and the site.
    fn apply(&self, ctx: &CodemodContext, site: &Site) -> Result<Replacement>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultRule {
    #[default]
    Enabled,
    Disabled,
}

/// Which registered codemods take part in a run: a default plus the ids that
/// invert it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodemodSelection {
    #[serde(default)]
    pub default: DefaultRule,
    #[serde(default)]
    pub exceptions: Vec<String>,
}

impl CodemodSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default: DefaultRule::Disabled,
            exceptions: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        let excepted = self.exceptions.iter().any(|e| e == id);
        match self.default {
            DefaultRule::Enabled => !excepted,
            DefaultRule::Disabled => excepted,
        }
    }
}
