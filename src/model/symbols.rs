use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use super::builtins;
use super::parser::{descendants, node_span, node_text};
use super::source::SourceUnit;
use super::span::ByteSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
    Method,
    Field,
}

impl DeclarationKind {
    fn from_type_node(kind: &str) -> Option<Self> {
        match kind {
            "class_declaration" => Some(DeclarationKind::Class),
            "interface_declaration" => Some(DeclarationKind::Interface),
            "enum_declaration" => Some(DeclarationKind::Enum),
            "record_declaration" => Some(DeclarationKind::Record),
            "annotation_type_declaration" => Some(DeclarationKind::Annotation),
            _ => None,
        }
    }

    pub fn is_type(&self) -> bool {
        !matches!(self, DeclarationKind::Method | DeclarationKind::Field)
    }
}

/// A named declaration site. Members are keyed `pkg.Type#name`.
#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    pub fqn: String,
    pub kind: DeclarationKind,
    pub path: PathBuf,
    pub span: ByteSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GapReason {
    Unresolved,
    Ambiguous { candidates: Vec<String> },
}

/// A type reference the resolver could not bind to exactly one declaration.
/// Codemods depending on it must skip rather than guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionGap {
    pub path: PathBuf,
    pub span: ByteSpan,
    pub name: String,
    pub reason: GapReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Fully qualified type name
    Type(String),
    TypeParameter,
    Gap(GapReason),
}

/// A type name as written in source, with what it resolved to.
#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub span: ByteSpan,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolStats {
    pub files: usize,
    pub declarations: usize,
    pub references: usize,
    pub resolved: usize,
    pub gaps: usize,
}

#[derive(Debug, Default)]
struct FileSymbols {
    references: Vec<Reference>,
    gaps: Vec<ResolutionGap>,
}

/// Cross-file declaration and reference index.
///
/// Built in two phases: every parsed unit is outlined independently, then all
/// references are resolved against the complete set of outlines. Read-only
/// once built.
#[derive(Debug, Default)]
pub struct SymbolTable {
    declarations: BTreeMap<String, Declaration>,
    files: HashMap<PathBuf, FileSymbols>,
}

impl SymbolTable {
    pub fn build(units: &[SourceUnit]) -> Self {
        let outlines: Vec<Outline> = units
            .par_iter()
            .filter_map(|unit| unit.tree().map(|tree| outline(unit, tree.root_node())))
            .collect();

        let index = PackageIndex::new(&outlines);

        let files: Vec<(PathBuf, FileSymbols)> = outlines
            .par_iter()
            .map(|outline| (outline.path.clone(), resolve_file(outline, &index)))
            .collect();

        let mut declarations = BTreeMap::new();
        for outline in &outlines {
            for decl in &outline.declarations {
                declarations
                    .entry(decl.fqn.clone())
                    .or_insert_with(|| decl.clone());
            }
        }

        let table = Self {
            declarations,
            files: files.into_iter().collect(),
        };
        let stats = table.stats();
        tracing::debug!(
            files = stats.files,
            declarations = stats.declarations,
            references = stats.references,
            gaps = stats.gaps,
            "symbol table built"
        );
        table
    }

    pub fn references(&self, path: &Path) -> &[Reference] {
        self.files
            .get(path)
            .map(|f| f.references.as_slice())
            .unwrap_or(&[])
    }

    /// The reference spanning exactly `span`, if one was recorded.
    pub fn reference_at(&self, path: &Path, span: ByteSpan) -> Option<&Reference> {
        let refs = self.references(path);
        refs.binary_search_by(|r| r.span.cmp(&span))
            .ok()
            .map(|i| &refs[i])
    }

    pub fn gaps(&self, path: &Path) -> &[ResolutionGap] {
        self.files
            .get(path)
            .map(|f| f.gaps.as_slice())
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> SymbolStats {
        let references: usize = self.files.values().map(|f| f.references.len()).sum();
        let gaps: usize = self.files.values().map(|f| f.gaps.len()).sum();
        let resolved = self
            .files
            .values()
            .flat_map(|f| f.references.iter())
            .filter(|r| !matches!(r.resolution, Resolution::Gap(_)))
            .count();
        SymbolStats {
            files: self.files.len(),
            declarations: self.declarations.len(),
            references,
            resolved,
            gaps,
        }
    }
}

struct LocalType {
    simple: String,
    fqn: String,
    /// Where the simple name is visible: the enclosing type, or the whole file
    scope: ByteSpan,
    top_level: bool,
}

struct Outline {
    path: PathBuf,
    package: String,
    single_imports: HashMap<String, String>,
    wildcard_imports: Vec<String>,
    types: Vec<LocalType>,
    type_params: Vec<(String, ByteSpan)>,
    declarations: Vec<Declaration>,
    raw_refs: Vec<(String, ByteSpan)>,
}

fn outline(unit: &SourceUnit, root: Node<'_>) -> Outline {
    let text = unit.text.as_str();
    let mut out = Outline {
        path: unit.path.clone(),
        package: String::new(),
        single_imports: HashMap::new(),
        wildcard_imports: Vec::new(),
        types: Vec::new(),
        type_params: Vec::new(),
        declarations: Vec::new(),
        raw_refs: Vec::new(),
    };

    let mut cursor = root.walk();
    let top: Vec<Node<'_>> = root.named_children(&mut cursor).collect();

    for node in &top {
        match node.kind() {
            "package_declaration" => {
                if let Some(name) = qualified_child(*node, text) {
                    out.package = name;
                }
            }
            "import_declaration" => record_import(*node, text, &mut out),
            _ => {}
        }
    }

    let file_scope = ByteSpan::new(0, text.len());
    let package = out.package.clone();
    collect_declarations(&top, text, &package, file_scope, true, &mut out);

    for node in &top {
        if matches!(node.kind(), "package_declaration" | "import_declaration") {
            continue;
        }
        for n in descendants(*node) {
            collect_reference(n, text, &mut out.raw_refs);
        }
    }

    out
}

fn qualified_child(node: Node<'_>, text: &str) -> Option<String> {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|c| matches!(c.kind(), "identifier" | "scoped_identifier"))
        .map(|c| strip_whitespace(node_text(c, text)));
    found
}

fn record_import(node: Node<'_>, text: &str, out: &mut Outline) {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    let is_static = children.iter().any(|c| c.kind() == "static");
    let wildcard = children.iter().any(|c| c.kind() == "asterisk");
    let Some(name) = qualified_child(node, text) else {
        return;
    };

    if wildcard {
        // `import static a.B.*` brings in B's member types, like `import a.B.*`
        out.wildcard_imports.push(name);
    } else if !is_static {
        let simple = name.rsplit('.').next().unwrap_or(&name).to_string();
        out.single_imports.entry(simple).or_insert(name);
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn collect_declarations(
    nodes: &[Node<'_>],
    text: &str,
    prefix: &str,
    scope: ByteSpan,
    top_level: bool,
    out: &mut Outline,
) {
    for node in nodes {
        let kind = node.kind();
        if let Some(decl_kind) = DeclarationKind::from_type_node(kind) {
            let Some(name_node) = node.child_by_field_name("name") else {
                continue;
            };
            let simple = node_text(name_node, text).to_string();
            let fqn = join(prefix, &simple);
            record_type_params(*node, text, out);
            out.types.push(LocalType {
                simple,
                fqn: fqn.clone(),
                scope,
                top_level,
            });
            out.declarations.push(Declaration {
                fqn: fqn.clone(),
                kind: decl_kind,
                path: out.path.clone(),
                span: node_span(name_node),
            });
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                let members: Vec<Node<'_>> = body.named_children(&mut cursor).collect();
                collect_declarations(&members, text, &fqn, node_span(*node), false, out);
            }
            continue;
        }

        match kind {
            "method_declaration" | "constructor_declaration" => {
                record_type_params(*node, text, out);
                if let Some(name_node) = node.child_by_field_name("name") {
                    out.declarations.push(Declaration {
                        fqn: format!("{}#{}", prefix, node_text(name_node, text)),
                        kind: DeclarationKind::Method,
                        path: out.path.clone(),
                        span: node_span(name_node),
                    });
                }
            }
            "field_declaration" | "constant_declaration" => {
                let mut cursor = node.walk();
                for declarator in node.children_by_field_name("declarator", &mut cursor) {
                    if let Some(name_node) = declarator.child_by_field_name("name") {
                        out.declarations.push(Declaration {
                            fqn: format!("{}#{}", prefix, node_text(name_node, text)),
                            kind: DeclarationKind::Field,
                            path: out.path.clone(),
                            span: node_span(name_node),
                        });
                    }
                }
            }
            "enum_body_declarations" => {
                let mut cursor = node.walk();
                let members: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                collect_declarations(&members, text, prefix, scope, false, out);
            }
            _ => {}
        }
    }
}

fn record_type_params(node: Node<'_>, text: &str, out: &mut Outline) {
    let Some(params) = node.child_by_field_name("type_parameters") else {
        return;
    };
    let scope = node_span(node);
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        if param.kind() != "type_parameter" {
            continue;
        }
        let mut inner = param.walk();
        let name = param
            .named_children(&mut inner)
            .find(|c| matches!(c.kind(), "type_identifier" | "identifier"))
            .map(|c| node_text(c, text).to_string());
        if let Some(name) = name {
            out.type_params.push((name, scope));
        }
    }
}

/// Capitalized but not a constant: `Random`, `SSLContext`; not `MAX`, `value`.
fn looks_like_type(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().any(|c| c.is_ascii_lowercase())
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn collect_reference(node: Node<'_>, text: &str, refs: &mut Vec<(String, ByteSpan)>) {
    let parent_kind = node.parent().map(|p| p.kind()).unwrap_or("");
    match node.kind() {
        "type_identifier" => {
            if matches!(parent_kind, "scoped_type_identifier" | "type_parameter") {
                return;
            }
            let name = node_text(node, text);
            if name != "var" {
                refs.push((name.to_string(), node_span(node)));
            }
        }
        "scoped_type_identifier" => {
            if parent_kind == "scoped_type_identifier" {
                return;
            }
            let raw = node_text(node, text);
            if !raw.contains('@') {
                refs.push((strip_whitespace(raw), node_span(node)));
            }
        }
        "method_invocation" | "field_access" => {
            let Some(object) = node.child_by_field_name("object") else {
                return;
            };
            match object.kind() {
                "identifier" => {
                    let name = node_text(object, text);
                    if looks_like_type(name) {
                        refs.push((name.to_string(), node_span(object)));
                    }
                }
                "field_access" if node.kind() == "field_access" => {
                    // `io.jsonwebtoken.Jwts`: lowercase package chain ending in a type
                    let Some(field) = node.child_by_field_name("field") else {
                        return;
                    };
                    if looks_like_type(node_text(field, text)) && is_package_chain(object, text) {
                        refs.push((strip_whitespace(node_text(node, text)), node_span(node)));
                    }
                }
                _ => {}
            }
        }
        _ => {}
    }
}

fn is_package_chain(node: Node<'_>, text: &str) -> bool {
    match node.kind() {
        "identifier" => node_text(node, text)
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase()),
        "field_access" => {
            let object = node.child_by_field_name("object");
            let field = node.child_by_field_name("field");
            match (object, field) {
                (Some(object), Some(field)) => {
                    field.kind() == "identifier"
                        && !looks_like_type(node_text(field, text))
                        && is_package_chain(object, text)
                }
                _ => false,
            }
        }
        _ => false,
    }
}

struct PackageIndex<'a> {
    /// package -> simple name -> fqn, top-level types only
    top_level: HashMap<&'a str, HashMap<&'a str, &'a str>>,
    types: HashSet<&'a str>,
}

impl<'a> PackageIndex<'a> {
    fn new(outlines: &'a [Outline]) -> Self {
        let mut top_level: HashMap<&str, HashMap<&str, &str>> = HashMap::new();
        let mut types = HashSet::new();
        for outline in outlines {
            for t in &outline.types {
                types.insert(t.fqn.as_str());
                if t.top_level {
                    top_level
                        .entry(outline.package.as_str())
                        .or_default()
                        .entry(t.simple.as_str())
                        .or_insert(t.fqn.as_str());
                }
            }
        }
        Self { top_level, types }
    }

    fn top_level(&self, package: &str, simple: &str) -> Option<&'a str> {
        self.top_level.get(package)?.get(simple).copied()
    }
}

fn resolve_file(outline: &Outline, index: &PackageIndex<'_>) -> FileSymbols {
    let mut references: Vec<Reference> = outline
        .raw_refs
        .iter()
        .map(|(name, span)| Reference {
            name: name.clone(),
            span: *span,
            resolution: resolve_name(outline, index, name, *span),
        })
        .collect();
    references.sort_by(|a, b| a.span.cmp(&b.span));
    references.dedup_by(|a, b| a.span == b.span);

    let gaps = references
        .iter()
        .filter_map(|r| match &r.resolution {
            Resolution::Gap(reason) => Some(ResolutionGap {
                path: outline.path.clone(),
                span: r.span,
                name: r.name.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        })
        .collect();

    FileSymbols { references, gaps }
}

fn resolve_name(
    outline: &Outline,
    index: &PackageIndex<'_>,
    name: &str,
    span: ByteSpan,
) -> Resolution {
    let Some((first, rest)) = name.split_once('.') else {
        return resolve_simple(outline, index, name, span);
    };
    if first.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Resolution::Type(name.to_string());
    }
    match resolve_simple(outline, index, first, span) {
        Resolution::Type(fqn) => Resolution::Type(format!("{}.{}", fqn, rest)),
        Resolution::TypeParameter => Resolution::Gap(GapReason::Unresolved),
        gap => gap,
    }
}

/// Scope order: type parameters, types of this file, single-type imports,
/// the file's package, then on-demand imports together with `java.lang`.
fn resolve_simple(
    outline: &Outline,
    index: &PackageIndex<'_>,
    name: &str,
    span: ByteSpan,
) -> Resolution {
    if outline
        .type_params
        .iter()
        .any(|(param, scope)| param == name && scope.contains(&span))
    {
        return Resolution::TypeParameter;
    }

    let local = outline
        .types
        .iter()
        .filter(|t| t.simple == name && t.scope.contains(&span))
        .min_by_key(|t| t.scope.len());
    if let Some(t) = local {
        return Resolution::Type(t.fqn.clone());
    }

    if let Some(fqn) = outline.single_imports.get(name) {
        return Resolution::Type(fqn.clone());
    }

    if let Some(fqn) = index.top_level(&outline.package, name) {
        return Resolution::Type(fqn.to_string());
    }

    let mut candidates = BTreeSet::new();
    for package in outline
        .wildcard_imports
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("java.lang"))
    {
        let fqn = join(package, name);
        if index.types.contains(fqn.as_str())
            || builtins::package_contains(package, name) == Some(true)
        {
            candidates.insert(fqn);
        }
    }

    match candidates.len() {
        0 => Resolution::Gap(GapReason::Unresolved),
        1 => Resolution::Type(candidates.into_iter().next().unwrap_or_default()),
        _ => Resolution::Gap(GapReason::Ambiguous {
            candidates: candidates.into_iter().collect(),
        }),
    }
}
