use anyhow::{bail, Result};
use tree_sitter::Node;

use super::traits::{Codemod, CodemodContext, Replacement, Site, TypeMatch};
use crate::model::parser::{descendants, node_span, node_text};
use crate::model::source::{Language, SourceUnit};
use crate::model::span::ByteSpan;

const JWTS: &str = "io.jsonwebtoken.Jwts";

/// Makes JJWT verify signatures: `parser.parse(token)` accepts unsigned
/// tokens, `parser.parseClaimsJws(token)` rejects them.
pub struct UnverifiedJwtCodemod;

/// Receiver of the `Jwts.parser()` / `Jwts.parserBuilder()` call at the root of
/// the chain `call` belongs to.
fn jwts_root<'t>(call: Node<'t>, text: &str) -> Option<Node<'t>> {
    let mut current = call.child_by_field_name("object")?;
    while current.kind() == "method_invocation" {
        let name = current.child_by_field_name("name").map(|n| node_text(n, text));
        let object = current.child_by_field_name("object")?;
        if matches!(name, Some("parser") | Some("parserBuilder"))
            && matches!(object.kind(), "identifier" | "field_access")
        {
            return Some(object);
        }
        current = object;
    }
    None
}

impl Codemod for UnverifiedJwtCodemod {
    fn id(&self) -> &str {
        "pixee:java/missing-jwt-signature-check"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn summary(&self) -> &str {
        "Switch JWT parsing to the signature-verifying parseClaimsJws()"
    }

    fn handles(&self) -> &[&str] {
        &[
            "java/missing-jwt-signature-check",
            "java.lang.security.audit.jwt-decode-without-verify",
        ]
    }

    fn requires_resolution(&self) -> bool {
        true
    }

    fn applies_to(&self, unit: &SourceUnit) -> bool {
        unit.language == Language::Java
    }

    fn locate(&self, ctx: &CodemodContext, region: Option<ByteSpan>) -> Vec<Site> {
        let Some(tree) = ctx.tree else {
            return Vec::new();
        };
        let text = ctx.text();
        let mut sites = Vec::new();

        for node in descendants(tree.root_node()) {
            if node.kind() != "method_invocation" {
                continue;
            }
            if region.is_some_and(|r| !node_span(node).touches(&r)) {
                continue;
            }
            let Some(name) = node.child_by_field_name("name") else {
                continue;
            };
            if node_text(name, text) != "parse" {
                continue;
            }
            let Some(root) = jwts_root(node, text) else {
                continue;
            };
            let receiver = node_span(root);
            match ctx.type_is(receiver, JWTS) {
                TypeMatch::No => {}
                TypeMatch::Yes | TypeMatch::Unknown => {
                    sites.push(Site::new(node_span(name)).needing(receiver))
                }
            }
        }
        sites
    }

    fn apply(&self, ctx: &CodemodContext, site: &Site) -> Result<Replacement> {
        if ctx.unit.slice(site.span) != Some("parse") {
            bail!("expected a `parse` call at {}..{}", site.span.start, site.span.end);
        }
        Ok(Replacement::new(site.span, "parseClaimsJws")
            .describe("Parse the JWT with signature verification"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemods::testing::{rewrite, sites};

    #[test]
    fn test_rewrites_parse_on_jwts_chain() {
        let text = "import io.jsonwebtoken.Jwts;\nclass A {\n  Object f(String t, byte[] k) {\n    return Jwts.parser().setSigningKey(k).parse(t);\n  }\n}\n";
        let out = rewrite(&UnverifiedJwtCodemod, "A.java", text);
        assert!(out.contains("Jwts.parser().setSigningKey(k).parseClaimsJws(t);"));
    }

    #[test]
    fn test_parser_builder_chain() {
        let text = "import io.jsonwebtoken.*;\nclass A {\n  Object f(String t, byte[] k) {\n    return Jwts.parserBuilder().setSigningKey(k).build().parse(t);\n  }\n}\n";
        let out = rewrite(&UnverifiedJwtCodemod, "A.java", text);
        assert!(out.contains(".build().parseClaimsJws(t);"));
    }

    #[test]
    fn test_unrelated_parse_calls_ignored() {
        let text = "class A {\n  int f(String s) {\n    return Integer.parseInt(s) + new Parser().parse(s);\n  }\n}\n";
        assert!(sites(&UnverifiedJwtCodemod, "A.java", text).is_empty());
    }
}
