use anyhow::Result;

use super::traits::{Codemod, CodemodContext, Replacement, Site, TypeMatch};
use crate::model::parser::{descendants, node_span, node_text};
use crate::model::source::{Language, SourceUnit};
use crate::model::span::ByteSpan;

const WEAK_PRNG: &str = "java.util.Random";
const SECURE_PRNG: &str = "java.security.SecureRandom";

/// Replaces `new Random()` with `new java.security.SecureRandom()`.
///
/// Only argument-less constructions are rewritten: a seeded `Random` is
/// usually deliberate, and an anonymous subclass cannot change its base.
pub struct SecureRandomCodemod;

impl Codemod for SecureRandomCodemod {
    fn id(&self) -> &str {
        "pixee:java/secure-random"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn summary(&self) -> &str {
        "Replace java.util.Random with java.security.SecureRandom"
    }

    fn handles(&self) -> &[&str] {
        &["java/insecure-randomness", "pixee:java/secure-random"]
    }

    fn scans(&self) -> bool {
        true
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
            if node.kind() != "object_creation_expression" {
                continue;
            }
            if region.is_some_and(|r| !node_span(node).touches(&r)) {
                continue;
            }
            let no_args = node
                .child_by_field_name("arguments")
                .is_some_and(|args| args.named_child_count() == 0);
            let mut cursor = node.walk();
            let anonymous = node.children(&mut cursor).any(|c| c.kind() == "class_body");
            if !no_args || anonymous {
                continue;
            }
            let Some(ty) = node.child_by_field_name("type") else {
                continue;
            };
            let written = node_text(ty, text);
            if written != "Random" && written != WEAK_PRNG {
                continue;
            }

            let span = node_span(ty);
            match ctx.type_is(span, WEAK_PRNG) {
                TypeMatch::No => {}
                TypeMatch::Yes | TypeMatch::Unknown => sites.push(Site::new(span).needing(span)),
            }
        }
        sites
    }

    fn apply(&self, _ctx: &CodemodContext, site: &Site) -> Result<Replacement> {
        Ok(Replacement::new(site.span, SECURE_PRNG)
            .describe("Switched to a cryptographically strong random number generator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemods::testing::{rewrite, sites};

    #[test]
    fn test_rewrites_unseeded_random() {
        let text = "import java.util.Random;\nclass A {\n  Random r = new Random();\n  Random s = new Random(42L);\n}\n";
        let out = rewrite(&SecureRandomCodemod, "A.java", text);
        assert!(out.contains("new java.security.SecureRandom();"));
        assert!(out.contains("new Random(42L)"));
    }

    #[test]
    fn test_fully_qualified_random_is_rewritten() {
        let text = "class A { Object r = new java.util.Random(); }\n";
        let out = rewrite(&SecureRandomCodemod, "A.java", text);
        assert_eq!(out, "class A { Object r = new java.security.SecureRandom(); }\n");
    }

    #[test]
    fn test_project_random_is_left_alone() {
        let text = "package p;\nclass Random {}\nclass A { Object r = new Random(); }\n";
        assert!(sites(&SecureRandomCodemod, "p/A.java", text).is_empty());
    }

    #[test]
    fn test_unresolved_random_still_reports_site() {
        let text = "import com.vendor.*;\nclass A { Object r = new Random(); }\n";
        let found = sites(&SecureRandomCodemod, "A.java", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].needs, vec![found[0].span]);
    }
}
