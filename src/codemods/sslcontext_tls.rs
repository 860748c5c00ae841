use anyhow::Result;

use super::traits::{Codemod, CodemodContext, Replacement, Site, TypeMatch};
use crate::model::parser::{descendants, node_span, node_text};
use crate::model::source::{Language, SourceUnit};
use crate::model::span::ByteSpan;

const SSL_CONTEXT: &str = "javax.net.ssl.SSLContext";
const WEAK_PROTOCOLS: &[&str] = &["SSL", "SSLv2", "SSLv3", "TLS", "TLSv1", "TLSv1.1"];
const SAFE_PROTOCOL: &str = "\"TLSv1.2\"";

/// Pins `SSLContext.getInstance(..)` calls asking for a legacy protocol to TLS 1.2.
pub struct SslContextTlsCodemod;

impl Codemod for SslContextTlsCodemod {
    fn id(&self) -> &str {
        "pixee:java/upgrade-sslcontext-tls"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn summary(&self) -> &str {
        "Upgrade SSLContext.getInstance() to TLSv1.2"
    }

    fn handles(&self) -> &[&str] {
        &["java/weak-ssl-protocol"]
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
            if node.kind() != "method_invocation" {
                continue;
            }
            if region.is_some_and(|r| !node_span(node).touches(&r)) {
                continue;
            }
            let name = node.child_by_field_name("name").map(|n| node_text(n, text));
            if name != Some("getInstance") {
                continue;
            }
            let Some(object) = node.child_by_field_name("object") else {
                continue;
            };
            let Some(protocol) = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0))
                .filter(|arg| arg.kind() == "string_literal")
            else {
                continue;
            };
            let literal = node_text(protocol, text);
            let value = literal.trim_matches('"');
            if !WEAK_PROTOCOLS.contains(&value) {
                continue;
            }

            let receiver = node_span(object);
            match ctx.type_is(receiver, SSL_CONTEXT) {
                TypeMatch::No => {}
                TypeMatch::Yes | TypeMatch::Unknown => {
                    sites.push(Site::new(node_span(protocol)).needing(receiver))
                }
            }
        }
        sites
    }

    fn apply(&self, ctx: &CodemodContext, site: &Site) -> Result<Replacement> {
        let current = ctx.unit.slice(site.span).unwrap_or_default();
        Ok(Replacement::new(site.span, SAFE_PROTOCOL)
            .describe(format!("Replaced protocol {} with {}", current, SAFE_PROTOCOL)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemods::testing::{rewrite, sites};

    #[test]
    fn test_upgrades_weak_protocols() {
        let text = "import javax.net.ssl.SSLContext;\nclass A {\n  void f() throws Exception {\n    SSLContext a = SSLContext.getInstance(\"SSL\");\n    SSLContext b = SSLContext.getInstance(\"TLSv1.3\");\n  }\n}\n";
        let out = rewrite(&SslContextTlsCodemod, "A.java", text);
        assert!(out.contains("SSLContext.getInstance(\"TLSv1.2\");"));
        assert!(out.contains("SSLContext.getInstance(\"TLSv1.3\");"));
    }

    #[test]
    fn test_other_get_instance_ignored() {
        let text = "import java.security.MessageDigest;\nclass A {\n  void f() throws Exception {\n    MessageDigest.getInstance(\"SSL\");\n  }\n}\n";
        assert!(sites(&SslContextTlsCodemod, "A.java", text).is_empty());
    }

    #[test]
    fn test_region_limits_sites() {
        let text = "import javax.net.ssl.*;\nclass A {\n  void f() throws Exception {\n    SSLContext.getInstance(\"SSL\");\n    SSLContext.getInstance(\"TLS\");\n  }\n}\n";
        let unit = crate::codemods::testing::unit("A.java", text);
        let symbols = crate::model::symbols::SymbolTable::build(std::slice::from_ref(&unit));
        let ctx = CodemodContext::new(&unit, &symbols);
        let second = text.find("SSLContext.getInstance(\"TLS\")").unwrap();
        let found = SslContextTlsCodemod.locate(&ctx, Some(ByteSpan::new(second, second + 10)));
        assert_eq!(found.len(), 1);
        assert_eq!(unit.slice(found[0].span), Some("\"TLS\""));
    }
}
