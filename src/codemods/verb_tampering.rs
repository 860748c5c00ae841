use anyhow::{Context, Result};
use regex::Regex;

use super::traits::{Codemod, CodemodContext, Replacement, Site};
use crate::model::source::{Language, SourceUnit};
use crate::model::span::ByteSpan;

const HTTP_METHOD: &str = r"(?ms)<http-method(\s*)>[a-zA-Z\s*]+</http-method>";

/// Removes `<http-method>` restrictions from `web.xml` security constraints,
/// so the constraint covers every HTTP verb.
pub struct VerbTamperingCodemod;

impl Codemod for VerbTamperingCodemod {
    fn id(&self) -> &str {
        "pixee:java/verb-tampering-jakarta"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn summary(&self) -> &str {
        "Remove <http-method> entries from web.xml security constraints"
    }

    fn handles(&self) -> &[&str] {
        &["pixee:java/verb-tampering-jakarta"]
    }

    fn scans(&self) -> bool {
        true
    }

    fn applies_to(&self, unit: &SourceUnit) -> bool {
        unit.language == Language::Xml
            && unit
                .file_name()
                .is_some_and(|name| name.eq_ignore_ascii_case("web.xml"))
    }

    fn locate(&self, ctx: &CodemodContext, region: Option<ByteSpan>) -> Vec<Site> {
        let Ok(pattern) = Regex::new(HTTP_METHOD) else {
            return Vec::new();
        };
        pattern
            .find_iter(ctx.text())
            .map(|m| ByteSpan::new(m.start(), m.end()))
            .filter(|span| region.map_or(true, |r| span.touches(&r)))
            .map(Site::new)
            .collect()
    }

    fn apply(&self, ctx: &CodemodContext, site: &Site) -> Result<Replacement> {
        let removed = ctx
            .unit
            .slice(site.span)
            .context("site outside the file")?;
        Ok(Replacement::new(site.span, "").describe(format!("Removed {}", removed.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemods::testing::{rewrite, unit};

    const WEB_XML: &str = "<web-app>\n  <security-constraint>\n    <web-resource-collection>\n      <url-pattern>/admin/*</url-pattern>\n      <http-method>GET</http-method>\n      <http-method >POST</http-method>\n    </web-resource-collection>\n  </security-constraint>\n</web-app>\n";

    #[test]
    fn test_removes_http_methods() {
        let out = rewrite(&VerbTamperingCodemod, "WEB-INF/web.xml", WEB_XML);
        assert!(!out.contains("http-method"));
        assert!(out.contains("<url-pattern>/admin/*</url-pattern>"));
    }

    #[test]
    fn test_only_web_xml_applies() {
        assert!(VerbTamperingCodemod.applies_to(&unit("WEB-INF/WEB.XML", WEB_XML)));
        assert!(!VerbTamperingCodemod.applies_to(&unit("pom.xml", WEB_XML)));
    }
}
