use crate::core::error::FatalError;

use super::traits::{Codemod, CodemodSelection};

/// Read-only catalog of codemods. Registration order is the final tie-breaker
/// when ordering matches, so it is part of the output contract.
pub struct CodemodRegistry {
    codemods: Vec<Box<dyn Codemod>>,
}

impl CodemodRegistry {
    pub fn new(codemods: Vec<Box<dyn Codemod>>) -> Self {
        Self { codemods }
    }

    pub fn len(&self) -> usize {
        self.codemods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codemods.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Codemod> {
        self.codemods.get(index).map(|c| c.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Codemod> {
        self.codemods.iter().map(|c| c.as_ref())
    }

    pub fn find(&self, id: &str) -> Option<&dyn Codemod> {
        self.iter().find(|c| c.id() == id)
    }

    /// Registration indices of the codemods a selection enables.
    pub fn select(&self, selection: &CodemodSelection) -> Result<Vec<usize>, FatalError> {
        if let Some(unknown) = selection.exceptions.iter().find(|id| self.find(id).is_none()) {
            return Err(FatalError::InvalidSelection(unknown.clone()));
        }
        Ok(self
            .codemods
            .iter()
            .enumerate()
            .filter(|(_, c)| selection.is_enabled(c.id()))
            .map(|(i, _)| i)
            .collect())
    }
}

pub fn default_registry() -> CodemodRegistry {
    let codemods: Vec<Box<dyn Codemod>> = vec![
        Box::new(super::secure_random::SecureRandomCodemod),
        Box::new(super::sslcontext_tls::SslContextTlsCodemod),
        Box::new(super::unverified_jwt::UnverifiedJwtCodemod),
        Box::new(super::verb_tampering::VerbTamperingCodemod),
    ];
    CodemodRegistry::new(codemods)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_finds_codemods() {
        let registry = default_registry();
        assert_eq!(registry.len(), 4);
        assert!(registry.find("pixee:java/secure-random").is_some());
        assert!(registry.find("pixee:java/verb-tampering-jakarta").is_some());
        assert!(registry.find("unknown").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = default_registry();
        let mut ids: Vec<&str> = registry.iter().map(|c| c.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), registry.len());
    }

    #[test]
    fn test_select_keeps_registration_order() {
        let registry = default_registry();
        let all = registry.select(&CodemodSelection::all()).unwrap();
        assert_eq!(all, vec![0, 1, 2, 3]);

        let only = registry
            .select(&CodemodSelection::only(["pixee:java/verb-tampering-jakarta"]))
            .unwrap();
        assert_eq!(only, vec![3]);
    }

    #[test]
    fn test_unknown_exception_is_fatal() {
        let registry = default_registry();
        let err = registry
            .select(&CodemodSelection::only(["pixee:java/nope"]))
            .unwrap_err();
        assert!(matches!(err, FatalError::InvalidSelection(id) if id == "pixee:java/nope"));
    }
}
