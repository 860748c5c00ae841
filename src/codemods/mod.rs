pub mod registry;
pub mod secure_random;
pub mod sslcontext_tls;
pub mod traits;
pub mod unverified_jwt;
pub mod verb_tampering;

pub use registry::{default_registry, CodemodRegistry};
pub use traits::{Codemod, CodemodContext, CodemodSelection, Replacement, Site};
