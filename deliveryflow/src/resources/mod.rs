//! Shared pipeline resources: the encryption key, the artifact store and
//! the development account setup that creates them.

mod key;
mod setup;
mod store;

pub use key::{EncryptionKey, ARTIFACT_KEY_ALIAS};
pub use setup::{DevAccountSetup, SourceRepository};
pub use store::{ArtifactStore, RemovalPolicy, DEFAULT_RETAINED_VERSIONS};
