//! External collaborators (§6): traits for everything `clout-core` needs
//! but does not itself implement authoritatively, plus reference
//! implementations suitable for tests and small deployments.

pub mod blob_store;
pub mod notary;
pub mod persistence;
pub mod sybil;
pub mod transport;

pub use blob_store::{BlobMetadata, BlobStorePort, FsBlobStore, InMemoryBlobStore};
pub use notary::{MockNotary, NotaryPort};
pub use persistence::{sections, InMemoryPersistence, JsonFilePersistence, PersistencePort};
pub use sybil::{MockSybilIssuer, SybilIssuerPort};
pub use transport::{InMemoryTransport, TransportPort};
