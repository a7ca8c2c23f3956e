pub mod background;
pub mod cache;
pub mod content;
pub mod domain;
pub mod messages;
pub mod observer;
pub mod page;
pub mod popup;
pub mod ports;
pub mod protocol;
pub mod render;
pub mod router;
pub mod session;
pub mod storage;

pub use domain::{
    AuthSession, BodyMeasurements, ExtensionStats, Preferences, PreferenceRecord, ProductRecord,
    ProductSnapshot, Purchase, StyleAdvice, SustainabilityMetrics, UserAccount, UserProfile,
    VerificationResult,
};
pub use ports::{
    BodyScanner, LocalStore, PortError, PortResult, ProfileRepository, RemoteResource,
    RemoteStore, StyleAdvisor, SustainabilityVerifier, TryOnModelCatalog,
};
pub use protocol::{Endpoint, ExtensionMessage, Reply};
pub use router::{MessageListener, MessageRouter, RouterError};
pub use storage::{StorageKey, SyncedStorage};
