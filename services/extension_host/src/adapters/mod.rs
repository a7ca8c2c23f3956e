pub mod backend;
pub mod catalog;
pub mod file_store;
pub mod http_store;
pub mod scanner;
pub mod verifier;

pub use backend::BackendClient;
pub use catalog::CatalogModels;
pub use file_store::FileLocalStore;
pub use http_store::HttpRemoteStore;
pub use scanner::UnconfiguredScanner;
pub use verifier::CatalogVerifier;
