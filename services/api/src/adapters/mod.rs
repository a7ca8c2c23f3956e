pub mod db;
pub mod memory;
pub mod style_llm;

pub use db::DbAdapter;
pub use memory::MemoryRepository;
pub use style_llm::OpenAiStyleAdapter;
