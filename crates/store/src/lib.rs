pub mod application_store;
pub mod cache;
pub mod run_store;
pub mod settings_store;
pub mod token_store;

pub use application_store::ApplicationStore;
pub use cache::ProcessedVacancyCache;
pub use run_store::{ProgressEvent, RunStore};
pub use settings_store::SettingsStore;
pub use token_store::TokenStore;
