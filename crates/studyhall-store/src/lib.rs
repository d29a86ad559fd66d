pub mod db;
pub mod error;
pub mod history;
pub mod materials;
pub mod objects;
pub mod profiles;
pub mod search;
pub mod types;

pub use error::{Result, StoreError};
pub use history::HistoryStore;
pub use materials::MaterialStore;
pub use objects::{LocalObjectStore, ObjectStore};
pub use profiles::ProfileStore;
pub use types::{ChatTurn, Material, ProcessingStatus, SearchHit, TurnRole};
