pub mod auth;
pub mod consistency;
pub mod count_session;
pub mod inventory;
pub mod saved_searches;
pub mod search;
pub mod stock;
pub mod transaction_engine;
pub mod units;

pub use auth::AuthService;
pub use consistency::{ConsistencyIssue, ConsistencyReport, IssueType};
pub use inventory::{AppliedTransaction, Inventory, StockReport};
pub use saved_searches::SavedSearchStore;
pub use search::CompoundView;
pub use units::Unit;
