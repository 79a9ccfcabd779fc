pub mod common;
pub mod compound;
pub mod count_session;
pub mod filter;
pub mod instance;
pub mod search;
pub mod transaction;
pub mod user_context;

pub use common::*;
pub use compound::*;
pub use count_session::*;
pub use filter::*;
pub use instance::*;
pub use search::*;
pub use transaction::*;
pub use user_context::*;
