pub mod cache;
pub mod memory;
pub mod postgres;
pub mod rest;
pub mod traits;
pub mod undo;

pub use cache::*;
pub use memory::*;
pub use postgres::*;
pub use rest::*;
pub use traits::*;
pub use undo::*;
