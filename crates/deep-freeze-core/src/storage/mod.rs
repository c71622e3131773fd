pub mod models;
pub mod queries;
pub mod roots;
pub mod sqlite;

pub use queries::DiscardedWork;
pub use roots::NewClientRoot;
pub use sqlite::{Database, Tx};
