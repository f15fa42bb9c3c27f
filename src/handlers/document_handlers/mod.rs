pub mod crud;
pub mod list;

pub use crud::{create, delete, read, update};
pub use list::list;
