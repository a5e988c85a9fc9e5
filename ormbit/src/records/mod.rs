pub mod array;
pub mod inject;
pub mod set;

pub use array::RecordsArray;
pub use inject::inject_has_many;
pub use set::RecordsSet;
