pub mod alias;
pub mod condition;
pub mod db_select;
pub mod join;
pub mod orm_select;

pub use condition::{Condition, Operand, Operator};
pub use db_select::{DbSelect, Direction, NullsPosition, OrderBy, OrderTarget, SelectColumn};
pub use join::{JoinConfig, JoinType};
pub use orm_select::{Contain, OrmSelect};
