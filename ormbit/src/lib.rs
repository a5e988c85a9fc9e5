//! ormbit maps relational tables onto declaratively registered structures and gives every row
//! a [`Record`] that tracks the state of each of its values.
//!
//! Tables are registered once (with `inventory::submit!` of a [`TableDef`] or at runtime with
//! [`register_table`]) and their [`TableStructure`] is built lazily on first use. Storage is
//! reached only through the [`Connection`] trait; [`MemoryConnection`] keeps rows in memory.
//!

#[macro_use]
pub mod logger;
#[macro_use]
pub mod macro_rules;

pub mod column;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod record;
pub mod record_value;
pub mod records;
pub mod registry;
pub mod relation;
pub mod select;
pub mod structure;
pub mod table;
pub mod value;

extern crate self as ormbit;

pub use chrono;
pub use column::{Column, ColumnType};
pub use config::{install_settings, load_settings, settings, OrmSettings};
pub use connection::{register_connection, ColumnDescription, Connection, MemoryConnection, Statement, TableDescription, WriteResult};
pub use error::{NotSetReason, OrmError, OrmResult, ValidationError, ValidationErrors};
pub use indexmap;
pub use inventory;
pub use macros::Model;
pub use model::{FromRecord, IntoRow};
pub use once_cell;
pub use record::{Projection, Record, Related};
pub use record_value::RecordValue;
pub use records::{RecordsArray, RecordsSet};
pub use registry::{register_table, TableDef};
pub use relation::{Relation, RelationType};
pub use select::{Condition, Contain, Direction, JoinType, NullsPosition, OrderBy, OrmSelect};
pub use serde_json;
pub use structure::{RecordHooks, StructureBuilder, TableStructure};
pub use table::Table;
pub use value::{DbExpr, FromValue, Row, Value};
