#![allow(warnings)]

use ormbit::*;

#[derive(Model)]
struct TransientAnnotationStruct {
    id: i64,
    foo: String,
    #[transient]
    cached: Vec<String>,
}

fn main() {
    let value = TransientAnnotationStruct { id: 1, foo: "foo".to_string(), cached: vec![] };
    let row = value.into_row();
    assert_eq!(row.len(), 2);
    assert!(!row.contains_key("cached"));
}
