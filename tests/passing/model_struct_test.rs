#![allow(warnings)]

use ormbit::*;

#[derive(Model, Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    #[column(name = "email")]
    pub contact: Option<String>,
    pub score: f64,
    pub active: bool,
}

fn main() {
    let person = Person { id: None, name: "Ann".to_string(), contact: None, score: 1.5, active: true };
    assert_eq!(Person::COLUMNS, &["id", "name", "email", "score", "active"]);
    let row = person.into_row();
    assert_eq!(row.get("email"), Some(&Value::Null));
    assert_eq!(row.get("name"), Some(&Value::from("Ann")));
}
