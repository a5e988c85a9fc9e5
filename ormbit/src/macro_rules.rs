/// Builds a [`Row`](crate::Row) from `"key" => value` pairs, converting values with `Value::from`.
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $(
            row.insert(($key).to_string(), $crate::Value::from($value));
        )+
        row
    }};
}
