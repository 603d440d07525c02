use crate::backend::Row;

/// Build a result row from name/value pairs.
pub(crate) fn named_row(pairs: &[(&str, serde_json::Value)]) -> Row {
    let mut row = Row::new();
    for (name, value) in pairs {
        row.insert(name.to_string(), value.clone());
    }
    row
}
