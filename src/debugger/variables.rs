//! Turning runtime variable replies into `Runtime.getProperties` results.

use serde_json::{Value, json};

use crate::symbols::VariableInfo;

const BACKING_FIELD_MARKER: &str = "k__BackingField";

/// Recover the source name of a compiler-generated member.
///
/// `<Name>k__BackingField` (auto-property backing field) and `<name>5__1`
/// (local lifted into an async state machine) both become the bare name.
pub fn clean_member_name(name: &str) -> String {
    if name.contains(BACKING_FIELD_MARKER) {
        return name
            .replace(BACKING_FIELD_MARKER, "")
            .replace(['<', '>'], "");
    }
    match name.find('>') {
        Some(end) if end > 0 && name.starts_with('<') => name[1..end].to_owned(),
        _ => name.to_owned(),
    }
}

/// Fill in `description` from `value` when the runtime left it out.
pub fn backfill_description(value: &mut Value) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    if object.get("description").is_some_and(|d| !d.is_null()) {
        return;
    }
    let description = match object.get("value") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => return,
        Some(other) => other.to_string(),
    };
    object.insert("description".into(), Value::String(description));
}

fn property(name: String, entry: Option<&Value>) -> Value {
    let mut value = entry
        .and_then(|entry| entry.get("value"))
        .cloned()
        .unwrap_or(Value::Null);
    backfill_description(&mut value);
    json!({ "name": name, "value": value })
}

/// Zip a flat `[{name}, {value}, {name}, {value}, ...]` reply into properties.
pub fn zip_pairs(values: &[Value], clean_names: bool) -> Vec<Value> {
    values
        .chunks(2)
        .map(|pair| {
            let name = pair[0]
                .get("name")
                .map(value_to_name)
                .unwrap_or_default();
            let name = if clean_names {
                clean_member_name(&name)
            } else {
                name
            };
            property(name, pair.get(1))
        })
        .collect()
}

/// Zip a scope reply into properties.
///
/// The first entries are the values of `vars`, one `{value}` each and named by
/// the symbol data. Anything after them is locals lifted into generated fields
/// (and `this`), reported as name/value pairs.
pub fn zip_scope(vars: &[VariableInfo], values: &[Value]) -> Vec<Value> {
    let named = vars.len().min(values.len());
    let mut properties: Vec<Value> = vars
        .iter()
        .zip(values)
        .map(|(var, entry)| property(var.name.clone(), Some(entry)))
        .collect();
    properties.extend(zip_pairs(&values[named..], true));
    properties
}

fn value_to_name(name: &Value) -> String {
    match name {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}
