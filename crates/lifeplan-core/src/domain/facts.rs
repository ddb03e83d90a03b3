//! Facts normalizer (C7): template-specific fact derivation applied before
//! eligibility evaluation.

use serde_json::Value;

/// Derive template-specific facts, returning a new fact object.
///
/// For `birth_de/*` templates, derives `child_insurance_kind` from
/// `public_insurance`/`private_insurance` unless a caller has already
/// supplied a definite (`gkv`/`pkv`) value.
pub fn normalize_facts(template_key: &str, facts: &Value) -> Value {
    let mut out = facts.as_object().cloned().unwrap_or_default();

    if template_key.starts_with("birth_de/") {
        derive_child_insurance_kind(&mut out);
    }

    Value::Object(out)
}

fn derive_child_insurance_kind(facts: &mut serde_json::Map<String, Value>) {
    let current = facts.get("child_insurance_kind").and_then(Value::as_str);
    if matches!(current, Some("gkv") | Some("pkv")) {
        return;
    }

    let public = facts.get("public_insurance").and_then(Value::as_bool);
    let private = facts.get("private_insurance").and_then(Value::as_bool);

    let derived = match (public, private) {
        (Some(true), Some(false)) => "gkv",
        (Some(false), Some(true)) => "pkv",
        _ => "unknown",
    };

    // gkv/pkv already excluded above; anything else (including "unknown"
    // and absence) is fair game for re-derivation.
    facts.insert(
        "child_insurance_kind".to_string(),
        Value::String(derived.to_string()),
    );
}
