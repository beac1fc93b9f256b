use regex::RegexBuilder;
use serde_json::Value;

fn stringify_param(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Substitutes every `:name` placeholder in `template` with the
/// percent-encoded parameter value. Matching is case-insensitive and a
/// placeholder with no parameter is left untouched.
pub fn resolve_uri(template: &str, params: &serde_json::Map<String, Value>) -> String {
    let mut uri = template.to_string();
    // Longest names first so `:id` never eats the prefix of `:idx`.
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    for key in keys {
        let pattern = format!(":{}", regex::escape(key));
        let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
            continue;
        };
        let encoded = urlencoding::encode(&stringify_param(&params[key])).into_owned();
        uri = re.replace_all(&uri, regex::NoExpand(&encoded)).into_owned();
    }
    uri
}
