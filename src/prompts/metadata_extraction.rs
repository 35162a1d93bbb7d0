//! Bibliographic metadata extraction prompt.

/// Bumped whenever the wording below changes.
pub const PROMPT_VERSION: &str = "metadata-extraction/v1";

/// Placeholders: {fields}, {keys}, {example}
pub const METADATA_PROMPT_TEMPLATE: &str = r#"Extract {fields} from the text.
Return the result in valid JSON format with the following keys: {keys}.
If a field is not found, leave it as an empty string.

Example format:
{example}"#;

/// Description and example value per known key.
const KEY_HINTS: &[(&str, &str, &str)] = &[
    ("Title", "the title", "Sample Title"),
    ("Author", "author(s)", "John Doe"),
    ("Publication", "publication", "Journal of Sample Research"),
    ("Year", "year of publication", "2023"),
    ("Publisher", "the publisher", "Sample Publisher"),
    ("Abstract", "abstract", "Abstract text"),
];

fn hint_for(key: &str) -> (String, String) {
    KEY_HINTS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, desc, sample)| (desc.to_string(), sample.to_string()))
        .unwrap_or_else(|| (key.to_lowercase(), format!("Sample {}", key)))
}

/// Render the extraction prompt for `keys`, followed by the page text.
pub fn build_metadata_prompt(keys: &[&str], text: &str) -> String {
    let descriptions: Vec<String> = keys.iter().map(|k| hint_for(k).0).collect();
    let fields = match descriptions.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => String::new(),
    };

    let mut example = serde_json::Map::new();
    for key in keys {
        example.insert(key.to_string(), serde_json::Value::from(hint_for(key).1));
    }
    let example = serde_json::to_string_pretty(&serde_json::Value::Object(example))
        .unwrap_or_else(|_| "{}".to_string());

    let prompt = METADATA_PROMPT_TEMPLATE
        .replace("{fields}", &fields)
        .replace("{keys}", &keys.join(", "))
        .replace("{example}", &example);

    format!("{}\n\n{}", prompt, text)
}
