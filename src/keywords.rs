//! Word-frequency and keyword-occurrence utilities over plain text.

use crate::error::{Result, ScholarError};
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// Marker of the line that lists keywords in a synthesis report.
pub const KEYWORD_MARKER: &str = "**Keyword(s)**";

/// Lowercased words longer than three characters, with their counts.
pub fn word_frequencies(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for word in text.to_lowercase().split_whitespace() {
        if word.chars().count() > 3 {
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Every whitespace-separated token, case preserved.
pub fn token_counts(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for token in text.split_whitespace() {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Keywords from every `**Keyword(s)**: a, b, c` line, lowercased and
/// deduplicated.
pub fn parse_keyword_lines(text: &str) -> Option<BTreeSet<String>> {
    let mut found = false;
    let mut keywords = BTreeSet::new();

    for line in text.lines().filter(|l| l.contains(KEYWORD_MARKER)) {
        found = true;
        let Some((_, list)) = line.split_once(':') else {
            continue;
        };
        keywords.extend(
            list.split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
    }

    found.then_some(keywords)
}

/// Case-insensitive whole-word occurrences of each keyword.
pub fn count_keywords<'a, I>(text: &str, keywords: I) -> Result<BTreeMap<String, usize>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut counts = BTreeMap::new();
    for keyword in keywords {
        let pattern = format!(r"\b{}\b", regex::escape(&keyword.to_lowercase()));
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ScholarError::Parse(format!("Bad keyword pattern '{}': {}", keyword, e)))?;
        counts.insert(keyword.clone(), re.find_iter(text).count());
    }
    Ok(counts)
}

/// Write `value` as JSON indented by four spaces.
fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    std::fs::write(path, buf)?;
    Ok(())
}

/// Count the keywords listed in `input` across `input` itself and write the
/// counts to `output`.
pub fn run_keyword_count(input: &Path, output: &Path) -> Result<BTreeMap<String, usize>> {
    if !input.is_file() {
        return Err(ScholarError::Config(format!(
            "Input file {} not found",
            input.display()
        )));
    }

    let bytes = std::fs::read(input)?;
    let text = String::from_utf8_lossy(&bytes);

    let keywords = parse_keyword_lines(&text).ok_or_else(|| {
        ScholarError::Parse(format!("No '{}' line found in the input file", KEYWORD_MARKER))
    })?;
    println!("Found keywords: {:?}", keywords);

    if text.trim().is_empty() {
        return Err(ScholarError::Parse(format!(
            "No text content found in input file '{}'",
            input.display()
        )));
    }

    let counts = count_keywords(&text, &keywords)?;
    write_json_pretty(output, &counts)?;
    println!("Keyword counts saved to {}", output.display());
    info!(keywords = counts.len(), output = %output.display(), "Keyword counts written");
    Ok(counts)
}

/// Word frequencies of `input`, written as JSON to `output`. With `raw`,
/// every token counts and case is kept.
pub fn run_word_frequencies(input: &Path, output: &Path, raw: bool) -> Result<BTreeMap<String, usize>> {
    let bytes = std::fs::read(input)?;
    let text = String::from_utf8_lossy(&bytes);

    let counts = if raw {
        token_counts(&text)
    } else {
        word_frequencies(&text)
    };
    write_json_pretty(output, &counts)?;
    info!(words = counts.len(), output = %output.display(), "Word frequencies written");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_word_frequencies_filters_short_words() {
        let counts = word_frequencies("The Model and the MODEL learn data fast");
        assert_eq!(counts.get("model"), Some(&2));
        assert_eq!(counts.get("learn"), Some(&1));
        assert_eq!(counts.get("data"), Some(&1));
        assert_eq!(counts.get("fast"), Some(&1));
        assert_eq!(counts.get("the"), None);
        assert_eq!(counts.get("and"), None);
    }

    #[test]
    fn test_token_counts_keep_case() {
        let counts = token_counts("a A a b");
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("A"), Some(&1));
    }

    #[test]
    fn test_parse_keyword_lines() {
        let text = "Intro\n**Keyword(s)**: ChatGPT, Writing , ,chatgpt\nmore\n- **Keyword(s)**: Feedback";
        let keywords = parse_keyword_lines(text).expect("marker present");
        let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();
        assert_eq!(keywords, vec!["chatgpt", "feedback", "writing"]);
        assert!(parse_keyword_lines("no marker").is_none());
    }

    #[test]
    fn test_count_keywords_word_bounded() -> Result<()> {
        let keywords: BTreeSet<String> = ["ai".to_string(), "c++".to_string()].into_iter().collect();
        let counts = count_keywords("AI and ai, but not maid. c++ rules", &keywords)?;
        assert_eq!(counts["ai"], 2);
        // `\b` after `+` needs a following word char, so "c++ " does not match
        assert_eq!(counts["c++"], 0);
        Ok(())
    }

    #[test]
    fn test_run_keyword_count_writes_four_space_json() -> Result<()> {
        let dir = TempDir::new()?;
        let input = dir.path().join("report.txt");
        let output = dir.path().join("counts.json");
        std::fs::write(
            &input,
            "**Keyword(s)**: writing, feedback\nWriting matters. Feedback on writing helps.",
        )?;

        let counts = run_keyword_count(&input, &output)?;
        assert_eq!(counts["writing"], 3);
        assert_eq!(counts["feedback"], 2);

        let written = std::fs::read_to_string(&output)?;
        assert_eq!(written, "{\n    \"feedback\": 2,\n    \"writing\": 3\n}");
        Ok(())
    }

    #[test]
    fn test_run_keyword_count_failures() -> Result<()> {
        let dir = TempDir::new()?;
        let output = dir.path().join("out.json");

        assert!(run_keyword_count(&dir.path().join("missing.txt"), &output).is_err());

        let no_marker = dir.path().join("plain.txt");
        std::fs::write(&no_marker, "just text")?;
        assert!(run_keyword_count(&no_marker, &output).is_err());

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "")?;
        assert!(run_keyword_count(&empty, &output).is_err());
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn test_run_word_frequencies() -> Result<()> {
        let dir = TempDir::new()?;
        let input = dir.path().join("in.txt");
        let output = dir.path().join("freq.json");
        std::fs::write(&input, "Learning learning tools")?;

        let counts = run_word_frequencies(&input, &output, false)?;
        assert_eq!(counts["learning"], 2);
        let parsed: BTreeMap<String, usize> =
            serde_json::from_str(&std::fs::read_to_string(&output)?)?;
        assert_eq!(parsed, counts);
        Ok(())
    }
}
