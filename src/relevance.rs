/// Returns true when `title` plus `summary` mention any of `keywords`.
///
/// Matching is a case-insensitive substring test. An empty keyword list
/// accepts everything.
pub fn is_relevant(keywords: &[String], title: &str, summary: &str) -> bool {
    if keywords.is_empty() {
        return true;
    }

    let text = format!("{}{}", title, summary).to_lowercase();
    keywords
        .iter()
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}
