use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SourceConfig;
use crate::images::{self, RejectList};
use crate::item::{NewsItem, RawItem};
use crate::relevance::is_relevant;

/// Summaries longer than this many characters are cut and get an ellipsis.
pub const SUMMARY_MAX_CHARS: usize = 150;
const ELLIPSIS: &str = "...";

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:item|entry)(?:\s[^>]*)?>(.*?)</(?:item|entry)>")
        .expect("record block regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("markup tag regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute regex")
});

/// One way of representing a field inside a record block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// `<tag><![CDATA[value]]></tag>`
    Cdata(&'static str),
    /// `<tag>value</tag>`, attributes on the opening tag allowed
    Plain(&'static str),
    /// `<tag rel="alternate" attr="value"/>`; a tag without `rel` also qualifies
    AlternateAttribute {
        tag: &'static str,
        attr: &'static str,
    },
    /// `<tag attr="value"/>`
    Attribute {
        tag: &'static str,
        attr: &'static str,
    },
}

impl FieldRule {
    /// Pull this rule's field out of `block`, or `None` when it is absent or empty.
    pub fn extract(&self, block: &str) -> Option<String> {
        let value = match *self {
            FieldRule::Cdata(tag) => element_body(block, tag).and_then(|body| {
                let inner = body.strip_prefix("<![CDATA[")?;
                let end = inner.find("]]>")?;
                Some(inner[..end].to_string())
            }),
            FieldRule::Plain(tag) => element_body(block, tag).map(str::to_string),
            FieldRule::AlternateAttribute { tag, attr } => open_tags(block, tag)
                .filter(|t| {
                    attribute(t, "rel")
                        .map_or(true, |rel| rel.trim().eq_ignore_ascii_case("alternate"))
                })
                .find_map(|t| attribute(t, attr)),
            FieldRule::Attribute { tag, attr } => {
                open_tags(block, tag).find_map(|t| attribute(t, attr))
            }
        };

        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

const TITLE_RULES: &[FieldRule] = &[FieldRule::Cdata("title"), FieldRule::Plain("title")];

const LINK_RULES: &[FieldRule] = &[
    FieldRule::Cdata("link"),
    FieldRule::Plain("link"),
    FieldRule::AlternateAttribute {
        tag: "link",
        attr: "href",
    },
    FieldRule::Attribute {
        tag: "link",
        attr: "href",
    },
];

const PUBLISHED_RULES: &[FieldRule] = &[
    FieldRule::Plain("pubDate"),
    FieldRule::Plain("published"),
    FieldRule::Plain("updated"),
    FieldRule::Plain("dc:date"),
];

const SUMMARY_RULES: &[FieldRule] = &[
    FieldRule::Cdata("description"),
    FieldRule::Plain("description"),
    FieldRule::Cdata("summary"),
    FieldRule::Plain("summary"),
    FieldRule::Cdata("content"),
    FieldRule::Plain("content"),
];

/// First value produced by `rules`, tried in order.
pub fn first_match(rules: &[FieldRule], block: &str) -> Option<String> {
    rules.iter().find_map(|rule| rule.extract(block))
}

/// Lazily extracts every well-formed record from `payload`.
///
/// Blocks without both a title and a link are skipped. Because the
/// iterator is lazy, callers that stop early never scan the rest of the
/// payload.
pub fn extract_items<'a>(
    payload: &'a str,
    reject: &'a RejectList,
) -> impl Iterator<Item = RawItem> + 'a {
    BLOCK_RE
        .captures_iter(payload)
        .filter_map(move |caps| extract_item(caps.get(1)?.as_str(), reject))
}

pub fn extract_item(block: &str, reject: &RejectList) -> Option<RawItem> {
    let title = first_match(TITLE_RULES, block)
        .map(|t| clean_text(&t))
        .filter(|t| !t.is_empty())?;
    let link = first_match(LINK_RULES, block)
        .map(|l| html_escape::decode_html_entities(&l).trim().to_string())
        .filter(|l| !l.is_empty())?;

    let description = first_match(SUMMARY_RULES, block).unwrap_or_default();
    let published_at = first_match(PUBLISHED_RULES, block).unwrap_or_default();
    let inline_image = images::inline_image(block, &description, reject);

    Some(RawItem {
        title,
        link,
        published_at,
        summary: clean_text(&description),
        inline_image,
    })
}

/// Turns one source's payload into at most `cap` relevant items.
pub fn parse_source(
    payload: &str,
    source: &SourceConfig,
    cap: usize,
    reject: &RejectList,
) -> Vec<NewsItem> {
    extract_items(payload, reject)
        .filter(|item| is_relevant(&source.keywords, &item.title, &item.summary))
        .take(cap)
        .map(|item| NewsItem {
            summary: truncate_summary(&item.summary),
            image: item.inline_image.unwrap_or_default(),
            title: item.title,
            link: item.link,
            published_at: item.published_at,
            source: source.name.clone(),
            category: source.category,
        })
        .collect()
}

/// Unescapes entities, strips markup and collapses whitespace.
pub fn clean_text(markup: &str) -> String {
    // Decode before stripping so escaped markup (`&lt;p&gt;`) is removed too.
    let decoded = html_escape::decode_html_entities(markup);
    let stripped = TAG_RE.replace_all(&decoded, " ");
    let text = html_escape::decode_html_entities(&stripped).replace('\u{a0}', " ");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

pub fn truncate_summary(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((idx, _)) => format!("{}{}", text[..idx].trim_end(), ELLIPSIS),
        None => text.to_string(),
    }
}

/// Trimmed body of the first non-self-closing `<tag>` element.
fn element_body<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let (_, open_end) =
        open_tag_spans(block, tag).find(|&(start, end)| !block[start..end].ends_with("/>"))?;
    let len = find_close_tag(&block[open_end..], tag)?;
    Some(block[open_end..open_end + len].trim())
}

/// Byte offset of the first `</tag>` in `text`, matched case-insensitively.
fn find_close_tag(text: &str, tag: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find("</") {
        let start = offset + pos;
        let name_end = start + 2 + tag.len();
        let named = text
            .get(start + 2..name_end)
            .is_some_and(|n| n.eq_ignore_ascii_case(tag));
        if named && text[name_end..].starts_with('>') {
            return Some(start);
        }
        offset = start + 2;
    }
    None
}

/// Byte spans of every opening `<name ...>` tag, matched case-insensitively.
fn open_tag_spans<'a>(text: &'a str, name: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    let mut offset = 0;
    std::iter::from_fn(move || {
        while let Some(pos) = text[offset..].find('<') {
            let start = offset + pos;
            let name_end = start + 1 + name.len();
            let named = text
                .get(start + 1..name_end)
                .is_some_and(|n| n.eq_ignore_ascii_case(name));

            if named {
                let after = &text[name_end..];
                if after.starts_with(|c: char| c == '>' || c == '/' || c.is_whitespace()) {
                    let close = after.find('>')?;
                    let end = name_end + close + 1;
                    offset = end;
                    return Some((start, end));
                }
            }
            offset = start + 1;
        }
        None
    })
}

/// Every opening `<name ...>` tag in `text`, including its angle brackets.
pub(crate) fn open_tags<'a>(text: &'a str, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    open_tag_spans(text, name).map(move |(start, end)| &text[start..end])
}

/// Value of attribute `name` on an opening tag, quotes removed.
pub(crate) fn attribute(tag: &str, name: &str) -> Option<String> {
    ATTR_RE
        .captures_iter(tag)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
}
