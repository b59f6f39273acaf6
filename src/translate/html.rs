//! Markup-preserving translation of HTML field content.

use std::sync::OnceLock;

use regex::Regex;

use super::{
    TranslationSession,
    Translator,
};

/// Elements whose text is never translated.
const OPAQUE_ELEMENTS: &[&str] = &["script", "style", "head", "title", "meta"];

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("markup pattern is valid"))
}

/// Lower-cased element name and whether the tag closes an element.
fn tag_name(tag: &str) -> (String, bool) {
    let inner = tag.trim_start_matches('<');
    let closing = inner.starts_with('/');
    let name = inner
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    (name, closing)
}

fn is_void(tag: &str, name: &str) -> bool {
    tag.ends_with("/>") || name == "meta"
}

/// Translates every non-blank text node outside comments and opaque elements.
/// Tags are emitted unchanged and the whitespace around each text node is
/// kept.
pub fn translate_html<T: Translator>(html: &str, session: &TranslationSession<T>) -> String {
    if html.trim().is_empty() {
        return html.to_string();
    }

    let mut output = String::with_capacity(html.len());
    let mut opaque: Option<String> = None;
    let mut cursor = 0;

    for markup in markup_regex().find_iter(html) {
        push_text(&mut output, &html[cursor..markup.start()], opaque.is_some(), session);
        let tag = markup.as_str();
        output.push_str(tag);
        cursor = markup.end();

        if tag.starts_with("<!--") {
            continue;
        }
        let (name, closing) = tag_name(tag);
        if closing && opaque.as_deref() == Some(name.as_str()) {
            opaque = None;
        } else if opaque.is_none()
            && !closing
            && OPAQUE_ELEMENTS.contains(&name.as_str())
            && !is_void(tag, &name)
        {
            opaque = Some(name);
        }
    }
    push_text(&mut output, &html[cursor..], opaque.is_some(), session);
    output
}

fn push_text<T: Translator>(output: &mut String, text: &str, opaque: bool, session: &TranslationSession<T>) {
    let trimmed = text.trim();
    if opaque || trimmed.is_empty() {
        output.push_str(text);
        return;
    }
    let start = text.len() - text.trim_start().len();
    let end = start + trimmed.len();
    output.push_str(&text[..start]);
    output.push_str(&session.translate_text(trimmed));
    output.push_str(&text[end..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::fake::{
        session,
        UpperCase,
    };

    fn translate(html: &str) -> (String, Vec<String>) {
        let translator = UpperCase::default();
        let result = translate_html(html, &session(&translator, 4500, 1));
        let calls = translator.calls.borrow().clone();
        (result, calls)
    }

    #[test]
    fn test_text_nodes_translated_markup_kept() {
        let (result, calls) = translate("<div class=\"note\">hello <b>world</b></div>\n<br>  tail ");
        assert_eq!(result, "<div class=\"note\">HELLO <b>WORLD</b></div>\n<br>  TAIL ");
        assert_eq!(calls, vec!["hello", "world", "tail"]);
    }

    #[test]
    fn test_opaque_elements_and_comments_untouched() {
        let html = "<style>.a { color: red; }</style><!-- note --><script>var x = 1;</script><p>text</p>";
        let (result, calls) = translate(html);
        assert_eq!(
            result,
            "<style>.a { color: red; }</style><!-- note --><script>var x = 1;</script><p>TEXT</p>"
        );
        assert_eq!(calls, vec!["text"]);
    }

    #[test]
    fn test_head_with_nested_title() {
        let (result, _) = translate("<head><title>t</title><meta charset=\"utf-8\"></head>body");
        assert_eq!(result, "<head><title>t</title><meta charset=\"utf-8\"></head>BODY");
    }

    #[test]
    fn test_plain_text_without_markup() {
        let (result, _) = translate("just text");
        assert_eq!(result, "JUST TEXT");
        let (blank, calls) = translate("   ");
        assert_eq!(blank, "   ");
        assert!(calls.is_empty());
    }
}
