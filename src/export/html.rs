//! Static HTML rendering of card answers for browsing outside Anki.

use std::{
    collections::{
        BTreeSet,
        HashMap,
    },
    fmt::Write as _,
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
};

use log::{
    debug,
    info,
    warn,
};
use regex::Regex;

use super::json::{
    retrieve_media_bytes,
    unique_in_order,
};
use crate::{
    anki::{
        deck_query,
        tag_query,
        CardInfo,
        NoteService,
    },
    core::{
        media::{
            bare_filename,
            is_image,
        },
        models::{
            export_folder_name,
            MEDIA_DIR_NAME,
        },
        Result,
    },
};

const STYLESHEET: &str = r#"body {
    font-family: Arial, sans-serif;
    background: #121212;
    color: #ffffff;
    display: flex;
    flex-direction: column;
    align-items: center;
    padding: 20px;
}
.card {
    border: 1px solid #444;
    padding: 20px;
    margin: 10px;
    border-radius: 8px;
    background: #1e1e1e;
    width: 60%;
    text-align: center;
    position: relative;
}
.card-id {
    font-size: 12px;
    color: #aaa;
    text-decoration: none;
    position: absolute;
    top: 5px;
    right: 10px;
}
.tags {
    font-size: 12px;
    color: #aaa;
    margin-top: 10px;
    border-top: 1px solid #444;
    padding-top: 5px;
}
img {
    max-width: 100%;
    display: block;
    margin: 10px auto;
}
.extra-info-button {
    background-color: #333;
    color: #fff;
    border: none;
    padding: 5px 10px;
    cursor: pointer;
    margin-top: 5px;
    border-radius: 5px;
    text-decoration: none;
    display: inline-block;
}
.extra-info-button:hover {
    background-color: #555;
}
"#;

const EXTRA_INFO_SCRIPT: &str = r#"function openExtraInfo(content, isImage) {
    let w = window.open("", "_blank", "width=600,height=400");
    if (isImage) {
        w.document.write("<img src='" + content + "' style='max-width:100%;'>");
    } else {
        w.document.write("<p style='font-size:16px; white-space:pre-wrap;'>" + content + "</p>");
    }
    w.document.close();
}"#;

#[derive(Debug, Clone, PartialEq)]
pub enum HtmlSelection {
    Deck(String),
    Tag(String),
    /// Free-text terms matched against content, tags and deck names,
    /// optionally limited to one top-level deck.
    Terms { terms: Vec<String>, top_deck: Option<String> },
}

impl HtmlSelection {
    pub fn query(&self) -> String {
        match self {
            HtmlSelection::Deck(name) => deck_query(name),
            HtmlSelection::Tag(tag) => tag_query(tag),
            HtmlSelection::Terms { terms, .. } => terms
                .iter()
                .flat_map(|t| [format!("\"{t}\""), format!("tag:*{t}*"), format!("deck:*{t}*")])
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }

    pub fn default_output_dir(&self) -> PathBuf {
        match self {
            HtmlSelection::Deck(name) | HtmlSelection::Tag(name) => {
                PathBuf::from(export_folder_name(name))
            }
            HtmlSelection::Terms { terms, .. } => {
                PathBuf::from(terms.join("_").to_lowercase().replace(' ', "_"))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlReport {
    pub cards_written: usize,
    pub unique_tags: Vec<String>,
    pub saved_media: Vec<String>,
    pub index_path: Option<PathBuf>,
}

fn tags_container_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<div id="tags-container".*?>.*?</div>"#).expect("tags pattern is valid")
    })
}

fn button_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<button .*?>.*?</button>").expect("button pattern is valid"))
}

fn src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\ssrc="([^"]+)""#).expect("src pattern is valid"))
}

/// Raw `src="..."` values, in document order.
fn src_references(html: &str) -> Vec<String> {
    src_regex().captures_iter(html).map(|c| c[1].to_string()).collect()
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Downloads image media once per run and remembers the relative path.
struct ImageFetcher<'a, S: NoteService + ?Sized> {
    service: &'a S,
    media_dir: PathBuf,
    resolved: HashMap<String, Option<String>>,
}

impl<'a, S: NoteService + ?Sized> ImageFetcher<'a, S> {
    fn fetch(&mut self, reference: &str) -> Result<Option<String>> {
        let name = bare_filename(reference).to_string();
        if let Some(resolved) = self.resolved.get(&name) {
            return Ok(resolved.clone());
        }

        let resolved = match retrieve_media_bytes(self.service, &name) {
            Ok(bytes) if is_image(&bytes) => {
                fs::write(self.media_dir.join(&name), bytes)?;
                Some(format!("{}/{}", MEDIA_DIR_NAME, name))
            }
            Ok(_) => {
                debug!("Skipping non-image media '{}'", name);
                None
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Could not fetch media '{}': {}", name, e);
                None
            }
        };
        self.resolved.insert(name, resolved.clone());
        Ok(resolved)
    }
}

pub fn export_html<S: NoteService + ?Sized>(
    service: &S,
    selection: &HtmlSelection,
    output_dir: &Path,
) -> Result<HtmlReport> {
    let card_ids = service.find_cards(&selection.query())?;
    info!("Found {} matching cards", card_ids.len());
    if card_ids.is_empty() {
        return Ok(HtmlReport::default());
    }

    let mut cards = service.cards_info(&card_ids)?;
    if let HtmlSelection::Terms { top_deck: Some(deck), .. } = selection {
        cards.retain(|card| card.top_level_deck() == deck);
        info!("{} cards in top-level deck '{}'", cards.len(), deck);
    }

    let note_ids = unique_in_order(cards.iter().map(|c| c.note).collect());
    let note_tags: HashMap<u64, Vec<String>> = service
        .notes_info(&note_ids)?
        .into_iter()
        .map(|note| (note.note_id, note.tags))
        .collect();
    let unique_tags: BTreeSet<String> = note_tags.values().flatten().cloned().collect();

    let media_dir = output_dir.join(MEDIA_DIR_NAME);
    let css_dir = output_dir.join("css");
    fs::create_dir_all(&media_dir)?;
    fs::create_dir_all(&css_dir)?;
    fs::write(css_dir.join("styles.css"), STYLESHEET)?;

    let mut fetcher = ImageFetcher { service, media_dir, resolved: HashMap::new() };

    let mut page = String::new();
    page.push_str("<html><head><meta charset='UTF-8'><title>Exported Cards</title>");
    page.push_str("<link rel='stylesheet' type='text/css' href='css/styles.css'>");
    let _ = write!(page, "<script>{}</script></head><body>", EXTRA_INFO_SCRIPT);

    for card in &cards {
        let tags = note_tags
            .get(&card.note)
            .filter(|tags| !tags.is_empty())
            .or(Some(&card.tags).filter(|tags| !tags.is_empty()));
        render_card(&mut page, card, tags.map(Vec::as_slice), &mut fetcher)?;
    }
    page.push_str("</body></html>");

    let index_path = output_dir.join("index.html");
    fs::write(&index_path, page)?;

    let saved_media: Vec<String> = fetcher
        .resolved
        .iter()
        .filter(|(_, path)| path.is_some())
        .map(|(name, _)| name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    info!("Cards exported to {}", index_path.display());
    Ok(HtmlReport {
        cards_written: cards.len(),
        unique_tags: unique_tags.into_iter().collect(),
        saved_media,
        index_path: Some(index_path),
    })
}

fn render_card<S: NoteService + ?Sized>(
    page: &mut String,
    card: &CardInfo,
    tags: Option<&[String]>,
    fetcher: &mut ImageFetcher<'_, S>,
) -> Result<()> {
    let mut answer = tags_container_regex().replace_all(&card.answer, "").into_owned();
    for reference in src_references(&answer) {
        if let Some(local) = fetcher.fetch(&reference)? {
            answer = answer.replace(&format!("src=\"{reference}\""), &format!("src=\"{local}\""));
        }
    }
    let answer = button_regex().replace_all(&answer, "").into_owned();

    let _ = write!(page, "<div class='card'>");
    let _ = write!(
        page,
        "<a href='#{id}' class='card-id' id='{id}'>Card ID: {id}</a>",
        id = card.card_id
    );
    let _ = write!(page, "<p>{}</p>", answer);

    for (name, field) in card.ordered_fields() {
        let value = field.value.trim();
        let lowered = name.to_lowercase();
        if value.is_empty() || answer.contains(value) || lowered == "front" || lowered == "question" {
            continue;
        }

        let references = src_references(value);
        if references.is_empty() {
            let safe = escape_html(value).replace('{', "&#123;").replace('}', "&#125;");
            let _ = write!(
                page,
                "<button class='extra-info-button' onclick=\"openExtraInfo('{}', false)\">{}</button>",
                safe,
                escape_html(name)
            );
            continue;
        }
        for reference in references {
            if let Some(local) = fetcher.fetch(&reference)? {
                let _ = write!(
                    page,
                    "<button class='extra-info-button' onclick=\"openExtraInfo('{}', true)\">{}</button>",
                    local,
                    escape_html(name)
                );
            }
        }
    }

    let tags = match tags {
        Some(tags) => tags.join(", "),
        None => "-".to_string(),
    };
    let _ = write!(page, "<p class='tags'>Tags: {}</p></div>", tags);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::anki::{
        fake::{
            note_info,
            FakeService,
        },
        Field,
    };

    fn card(card_id: u64, note: u64, deck: &str, answer: &str, fields: &[(&str, &str)]) -> CardInfo {
        CardInfo {
            card_id,
            note,
            deck_name: deck.to_string(),
            model_name: "Basic".to_string(),
            question: String::new(),
            answer: answer.to_string(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, (n, v))| (n.to_string(), Field::new(v, i as u32)))
                .collect(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_terms_query() {
        let selection =
            HtmlSelection::Terms { terms: vec!["cat".to_string(), "dog".to_string()], top_deck: None };
        assert_eq!(
            selection.query(),
            "\"cat\" or tag:*cat* or deck:*cat* or \"dog\" or tag:*dog* or deck:*dog*"
        );
        assert_eq!(selection.default_output_dir(), PathBuf::from("cat_dog"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"a\" & 'b'</b>"), "&lt;b&gt;&quot;a&quot; &amp; &#x27;b&#x27;&lt;/b&gt;");
    }

    #[test]
    fn test_export_html_renders_cards() {
        let dir = tempdir().unwrap();
        let mut service = FakeService::default()
            .with_query("deck:\"Vocab\"", &[10])
            .with_note(note_info(1, "Basic", &[], &["animals", "n5"]), &[10])
            .with_media("cat.png", b"\x89PNG\r\n\x1a\ncat")
            .with_media("meow.mp3", b"ID3 audio");
        service.cards.insert(
            10,
            card(
                10,
                1,
                "Vocab",
                "Cat<img src=\"cat.png\"><div id=\"tags-container\">t</div><button onclick=\"x\">Show</button>",
                &[("Front", "Cat"), ("Notes", "a {small} animal"), ("Sound", "<img src=\"meow.mp3\">")],
            ),
        );

        let report = export_html(&service, &HtmlSelection::Deck("Vocab".to_string()), dir.path()).unwrap();
        assert_eq!(report.cards_written, 1);
        assert_eq!(report.unique_tags, vec!["animals", "n5"]);
        assert_eq!(report.saved_media, vec!["cat.png"]);

        let page = fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(page.contains("src=\"media/cat.png\""));
        assert!(!page.contains("tags-container"));
        assert!(!page.contains(">Show</button>"));
        assert!(page.contains("a &#123;small&#125; animal"));
        assert!(page.contains("Tags: animals, n5"));
        assert!(dir.path().join("css/styles.css").exists());
        assert!(dir.path().join("media/cat.png").exists());
        assert!(!dir.path().join("media/meow.mp3").exists());
    }

    #[test]
    fn test_terms_filter_by_top_level_deck() {
        let dir = tempdir().unwrap();
        let query = "\"cat\" or tag:*cat* or deck:*cat*";
        let mut service = FakeService::default()
            .with_query(query, &[10, 20])
            .with_note(note_info(1, "Basic", &[], &[]), &[10])
            .with_note(note_info(2, "Basic", &[], &[]), &[20]);
        service.cards.insert(10, card(10, 1, "Japanese::N5", "one", &[]));
        service.cards.insert(20, card(20, 2, "German", "two", &[]));

        let selection =
            HtmlSelection::Terms { terms: vec!["cat".to_string()], top_deck: Some("Japanese".to_string()) };
        let report = export_html(&service, &selection, dir.path()).unwrap();
        assert_eq!(report.cards_written, 1);

        let page = fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(page.contains("one"));
        assert!(!page.contains("two"));
        assert!(page.contains("Tags: -"));
    }
}
