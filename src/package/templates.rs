//! Display templates by model name, with a generic fallback.

use std::collections::BTreeMap;

use log::warn;

use crate::core::config::CardTemplate;

const JLAB_NOTE_FRONT: &str = "{{Audio}}<br>\n{{Image}}<br><br>\n{{furigana:Jlab-ListeningFront}}<br><br>\n<div class=kanjipopup>{{furigana:Other-Front}}</div>\n<p style=\"font-size:50%;color=#C4C4C4\">Наведите/нажмите на кандзи, чтобы показать <a href=\"https://www.japanese-like-a-breeze.com/dont-learn-kanji-readings\">фуригану</a><p>{{RemarksFront}}\n<p style=\"font-size:70%;color:grey\">Источник этой карточки: {{Source}}<br>Измените текст с помощью <a href = \"https://www.japanese-like-a-breeze.com/addon-manual/\">дополнения Jlab (2110939339)</a> или <a href = \"https://www.japanese-like-a-breeze.com/course-without-addon/\">без дополнения</a>.</p>\n<p style=\"font-size:70%; color:grey\">Версия вашей колоды: <strong>{{Version}}</strong><br> Проверьте обновления <a href = \"https://www.japanese-like-a-breeze.com/guide-for-beginners/\">здесь.</a></p>\n<p style=\"font-size:70%; color:grey\">Вы можете поддержать Jlab на <a href=\"https://www.patreon.com/jlabjapanese/\">Patreon</a> - спасибо!</p><br>";

const JLAB_NOTE_BACK: &str = "<div style=\"text-align: left;\">{{RemarksBack}}<br>\n{{Jlab-Remarks}}<br>\nСсылки:<br>\n{{References}}<br>\n{{Other-Back}}<br>\n<p style=\"font-size:70%;color:grey\">Что-то неясно? Задайте вопрос, связанный с этой карточкой, используя эту {{QuestionLink}}.</p>\n<p style=\"font-size:70%; color:grey\">Вы можете поддержать Jlab на <a href=\"https://www.patreon.com/jlabjapanese/\">Patreon</a> - спасибо!</p></div>";

const JLAB_NOTE_STYLING: &str = ".card {\n font-family: arial;\n font-size: 20px;\n max-width: 800px;\n text-align: center;\n margin-left: auto;\n margin-right: auto;\n}\n.kanjipopup {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n}\n.kanjipopup ruby rt { visibility: hidden; }\n.kanjipopup ruby:active rt { visibility: visible; }\n.kanjipopup ruby:hover rt { visibility: visible; }";

const INFO_NOTE_STYLING: &str = ".card {\n font-family: arial;\n font-size: 20px;\n max-width: 800px;\n text-align: left;\n margin-left: auto;\n margin-right: auto;\n color: black;\n background-color: white;\n}";

const GENERIC_STYLING: &str = ".card { font-family: arial; font-size: 20px; text-align: center; color: black; background-color: white; }";

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateTable {
    entries: BTreeMap<String, CardTemplate>,
}

impl Default for TemplateTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateTable {
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "JlabNote-JlabConverted-1".to_string(),
            CardTemplate {
                front: JLAB_NOTE_FRONT.to_string(),
                back: JLAB_NOTE_BACK.to_string(),
                styling: JLAB_NOTE_STYLING.to_string(),
            },
        );
        entries.insert(
            "InfoNote".to_string(),
            CardTemplate {
                front: "{{Image}}<br>{{Text}}".to_string(),
                back: "{{FrontSide}}".to_string(),
                styling: INFO_NOTE_STYLING.to_string(),
            },
        );
        Self { entries }
    }

    /// Built-in entries with configured ones layered over them by name.
    pub fn with_overrides(overrides: &BTreeMap<String, CardTemplate>) -> Self {
        let mut table = Self::builtin();
        for (name, template) in overrides {
            table.entries.insert(name.clone(), template.clone());
        }
        table
    }

    pub fn get(&self, model_name: &str) -> Option<&CardTemplate> {
        self.entries.get(model_name).filter(|t| {
            !t.front.trim().is_empty() && !t.back.trim().is_empty() && !t.styling.trim().is_empty()
        })
    }

    pub fn resolve(&self, model_name: &str, field_names: &[String]) -> CardTemplate {
        match self.get(model_name) {
            Some(template) => template.clone(),
            None => {
                warn!(
                    "No template for model '{}', using a generic layout. Cards may not look like the original.",
                    model_name
                );
                generic_template(field_names)
            }
        }
    }
}

/// Every field on the front; the back repeats them under a divider.
pub fn generic_template(field_names: &[String]) -> CardTemplate {
    let listing = field_names.iter().map(|name| format!("{{{{{}}}}}", name)).collect::<Vec<_>>().join("<br>");
    CardTemplate {
        front: listing.clone(),
        back: format!("{{{{FrontSide}}}}<hr id=\"answer\">{}", listing),
        styling: GENERIC_STYLING.to_string(),
    }
}

/// Field names referenced by `{{...}}` tags, with filters such as
/// `furigana:` and section markers stripped. Special names like
/// `FrontSide` are included; callers match against their own field list.
pub fn referenced_fields(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let tag = after[..end].trim().trim_start_matches(['#', '^', '/']);
        let name = tag.rsplit(':').next().unwrap_or(tag).trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_info_note() {
        let table = TemplateTable::builtin();
        let template = table.resolve("InfoNote", &names(&["Image", "Text"]));
        assert_eq!(template.front, "{{Image}}<br>{{Text}}");
        assert_eq!(template.back, "{{FrontSide}}");
    }

    #[test]
    fn test_builtin_jlab_note() {
        let fields = names(&["Jlab-ListeningFront", "Other-Front", "RemarksFront", "RemarksBack", "Audio", "Image"]);
        let template = TemplateTable::builtin().resolve("JlabNote-JlabConverted-1", &fields);
        assert!(template.front.starts_with("{{Audio}}<br>\n{{Image}}"));
        assert!(template.back.contains("{{RemarksBack}}"));
        assert!(template.styling.contains(".kanjipopup ruby:hover rt { visibility: visible; }"));

        let front = referenced_fields(&template.front);
        assert!(front.contains(&"Jlab-ListeningFront".to_string()));
        assert!(front.contains(&"Other-Front".to_string()));
    }

    #[test]
    fn test_generic_fallback() {
        let template = TemplateTable::builtin().resolve("Basic", &names(&["Front", "Back"]));
        assert_eq!(template.front, "{{Front}}<br>{{Back}}");
        assert_eq!(template.back, "{{FrontSide}}<hr id=\"answer\">{{Front}}<br>{{Back}}");
        assert!(template.styling.contains("font-family: arial"));
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Basic".to_string(),
            CardTemplate { front: "{{Front}}".to_string(), back: "{{Back}}".to_string(), styling: ".card {}".to_string() },
        );
        let table = TemplateTable::with_overrides(&overrides);
        assert_eq!(table.get("Basic").map(|t| t.front.as_str()), Some("{{Front}}"));
        assert!(table.get("InfoNote").is_some());
    }

    #[test]
    fn test_incomplete_entry_falls_back() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Basic".to_string(),
            CardTemplate { front: "{{Front}}".to_string(), back: String::new(), styling: String::new() },
        );
        let table = TemplateTable::with_overrides(&overrides);
        assert!(table.get("Basic").is_none());
    }

    #[test]
    fn test_referenced_fields() {
        let template = "{{Audio}}<br>{{furigana:Reading}}{{#Image}}{{Image}}{{/Image}} {{ Text }}";
        assert_eq!(referenced_fields(template), names(&["Audio", "Reading", "Image", "Text"]));
    }
}
