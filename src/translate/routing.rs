use crate::core::config::FieldRules;

/// How one field of one note is handled during translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAction {
    Copy,
    /// Translate text nodes only, keeping markup.
    Html,
    Plain,
}

/// First matching rule wins: skip lists, always-HTML fields, per-model HTML
/// fields, plain fields. Anything else is copied.
pub fn route(rules: &FieldRules, model_name: &str, field_name: &str) -> FieldAction {
    if rules.skip_fields.contains(field_name)
        || rules.skip_prefixes.iter().any(|prefix| field_name.starts_with(prefix.as_str()))
    {
        return FieldAction::Copy;
    }
    if rules.html_fields.contains(field_name) {
        return FieldAction::Html;
    }
    if rules
        .html_fields_by_model
        .get(model_name)
        .is_some_and(|fields| fields.contains(field_name))
    {
        return FieldAction::Html;
    }
    if rules.plain_fields.contains(field_name) {
        return FieldAction::Plain;
    }
    FieldAction::Copy
}
