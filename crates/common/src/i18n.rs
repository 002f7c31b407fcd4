//! User-visible message catalog

use crate::locale::Locale;

/// Placeholder shown for a field without value
pub const UNSET_PLACEHOLDER: &str = "-";

/// Message keys known to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    NoticeSuccessfulUpdate,
    TooLong,
    TooShort,
    Blank,
    NotANumber,
    NotAnInteger,
    Inclusion,
    NotFound,
    Rejected,
}

fn english(key: MessageKey) -> &'static str {
    match key {
        MessageKey::NoticeSuccessfulUpdate => "Successful update.",
        MessageKey::TooLong => "%{name} is too long (maximum is %{count} characters).",
        MessageKey::TooShort => "%{name} is too short (minimum is %{count} characters).",
        MessageKey::Blank => "%{name} can't be blank.",
        MessageKey::NotANumber => "%{name} is not a number.",
        MessageKey::NotAnInteger => "%{name} must be an integer.",
        MessageKey::Inclusion => "%{name} is not set to one of the allowed values.",
        MessageKey::NotFound => "The requested resource could not be found.",
        MessageKey::Rejected => "%{name} could not be updated.",
    }
}

fn german(key: MessageKey) -> &'static str {
    match key {
        MessageKey::NoticeSuccessfulUpdate => "Erfolgreich aktualisiert.",
        MessageKey::TooLong => "%{name} ist zu lang (nicht mehr als %{count} Zeichen).",
        MessageKey::TooShort => "%{name} ist zu kurz (nicht weniger als %{count} Zeichen).",
        MessageKey::Blank => "%{name} muss ausgefüllt werden.",
        MessageKey::NotANumber => "%{name} ist keine Zahl.",
        MessageKey::NotAnInteger => "%{name} muss eine ganze Zahl sein.",
        MessageKey::Inclusion => "%{name} ist kein gültiger Wert.",
        MessageKey::NotFound => "Die angeforderte Ressource konnte nicht gefunden werden.",
        MessageKey::Rejected => "%{name} konnte nicht aktualisiert werden.",
    }
}

/// Look up the template for `key`; unknown languages fall back to English
pub fn template(key: MessageKey, locale: &Locale) -> &'static str {
    match locale.language.as_str() {
        "de" => german(key),
        _ => english(key),
    }
}

/// Render a message, interpolating `%{name}` and `%{count}`
pub fn message(key: MessageKey, locale: &Locale, name: &str, count: Option<u32>) -> String {
    let rendered = template(key, locale).replace("%{name}", name);
    match count {
        Some(n) => rendered.replace("%{count}", &n.to_string()),
        None => rendered,
    }
}

pub fn notice_successful_update(locale: &Locale) -> String {
    template(MessageKey::NoticeSuccessfulUpdate, locale).to_string()
}
