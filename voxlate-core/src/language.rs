// The fixed table of languages the translation backend accepts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    De,
    En,
    Ar,
    Tr,
    Am,
    Fa,
    Ru,
    Uk,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::De,
        Language::En,
        Language::Ar,
        Language::Tr,
        Language::Am,
        Language::Fa,
        Language::Ru,
        Language::Uk,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::De => "de",
            Language::En => "en",
            Language::Ar => "ar",
            Language::Tr => "tr",
            Language::Am => "am",
            Language::Fa => "fa",
            Language::Ru => "ru",
            Language::Uk => "uk",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code))
    }

    /// Name of the language in the language itself.
    pub fn native_name(self) -> &'static str {
        match self {
            Language::De => "Deutsch",
            Language::En => "English",
            Language::Ar => "العربية",
            Language::Tr => "Türkçe",
            Language::Am => "አማርኛ",
            Language::Fa => "فارسی",
            Language::Ru => "Русский",
            Language::Uk => "Українська",
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Language::De => "🇩🇪",
            Language::En => "🇺🇸",
            Language::Ar => "🇸🇦",
            Language::Tr => "🇹🇷",
            Language::Am => "🇪🇹",
            Language::Fa => "🇮🇷",
            Language::Ru => "🇷🇺",
            Language::Uk => "🇺🇦",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Codes of every supported language, in table order.
pub fn supported_codes() -> Vec<String> {
    Language::ALL.iter().map(|l| l.code().to_string()).collect()
}

/// Map a caller-supplied code to the code the backend expects.
///
/// Codes outside the table pass through unchanged.
pub fn map_language_code(code: &str) -> String {
    match Language::from_code(code) {
        Some(lang) => lang.code().to_string(),
        None => code.to_string(),
    }
}
