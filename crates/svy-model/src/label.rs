//! Multilingual, multi-context label text.
//!
//! Every labeled schema object carries a [`Labels`] set keyed by
//! (language, context). Lookups fall back from the requested pair to the
//! document's base pair and finally to the object's raw name.

use serde::{Deserialize, Serialize};

/// A (language, context) pair used for label lookup.
///
/// Both parts are stored upper-cased; the document format is not
/// consistent about case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    pub language: String,
    pub context: String,
}

impl Locale {
    pub fn new(language: impl AsRef<str>, context: impl AsRef<str>) -> Self {
        Self {
            language: language.as_ref().to_uppercase(),
            context: context.as_ref().to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelText {
    pub language: String,
    pub context: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    texts: Vec<LabelText>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text for a (language, context) pair, replacing any previous text.
    pub fn set(&mut self, language: &str, context: &str, text: impl Into<String>) {
        let language = language.to_uppercase();
        let context = context.to_uppercase();
        let text = text.into();
        if let Some(existing) = self
            .texts
            .iter_mut()
            .find(|entry| entry.language == language && entry.context == context)
        {
            existing.text = text;
            return;
        }
        self.texts.push(LabelText {
            language,
            context,
            text,
        });
    }

    /// Text for an exact (language, context) pair, case-insensitive.
    pub fn text_at(&self, language: &str, context: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|entry| {
                entry.language.eq_ignore_ascii_case(language)
                    && entry.context.eq_ignore_ascii_case(context)
            })
            .map(|entry| entry.text.as_str())
    }

    /// Resolve a label: requested pair, then base pair, then `fallback`.
    pub fn resolve<'a>(&'a self, requested: &Locale, base: &Locale, fallback: &'a str) -> &'a str {
        self.text_at(&requested.language, &requested.context)
            .or_else(|| self.text_at(&base.language, &base.context))
            .unwrap_or(fallback)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelText> {
        self.texts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
    pub alternatives: Vec<String>,
}

/// Languages declared by the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Languages {
    pub base: String,
    pub items: Vec<Language>,
}

impl Languages {
    pub fn contains(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|language| language.name.eq_ignore_ascii_case(name))
    }
}

/// Label contexts declared by the document (question wording, analysis, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contexts {
    pub base: String,
    pub items: Vec<String>,
}

impl Contexts {
    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Labels {
        let mut labels = Labels::new();
        labels.set("en-us", "question", "How old are you?");
        labels.set("fr-fr", "question", "Quel âge avez-vous ?");
        labels.set("en-us", "analysis", "Age");
        labels
    }

    #[test]
    fn resolves_requested_pair_first() {
        let base = Locale::new("EN-US", "QUESTION");
        let requested = Locale::new("FR-FR", "QUESTION");
        assert_eq!(
            labels().resolve(&requested, &base, "Q1"),
            "Quel âge avez-vous ?"
        );
    }

    #[test]
    fn falls_back_to_base_then_name() {
        let base = Locale::new("EN-US", "QUESTION");
        let requested = Locale::new("DE-DE", "ANALYSIS");
        let set = labels();
        assert_eq!(set.resolve(&requested, &base, "Q1"), "How old are you?");

        let empty = Labels::new();
        assert_eq!(empty.resolve(&requested, &base, "Q1"), "Q1");
    }

    #[test]
    fn set_replaces_existing_text() {
        let mut set = labels();
        set.set("EN-US", "ANALYSIS", "Age (years)");
        assert_eq!(set.text_at("en-us", "analysis"), Some("Age (years)"));
        assert_eq!(set.iter().count(), 3);
    }
}
