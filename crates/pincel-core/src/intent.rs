//! Decides whether a text-only prompt is asking for a picture.

/// What a text-only prompt wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    GenerateImage,
    Converse,
}

/// A strategy for classifying text-only prompts.
///
/// The router only sees this trait, so a model-backed classifier can replace
/// the keyword list without touching the routing flow.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, prompt: &str) -> Intent;

    fn name(&self) -> &'static str;
}

/// English image-intent keywords
pub const ENGLISH_KEYWORDS: &[&str] = &[
    "create",
    "generate",
    "draw",
    "imagine",
    "picture of",
    "image of",
    "photo of",
    "visualize",
    "paint",
];

/// Spanish image-intent keywords
pub const SPANISH_KEYWORDS: &[&str] = &[
    "crea",
    "genera",
    "dibuja",
    "imagina",
    "foto de",
    "imagen de",
    "visualiza",
    "pinta",
];

/// Case-insensitive substring match against a fixed word list.
/// No stemming and no word boundaries: "recreate" matches "create".
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(ENGLISH_KEYWORDS.iter().chain(SPANISH_KEYWORDS))
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, prompt: &str) -> Intent {
        let lower = prompt.to_lowercase();
        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            Intent::GenerateImage
        } else {
            Intent::Converse
        }
    }

    fn name(&self) -> &'static str {
        "keywords"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_regardless_of_case() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("Please DRAW a sunset"), Intent::GenerateImage);
        assert_eq!(classifier.classify("Photo Of my dog"), Intent::GenerateImage);
    }

    #[test]
    fn matches_spanish_keywords() {
        let classifier = KeywordClassifier::default();
        assert_eq!(
            classifier.classify("hola, genera una imagen de un gato"),
            Intent::GenerateImage
        );
        assert_eq!(classifier.classify("Dibuja un árbol"), Intent::GenerateImage);
    }

    #[test]
    fn plain_questions_are_conversation() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("What is the capital of Peru?"), Intent::Converse);
        assert_eq!(classifier.classify("¿Cómo estás?"), Intent::Converse);
    }

    #[test]
    fn substring_matching_has_no_word_boundaries() {
        let classifier = KeywordClassifier::default();
        // "recreational" contains "crea"
        assert_eq!(classifier.classify("recreational math"), Intent::GenerateImage);
    }

    #[test]
    fn custom_keyword_lists_are_lowercased() {
        let classifier = KeywordClassifier::new(["Render"]);
        assert_eq!(classifier.keywords(), ["render"]);
        assert_eq!(classifier.classify("render a cube"), Intent::GenerateImage);
        assert_eq!(classifier.classify("draw a cube"), Intent::Converse);
    }
}
