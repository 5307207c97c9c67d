//! Attribute extraction from free-form user text.
//!
//! Each extractor looks for one attribute and either finds a clean value or
//! nothing. The chain runs every extractor and folds the hits into a
//! [`ProfilePatch`]. Text that merely resembles an attribute is ignored.

use filachat_core::ProfilePatch;
use regex_lite::Regex;
use std::sync::LazyLock;

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:meu nome é|me chamo|my name is|nome|sou)[\s:]+(?:[oa]\s+)?([A-ZÀ-Ú][a-zà-ú]+(?:\s+[A-ZÀ-Ú][a-zà-ú]+)*)",
    )
    .expect("name pattern is valid")
});

static PHONE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:telefone|celular|whatsapp|phone|fone|tel|cel)(?:\s*(?i:is|é|:))?\s*([\d\(][\d\s\-\(\)]{7,})",
    )
    .expect("phone keyword pattern is valid")
});

static PHONE_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}[\d\s\-\(\)]{8,})").expect("phone pattern is valid"));

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,})").expect("email pattern is valid")
});

/// Digits in a phone number with area code, with or without country code.
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 10..=13;

/// A single extracted attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Name(String),
    Phone(String),
    Email(String),
}

/// Looks for one kind of attribute in a message.
pub trait AttributeExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, text: &str) -> Option<Attribute>;
}

/// Capitalized words after an introduction ("meu nome é", "me chamo", ...).
pub struct NameExtractor;

impl AttributeExtractor for NameExtractor {
    fn name(&self) -> &str {
        "name"
    }

    fn extract(&self, text: &str) -> Option<Attribute> {
        let caps = NAME.captures(text)?;
        let name = caps.get(1)?.as_str().trim();
        (!name.is_empty()).then(|| Attribute::Name(name.to_string()))
    }
}

/// A phone number after a keyword, or a bare area code + number. Stored as digits.
pub struct PhoneExtractor;

impl PhoneExtractor {
    fn digits(candidate: &str) -> Option<String> {
        let digits: String = candidate.chars().filter(char::is_ascii_digit).collect();
        PHONE_DIGITS.contains(&digits.len()).then_some(digits)
    }
}

impl AttributeExtractor for PhoneExtractor {
    fn name(&self) -> &str {
        "phone"
    }

    fn extract(&self, text: &str) -> Option<Attribute> {
        [&*PHONE_KEYWORD, &*PHONE_BARE]
            .into_iter()
            .filter_map(|re| re.captures(text))
            .filter_map(|caps| caps.get(1).and_then(|m| Self::digits(m.as_str())))
            .next()
            .map(Attribute::Phone)
    }
}

/// The first e-mail address in the text, lower-cased.
pub struct EmailExtractor;

impl AttributeExtractor for EmailExtractor {
    fn name(&self) -> &str {
        "email"
    }

    fn extract(&self, text: &str) -> Option<Attribute> {
        let caps = EMAIL.captures(text)?;
        Some(Attribute::Email(caps.get(1)?.as_str().to_lowercase()))
    }
}

/// An ordered list of extractors.
pub struct ExtractorChain {
    extractors: Vec<Box<dyn AttributeExtractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Box<dyn AttributeExtractor>>) -> Self {
        Self { extractors }
    }

    /// Run every extractor. Later hits for the same attribute win.
    pub fn extract(&self, text: &str) -> ProfilePatch {
        let mut patch = ProfilePatch::default();
        for extractor in &self.extractors {
            match extractor.extract(text) {
                Some(Attribute::Name(v)) => patch.name = Some(v),
                Some(Attribute::Phone(v)) => patch.phone = Some(v),
                Some(Attribute::Email(v)) => patch.email = Some(v),
                None => {}
            }
        }
        patch
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(NameExtractor),
            Box::new(PhoneExtractor),
            Box::new(EmailExtractor),
        ])
    }
}
