// src/bot/classifiers.rs - Stateless content predicates and their precedence table

use log::debug;
use regex::{Regex, RegexBuilder};
use unicode_normalization::char::is_combining_mark;

use crate::config::ModerationSettings;
use crate::types::{GroupSettings, GuardError, GuardResult, Severity, ViolationKind};

type Predicate = fn(&ContentClassifiers, &str) -> bool;

/// One row of the precedence table
pub struct ContentRule {
    pub kind: ViolationKind,
    pub severity: Severity,
    predicate: Predicate,
}

/// Content rules in evaluation order; the first positive wins.
/// Flood is checked separately, before any of these.
pub static CONTENT_RULES: [ContentRule; 5] = [
    ContentRule {
        kind: ViolationKind::Toxic,
        severity: Severity::Warn,
        predicate: ContentClassifiers::is_toxic,
    },
    ContentRule {
        kind: ViolationKind::Link,
        severity: Severity::Warn,
        predicate: ContentClassifiers::is_link,
    },
    ContentRule {
        kind: ViolationKind::Virtex,
        severity: Severity::Immediate,
        predicate: ContentClassifiers::is_virtex,
    },
    ContentRule {
        kind: ViolationKind::Nsfw,
        severity: Severity::Immediate,
        predicate: ContentClassifiers::is_nsfw,
    },
    ContentRule {
        kind: ViolationKind::Promotion,
        severity: Severity::Warn,
        predicate: ContentClassifiers::is_promotion,
    },
];

/// Zero-width, bidirectional and other invisible formatting characters
fn is_invisible_control(c: char) -> bool {
    matches!(
        c as u32,
        0x200B..=0x200F | 0x202A..=0x202E | 0x2060..=0x206F | 0xFEFF | 0x180E
    ) || (c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

pub struct ContentClassifiers {
    toxic_terms: Vec<String>,
    nsfw_terms: Vec<String>,
    link_pattern: Regex,
    promotion_pattern: Regex,
    blank_lines_pattern: Regex,
    max_length: usize,
    repeated_char_run: usize,
    unbroken_token_length: usize,
    combining_mark_run: usize,
}

impl ContentClassifiers {
    pub fn new(settings: &ModerationSettings) -> GuardResult<Self> {
        let compile = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| GuardError::Config(format!("invalid classifier pattern: {}", e)))
        };

        Ok(Self {
            toxic_terms: lowercase_terms(&settings.toxic_terms),
            nsfw_terms: lowercase_terms(&settings.nsfw_terms),
            link_pattern: compile(r"https?://\S+")?,
            promotion_pattern: compile(r"chat\.whatsapp\.com/[a-z0-9]+|wa\.me/\d+")?,
            blank_lines_pattern: compile(&format!(r"(?:\n\s*){{{},}}", settings.blank_line_run))?,
            max_length: settings.max_message_length,
            repeated_char_run: settings.repeated_char_run,
            unbroken_token_length: settings.unbroken_token_length,
            combining_mark_run: settings.combining_mark_run,
        })
    }

    pub fn is_toxic(&self, text: &str) -> bool {
        contains_any_term(text, &self.toxic_terms)
    }

    pub fn is_link(&self, text: &str) -> bool {
        self.link_pattern.is_match(text)
    }

    /// Group invite and click-to-chat links
    pub fn is_promotion(&self, text: &str) -> bool {
        self.promotion_pattern.is_match(text)
    }

    pub fn is_nsfw(&self, text: &str) -> bool {
        contains_any_term(text, &self.nsfw_terms)
    }

    /// Payloads built to freeze or crash a rendering client
    pub fn is_virtex(&self, text: &str) -> bool {
        if text.chars().count() > self.max_length {
            return true;
        }
        text.chars().any(is_invisible_control)
            || self.has_repeated_run(text)
            || self.blank_lines_pattern.is_match(text)
            || self.has_unbroken_token(text)
            || self.has_combining_run(text)
    }

    /// A character followed by at least `repeated_char_run` copies of itself
    fn has_repeated_run(&self, text: &str) -> bool {
        let mut previous = None;
        let mut run = 0usize;
        for c in text.chars() {
            if c == '\n' {
                previous = None;
                run = 0;
                continue;
            }
            if Some(c) == previous {
                run += 1;
                if run > self.repeated_char_run {
                    return true;
                }
            } else {
                previous = Some(c);
                run = 1;
            }
        }
        false
    }

    fn has_unbroken_token(&self, text: &str) -> bool {
        text.split_whitespace()
            .any(|token| token.chars().count() >= self.unbroken_token_length)
    }

    fn has_combining_run(&self, text: &str) -> bool {
        let mut run = 0usize;
        for c in text.chars() {
            if is_combining_mark(c) {
                run += 1;
                if run >= self.combining_mark_run {
                    return true;
                }
            } else {
                run = 0;
            }
        }
        false
    }

    /// First enabled content rule that matches, in table order
    pub fn classify(&self, text: &str, settings: &GroupSettings) -> Option<&'static ContentRule> {
        if text.is_empty() {
            return None;
        }
        let rule = CONTENT_RULES
            .iter()
            .filter(|rule| settings.policy_enabled(rule.kind))
            .find(|rule| (rule.predicate)(self, text));
        if let Some(rule) = rule {
            debug!("Content matched {} rule", rule.kind);
        }
        rule
    }
}

fn lowercase_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn contains_any_term(text: &str, terms: &[String]) -> bool {
    if terms.is_empty() {
        return false;
    }
    let lowered = text.to_lowercase();
    terms.iter().any(|term| lowered.contains(term.as_str()))
}
