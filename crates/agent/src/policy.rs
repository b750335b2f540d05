//! When the assistant may search the web.
//!
//! Web search runs only when the user's message contains an explicit
//! directive such as "busca en google", and at most once per turn.
//! Everything else is answered from the policy documents.

use crate::capability::Capability;
use policypro_core::{AppError, AppResult};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Phrases that authorize a web search. Matched on whole words, ignoring
/// case, accents, punctuation and extra whitespace.
pub const WEB_SEARCH_TRIGGERS: [&str; 10] = [
    "busca en google",
    "buscar en google",
    "busca en internet",
    "buscar en internet",
    "busca en la web",
    "buscar en la web",
    "search on the web",
    "search the web",
    "search on google",
    "search google",
];

/// Lowercase, accent-free, alphanumeric-only form of a word.
fn normalize_word(word: &str) -> String {
    word.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Position (in whitespace-separated words of `text`) of the first trigger
/// phrase, as a half-open word range.
fn find_trigger(text: &str) -> Option<(usize, usize)> {
    let words: Vec<(usize, String)> = text
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| (i, normalize_word(w)))
        .filter(|(_, w)| !w.is_empty())
        .collect();

    let mut best: Option<(usize, usize)> = None;
    for trigger in WEB_SEARCH_TRIGGERS {
        let phrase: Vec<&str> = trigger.split(' ').collect();
        let found = words.windows(phrase.len()).find(|window| {
            window
                .iter()
                .zip(phrase.iter())
                .all(|((_, word), expected)| word == expected)
        });
        if let Some(window) = found {
            let span = (window[0].0, window[window.len() - 1].0 + 1);
            if best.map_or(true, |(start, _)| span.0 < start) {
                best = Some(span);
            }
        }
    }
    best
}

/// Whether `text` explicitly asks for a web search.
pub fn requests_web_search(text: &str) -> bool {
    find_trigger(text).is_some()
}

/// `text` without its trigger phrase, or the full text if nothing else
/// remains.
pub fn strip_trigger(text: &str) -> String {
    let Some((start, end)) = find_trigger(text) else {
        return text.trim().to_string();
    };

    let remaining = text
        .split_whitespace()
        .enumerate()
        .filter(|(i, _)| *i < start || *i >= end)
        .map(|(_, w)| w)
        .collect::<Vec<_>>()
        .join(" ");
    let remaining = remaining
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | ',' | ';' | '-' | '.'))
        .to_string();

    if remaining.chars().any(char::is_alphanumeric) {
        remaining
    } else {
        text.trim().to_string()
    }
}

/// Where the orchestrator looks first for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimarySource {
    Documents { query: String },
    Web { query: String },
}

impl PrimarySource {
    pub fn select(text: &str) -> Self {
        if requests_web_search(text) {
            PrimarySource::Web {
                query: strip_trigger(text),
            }
        } else {
            PrimarySource::Documents {
                query: text.trim().to_string(),
            }
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            PrimarySource::Documents { .. } => Capability::DocumentRetrieval,
            PrimarySource::Web { .. } => Capability::WebSearch,
        }
    }

    pub fn query(&self) -> &str {
        match self {
            PrimarySource::Documents { query } | PrimarySource::Web { query } => query,
        }
    }
}

/// Per-turn gate on capability use.
#[derive(Debug, Clone)]
pub struct TurnPolicy {
    web_search_allowed: bool,
    web_searches: usize,
}

impl TurnPolicy {
    pub fn for_message(text: &str) -> Self {
        Self {
            web_search_allowed: requests_web_search(text),
            web_searches: 0,
        }
    }

    /// Record a use of `capability`, refusing disallowed web searches.
    ///
    /// # Errors
    /// `PolicyViolation` for a web search the user did not ask for, or a
    /// second web search in the same turn.
    pub fn authorize(&mut self, capability: Capability) -> AppResult<()> {
        match capability {
            Capability::DocumentRetrieval => Ok(()),
            Capability::WebSearch if !self.web_search_allowed => Err(AppError::PolicyViolation(
                "web search requested without an explicit request from the user".to_string(),
            )),
            Capability::WebSearch if self.web_searches > 0 => Err(AppError::PolicyViolation(
                "web search already ran in this turn".to_string(),
            )),
            Capability::WebSearch => {
                self.web_searches += 1;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_detection() {
        assert!(requests_web_search("busca en google el clima de hoy"));
        assert!(requests_web_search("Por favor, BUSCA EN  Google: noticias de seguros"));
        assert!(requests_web_search("¿Puedes buscar en internet la inflación?"));
        assert!(requests_web_search("search the web for flood insurance"));
        assert!(!requests_web_search("¿Qué cubre la póliza POL123?"));
        assert!(!requests_web_search("¿Google cubre algo en la póliza?"));
        assert!(!requests_web_search("busca en googleplex"));
    }

    #[test]
    fn test_accents_are_ignored() {
        assert!(requests_web_search("búsca en góogle el tipo de cambio"));
    }

    #[test]
    fn test_strip_trigger() {
        assert_eq!(strip_trigger("busca en google el clima de hoy"), "el clima de hoy");
        assert_eq!(
            strip_trigger("Oye, busca en internet: precio del seguro de auto"),
            "Oye, precio del seguro de auto"
        );
        assert_eq!(strip_trigger("busca en google"), "busca en google");
        assert_eq!(strip_trigger("  sin disparador "), "sin disparador");
    }

    #[test]
    fn test_primary_source() {
        assert_eq!(
            PrimarySource::select("busca en google el clima de hoy"),
            PrimarySource::Web {
                query: "el clima de hoy".to_string()
            }
        );
        let docs = PrimarySource::select("¿Qué cubre la póliza POL123?");
        assert_eq!(docs.capability(), Capability::DocumentRetrieval);
        assert_eq!(docs.query(), "¿Qué cubre la póliza POL123?");
    }

    #[test]
    fn test_turn_policy_without_trigger() {
        let mut policy = TurnPolicy::for_message("¿Qué cubre la póliza?");
        assert!(policy.authorize(Capability::DocumentRetrieval).is_ok());
        assert!(matches!(
            policy.authorize(Capability::WebSearch),
            Err(AppError::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_turn_policy_allows_one_web_search() {
        let mut policy = TurnPolicy::for_message("busca en google el clima");
        assert!(policy.authorize(Capability::WebSearch).is_ok());
        assert!(matches!(
            policy.authorize(Capability::WebSearch),
            Err(AppError::PolicyViolation(_))
        ));
        assert!(policy.authorize(Capability::DocumentRetrieval).is_ok());
    }
}
