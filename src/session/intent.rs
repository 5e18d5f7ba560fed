//! Transcript classification and reply shaping

use crate::realtime::RealtimeQuery;

/// Sentences kept from a cloud reply before it is spoken
pub const MAX_SPOKEN_SENTENCES: usize = 3;

/// Filler words that end a spoken city name ("weather in Pune today")
const LOCATION_STOP_WORDS: &[&str] = &["today", "now", "right", "tomorrow", "please", "currently"];

/// What the user asked for in one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Nothing was recognized
    NoInput,
    /// An exit phrase ends the window
    Exit,
    /// Weather or news, answered by the realtime agent
    Realtime(RealtimeQuery),
    /// Anything else, answered by cloud chat or local dialogue
    Conversation,
}

/// Inputs for classifying a transcript
#[derive(Debug, Clone)]
pub struct IntentRules {
    /// Phrases that end the window, matched as whole words
    pub exit_phrases: Vec<String>,
    /// City used when a weather request names none
    pub default_location: Option<String>,
    /// Country code for headline requests
    pub news_country: String,
}

impl IntentRules {
    /// Classify a transcript
    #[must_use]
    pub fn classify(&self, transcript: &str) -> Intent {
        let words = normalize(transcript);
        if words.is_empty() {
            return Intent::NoInput;
        }

        if self.is_exit(&words) {
            return Intent::Exit;
        }

        if words.iter().any(|w| w == "weather") {
            let location = location_after_in(&words).or_else(|| self.default_location.clone());
            return Intent::Realtime(RealtimeQuery::Weather { location });
        }

        if words.iter().any(|w| w == "news" || w == "headlines") {
            return Intent::Realtime(RealtimeQuery::News {
                country: self.news_country.clone(),
            });
        }

        Intent::Conversation
    }

    fn is_exit(&self, words: &[String]) -> bool {
        self.exit_phrases.iter().any(|phrase| {
            let phrase: Vec<&str> = phrase.split_whitespace().collect();
            !phrase.is_empty()
                && words
                    .windows(phrase.len())
                    .any(|window| window.iter().zip(&phrase).all(|(a, b)| a == b))
        })
    }
}

/// Lowercase words with punctuation stripped
fn normalize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

fn location_after_in(words: &[String]) -> Option<String> {
    let start = words.iter().rposition(|w| w == "in" || w == "at" || w == "for")? + 1;

    let city: Vec<&str> = words[start..]
        .iter()
        .map(String::as_str)
        .take_while(|w| !LOCATION_STOP_WORDS.contains(w))
        .collect();

    (!city.is_empty()).then(|| city.join(" "))
}

/// Keep at most [`MAX_SPOKEN_SENTENCES`] sentences of a reply
#[must_use]
pub fn shorten_reply(reply: &str) -> String {
    let reply = reply.trim();
    let sentences: Vec<&str> = reply.split(". ").collect();

    if sentences.len() <= MAX_SPOKEN_SENTENCES {
        return reply.to_string();
    }

    let mut short = sentences[..MAX_SPOKEN_SENTENCES].join(". ");
    if !short.ends_with(['.', '!', '?']) {
        short.push('.');
    }
    short
}
