//! Rule-based offline dialogue

use async_trait::async_trait;
use chrono::Local;
use rand::seq::SliceRandom;

use super::LocalDialogue;
use crate::{Error, Result};

const JOKES: &[&str] = &[
    "Why don't scientists trust atoms? Because they make up everything!",
    "Why did the scarecrow win an award? He was outstanding in his field!",
    "What do you call a fake noodle? An impasta!",
    "Why don't eggs tell jokes? They'd crack each other up!",
    "What did the ocean say to the beach? Nothing, it just waved!",
];

const FACTS: &[&str] = &[
    "Did you know? Honey never spoils!",
    "Octopuses have three hearts and blue blood!",
    "A day on Venus is longer than its year!",
    "Bananas are berries, but strawberries aren't!",
    "The Eiffel Tower can grow up to 6 inches in summer!",
];

const GREETINGS: &[&str] = &["hello", "hi", "hey", "namaste", "hola"];

const FALLBACK_REPLY: &str = "I'm sorry, I need a cloud connection for that.";

/// Which rule matched the user's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Greeting,
    Time,
    Date,
    Identity,
    Help,
    Joke,
    Fact,
    Unknown,
}

fn match_rule(text: &str) -> Rule {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let has = |word: &str| words.contains(&word);

    if has("time") {
        Rule::Time
    } else if has("date") || (has("day") && (has("today") || has("what"))) {
        Rule::Date
    } else if has("joke") || has("funny") {
        Rule::Joke
    } else if has("fact") || has("trivia") {
        Rule::Fact
    } else if lower.contains("who are you") || lower.contains("your name") {
        Rule::Identity
    } else if has("help") || lower.contains("what can you do") {
        Rule::Help
    } else if words.iter().any(|w| GREETINGS.contains(w)) {
        Rule::Greeting
    } else {
        Rule::Unknown
    }
}

/// Offline replies built from simple keyword rules
pub struct RuleDialogue {
    name: String,
}

impl RuleDialogue {
    /// Answer as `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn reply(&self, rule: Rule) -> String {
        let mut rng = rand::thread_rng();

        match rule {
            Rule::Greeting => format!("Hello! I'm {}. How can I help you?", self.name),
            Rule::Time => format!("The current time is {}", Local::now().format("%I:%M %p")),
            Rule::Date => format!("Today is {}", Local::now().format("%A, %B %d, %Y")),
            Rule::Identity => format!("I'm {}, your voice assistant.", self.name),
            Rule::Help => "I can tell you the time and date, share a joke or a fun fact, \
                           and check the weather or news when I'm online."
                .to_string(),
            Rule::Joke => JOKES.choose(&mut rng).copied().unwrap_or_default().to_string(),
            Rule::Fact => FACTS.choose(&mut rng).copied().unwrap_or_default().to_string(),
            Rule::Unknown => FALLBACK_REPLY.to_string(),
        }
    }
}

#[async_trait]
impl LocalDialogue for RuleDialogue {
    async fn resolve(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Dialogue("empty input".to_string()));
        }

        let rule = match_rule(text);
        tracing::debug!(rule = ?rule, "offline dialogue rule matched");

        Ok(self.reply(rule))
    }
}
