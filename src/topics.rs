use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assistant::AssistantApi;
use crate::errors::{GenError, GenResult};
use crate::poll::{poll_until_complete, PollOptions};
use crate::prompts::TOPICS_INSTRUCTION;

pub const KEYWORDS_PER_TOPIC: usize = 5;

const SEPARATOR: &str = " | ";
const TOPIC_PREFIX: &str = "Topic:";
const KEYWORDS_PREFIX: &str = "Keywords:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicKeywordCombo {
    pub topic: String,
    pub keywords: Vec<String>,
}

impl fmt::Display for TopicKeywordCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.topic, self.keywords.join(", "))
    }
}

/// Why a single response line was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComboParseError {
    #[error("missing \" | \" separator")]
    MissingSeparator,
    #[error("left segment does not start with \"Topic:\"")]
    MissingTopicPrefix,
    #[error("right segment does not start with \"Keywords:\"")]
    MissingKeywordsPrefix,
    #[error("empty topic")]
    EmptyTopic,
    #[error("expected 5 keywords, found {found}")]
    KeywordCount { found: usize },
}

/// Parse one `Topic: ... | Keywords: a, b, c, d, e` line.
pub fn parse_line(line: &str) -> Result<TopicKeywordCombo, ComboParseError> {
    let line = line.trim();
    let (topic_part, keywords_part) = line
        .split_once(SEPARATOR)
        .ok_or(ComboParseError::MissingSeparator)?;

    let topic = topic_part
        .trim()
        .strip_prefix(TOPIC_PREFIX)
        .ok_or(ComboParseError::MissingTopicPrefix)?
        .trim();
    let keywords = keywords_part
        .trim()
        .strip_prefix(KEYWORDS_PREFIX)
        .ok_or(ComboParseError::MissingKeywordsPrefix)?;

    if topic.is_empty() {
        return Err(ComboParseError::EmptyTopic);
    }

    let keywords: Vec<String> = keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keywords.len() != KEYWORDS_PER_TOPIC {
        return Err(ComboParseError::KeywordCount {
            found: keywords.len(),
        });
    }

    Ok(TopicKeywordCombo {
        topic: topic.to_string(),
        keywords,
    })
}

/// Parse an assistant reply into combinations. Invalid lines are logged and
/// skipped; only an empty result is an error.
pub fn parse_combinations(text: &str) -> GenResult<Vec<TopicKeywordCombo>> {
    let mut combos = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(combo) => combos.push(combo),
            Err(e) => warn!(line = lineno + 1, "Skipping invalid combination {:?}: {}", line, e),
        }
    }

    if combos.is_empty() {
        return Err(GenError::NoValidCombinations);
    }
    Ok(combos)
}

/// Ask the assistant for topic/keyword combinations and parse the reply.
pub async fn fetch_combinations(
    api: &dyn AssistantApi,
    poll: &PollOptions,
) -> GenResult<Vec<TopicKeywordCombo>> {
    let job = api.create_job(TOPICS_INSTRUCTION).await?;
    let reply = poll_until_complete(api, &job, poll).await?;
    debug!(reply_len = reply.len(), "topic reply received");

    let combos = parse_combinations(&reply)?;
    info!(count = combos.len(), "topic/keyword combinations ready");
    Ok(combos)
}
