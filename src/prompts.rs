use crate::assistant::AssistantApi;
use crate::errors::GenResult;
use crate::poll::{poll_until_complete, PollOptions};

pub const TOPICS_INSTRUCTION: &str = r#"Generate 5 unique combinations of topics and keywords for creating Midjourney prompts. Each combination should have a main topic and exactly 5 related keywords that can enhance the visual description. Format the response as a list with each line containing "Topic: [topic] | Keywords: [keyword1], [keyword2], [keyword3], [keyword4], [keyword5]". Do not number the lines or add any other text. Make the combinations diverse and interesting."#;

const PROMPT_RULES: &str = r#"Include artistic or photography style, lighting, mood, camera angle, and any relevant parameters.
Make it creative and unique. It could be portrait, wide or panoramic aspect ratio.
Do not include "/imagine prompt". For the prompt parameter, please make sure you use "--".
Do not add "." at the end of the prompt.
Your format response is just pure the prompt: [Your response here]"#;

/// Instruction used when no topic stage runs.
pub fn flat_instruction() -> String {
    format!(
        "Generate a detailed Midjourney prompt about a subject of your choice.\n{}",
        PROMPT_RULES
    )
}

pub fn keyword_instruction(topic: &str, keywords: &[String]) -> String {
    format!(
        "Generate a detailed Midjourney prompt about the topic: {}\nUsing these keywords: {}\n{}",
        topic,
        keywords.join(", "),
        PROMPT_RULES
    )
}

/// Trim whitespace and a single trailing period.
pub fn clean_prompt(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_suffix('.').unwrap_or(trimmed).trim_end()
}

/// Run one stateless generation job and return the cleaned prompt text.
pub async fn generate_prompt(
    api: &dyn AssistantApi,
    poll: &PollOptions,
    instruction: &str,
) -> GenResult<String> {
    let job = api.create_job(instruction).await?;
    let raw = poll_until_complete(api, &job, poll).await?;
    Ok(clean_prompt(&raw).to_string())
}
