pub const SYSTEM_PROMPT: &str = "You are an expert in medical education with extensive experience in content curation and taxonomy.
Your task is to accurately classify flashcards based on their relevance and importance to specific medical education videos.
Pay close attention to the video transcript to ensure each flashcard's content aligns with the video's context. Only classify flashcards as Primary or Secondary if they directly match the content in the transcript.
Make sure the output is a valid JSON object and follows this structure exactly:
{
    \"Flashcard_1\": \"Primary\",
    \"Flashcard_2\": \"Secondary\",
    \"Flashcard_3\": \"Non-Relevant\",
    ...
}";

const CATEGORY_GUIDE: &str = "a. Primary Flashcard: The content is crucial for understanding the core concepts presented in the video. It directly relates to the main topic and is essential for learners to grasp the key points discussed in the transcript.

b. Secondary Flashcard: The content provides valuable supplementary information that enhances understanding of the video's topic. While not critical, it offers useful context, examples, or deeper insights that are directly related to the content of the video transcript.

c. Non-Relevant Flashcard: The content has little to no direct relevance to the video's main topic or the content discussed in the transcript. It may be generally medical-related but does not significantly contribute to understanding the specific video content.

Classification Guidelines:

1. Thoroughly review the video transcript to understand the context and main educational objectives.
2. Ensure each flashcard's content is explicitly mentioned or directly related to the video transcript. Do not infer connections beyond the provided content.
3. Evaluate the centrality of each flashcard's information to the video's main educational objectives.
4. Assess whether each flashcard's information would be essential for a quiz or test on the video content.
5. Only classify a flashcard as Primary or Secondary if it matches the context and content of the video transcript. If not, classify it as Non-Relevant.
6. Please do not provide any additional context.
7. Strictly provide your classifications in a JSON format as follows:
{\"Flashcard_1\":\"Non-Relevant\",\"Flashcard_2\":\"Primary\",\"Flashcard_3\":\"Secondary\",\"Flashcard_4\":\"Non-Relevant\",\"Flashcard_5\":\"Primary\"}

Your classifications should be based solely on the provided information and your expertise in medical education.";

/// Response key for the flashcard at `position` (0-based) of a batch.
pub fn slot_key(position: usize) -> String {
    format!("Flashcard_{}", position + 1)
}

pub fn user_prompt(transcript: &str, flashcards: &[String]) -> String {
    let mut listing = String::new();
    for (i, text) in flashcards.iter().enumerate() {
        listing.push_str(&slot_key(i));
        listing.push_str(": ");
        listing.push_str(text);
        listing.push('\n');
    }
    format!(
        "Video Information:\n\nVideo Transcript: {transcript}\nFlashcard Information:\n\n{listing}\n{CATEGORY_GUIDE}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flashcards_are_listed_under_one_based_slots() {
        let prompt = user_prompt("Insulin talk.", &["Insulin lowers glucose".into(), "TSH axis".into()]);
        assert!(prompt.contains("Video Transcript: Insulin talk."));
        assert!(prompt.contains("Flashcard_1: Insulin lowers glucose\nFlashcard_2: TSH axis\n"));
        assert!(!prompt.contains("Flashcard_3:"));
    }
}
