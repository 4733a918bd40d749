//! Prompt assembly for grounded answers.
//!
//! Pure string work: the retrieved chunks become the context block of a
//! fixed instruction template. No retrieval, no generation, no failure
//! modes.

const ANSWER_TEMPLATE: &str = "\
You are a friendly and helpful travel assistant. Answer the user's question using ONLY the provided context.

Guidelines:
- Be concise but informative
- If the answer is in the context, provide it directly
- If you don't know or it's not in the context, say \"I don't have that information in my documents.\"
- Use a warm, helpful tone
- End with a brief follow-up like \"Is there anything else you'd like to know?\"

Context:
{context}

Question:
{question}

Answer:
";

/// Render the instruction template with the chunk texts (joined in the
/// supplied order, blank line between them) and the question.
pub fn compose(question: &str, context_chunks: &[String]) -> String {
    let context = context_chunks.join("\n\n");
    ANSWER_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_prompt_contains_question_and_context() {
        let chunks = vec!["Halifax offers kayak tours.".to_string()];
        let prompt = compose("Tell me about the kayak tour.", &chunks);

        assert!(prompt.contains("Tell me about the kayak tour."));
        assert!(prompt.contains("Halifax offers kayak tours."));
    }

    #[test]
    fn empty_context_still_yields_well_formed_prompt() {
        let prompt = compose("What time is dinner?", &[]);

        assert!(prompt.contains("What time is dinner?"));
        assert!(prompt.contains("I don't have that information in my documents."));
        assert!(prompt.contains("Context:"));
    }

    #[test]
    fn chunks_keep_their_order_separated_by_blank_lines() {
        let chunks = vec![
            "first chunk".to_string(),
            "second chunk".to_string(),
            "third chunk".to_string(),
        ];
        let prompt = compose("question", &chunks);

        assert!(prompt.contains("first chunk\n\nsecond chunk\n\nthird chunk"));
        let first = prompt.find("first chunk").unwrap();
        let third = prompt.find("third chunk").unwrap();
        assert!(first < third);
    }
}
