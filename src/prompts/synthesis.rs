//! Prompts for chunk summarization and statement extraction.

/// Placeholders: {token_limit}, {text}
pub const SUMMARY_TEMPLATE: &str = "Please summarize the following text in a concise manner (keep it under {token_limit} tokens):\n\n\
Document text:\n{text}\n\n\
Summary:";

/// Placeholders: {context}, {text}
pub const STATEMENTS_TEMPLATE: &str = "Please analyze the following text and identify {context} that defines the text. \
For each identified statement; provide:\n\
1. The statement title\n\
2. Description of the statement\n\
3. Which collections this statement appears in\n\
4. Excerpt(s) from the collections and the citation with the page_number\n\
Example:\n\
1. Statement title\n\
2. Writing, whether traditional or digitalized, remains a complex and iterative process. \
The complexity of digitalized writing is further compounded by the use of multiple digital tools at different stages of the writing process.\n\
3. collection: A_Systematic_Review_of_ChatGPT\n\
4. Excerpt from the page_number: 39\n\
5. Mark Feng Teng Wright, et al.\n\n\
Text to analyze:\n\n{text}";

pub fn build_summary_prompt(text: &str, token_limit: usize) -> String {
    SUMMARY_TEMPLATE
        .replace("{token_limit}", &token_limit.to_string())
        .replace("{text}", text)
}

pub fn build_statements_prompt(context: &str, text: &str) -> String {
    STATEMENTS_TEMPLATE
        .replace("{context}", context)
        .replace("{text}", text)
}
