//! Prompt templates
//!
//! Plain text with `{placeholder}` markers. [`render`] substitutes in a single
//! pass, so text pasted into a placeholder is never expanded again.

use crate::types::{ChatTurn, RetrievedChunk, Role, Stage};

pub const NO_CONTEXT: &str = "No relevant context found.";

pub const INTENT_PROMPT: &str = r#"You are an intent classification assistant for a chatbot.

Your task is to classify the user's message into exactly ONE of these categories:

- RAG_QA   : The user is asking a question that likely requires knowledge from documents,
             references, or a knowledge base. Examples: "What does the API do?",
             "Summarize the internal design doc", "How does the payment flow work?"
- CHITCHAT : The user is having casual conversation, greetings, or small talk.
             Examples: "Hi, how are you?", "Tell me a joke", "Who are you?"
- OTHER    : Anything else that is clearly neither RAG_QA nor CHITCHAT.

Rules:
- Respond with ONLY one of: RAG_QA, CHITCHAT, OTHER.
- Do not add explanations or any other text.

User message:
{question}

Your answer (ONE of: RAG_QA, CHITCHAT, OTHER):"#;

pub const CONDENSE_QUESTION_PROMPT: &str = r#"You rewrite follow-up questions into standalone questions.

You will be given a chat history and the user's latest question.
Rewrite ONLY the latest user question so that it can be understood without
the rest of the conversation.

- Do not add new information.
- Do not drop important details.
- Resolve pronouns such as "it", "they" or "that" into the names and entities they refer to.
- Reply with the rewritten question only.

Chat history:
{chat_history}

Latest user question:
{question}

Standalone question:"#;

pub const ANSWER_PROMPT: &str = r#"You are a helpful assistant that answers questions using ONLY the provided context.

Hard rules:
- Use ONLY the CONTEXT. Do not use outside knowledge.
- If the answer is not in the context, say: "I don't know from the provided context."
- Keep it short: brief paragraphs and bullets, no essays.
- Follow the output format exactly (same headings, same order).
- Do not mention "RAG", "prompt" or "context" unless the user asks.

Citations:
- Context chunks are prefixed like [S1], [S2].
- When you use a fact from a chunk, end the sentence with its marker, e.g. [S1].
- Only cite markers that appear in the CONTEXT.

CONTEXT:
{context}

USER QUESTION:
{question}

TONE (optional): {tone}
STYLE (optional): {style}

Output format:

Answer:
<1-4 sentences. Direct answer, no preamble, with citations.>

Key points:
- <bullet> [S#]
- <bullet> [S#]

Why (brief):
<1-3 sentences of reasoning grounded in the context, with citations.>

If you need more info:
- <Up to 2 specific follow-up questions, or "None.">"#;

pub const SELF_CHECK_PROMPT: &str = r#"You review and improve answers against their source context.

You will be given the user's question, the context used to answer it and a draft answer.

1. Check that every statement in the draft is supported by the context.
2. Correct inaccuracies and remove anything the context does not support.
3. Add important missing details from the context.
4. Keep the structure and citations of the draft.

If the context does not contain enough information, say so explicitly.

Question:
{question}

Context:
{context}

Draft answer:
{draft_answer}

Improved final answer:"#;

pub const SUGGEST_QUESTIONS_PROMPT: &str = r#"You suggest follow-up questions for a user chatting with a document assistant.

You will be given the user's question, the assistant's answer and the context used.

- Propose 3 to 5 specific, relevant follow-up questions the user could ask next.
- Do NOT repeat the original question.
- Do NOT mention that you are an AI.
- Return ONLY a JSON array of strings. No extra text.

Example output:
["Follow-up question 1", "Follow-up question 2", "Follow-up question 3"]

User question:
{question}

Assistant answer:
{answer}

Context used:
{context}

JSON array of follow-up questions:"#;

pub const CHITCHAT_SYSTEM_PROMPT: &str = r#"You are a friendly, concise AI assistant.

You can greet the user, answer casual questions and engage in light small talk.

Be polite and clear. Never pretend to have access to private data or documents.
If the user asks about specific internal documents or knowledge bases, explain
that you can only answer general questions in this mode."#;

pub const CHITCHAT_USER_PROMPT: &str = r#"Conversation so far:
{history}

User message:
{question}

Assistant reply (tone={tone}, style={style}):"#;

/// A rendered prompt, tagged with the stage that sends it
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub task: Stage,
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(task: Stage, user: String) -> Self {
        Self {
            task,
            system: None,
            user,
        }
    }
}

/// Replace `{name}` markers with values. Unknown markers are left untouched.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match replacement {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// `User: ...` / `Assistant: ...` lines for the last `max_turns` turns
pub fn format_history(history: &[ChatTurn], max_turns: usize) -> String {
    let start = history.len().saturating_sub(max_turns);
    history[start..]
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number each chunk `[S1]`, `[S2]`... with its metadata, then its text
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let meta = chunk
            .metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        if meta.is_empty() {
            out.push_str(&format!("[S{}]\n", i + 1));
        } else {
            out.push_str(&format!("[S{}] {}\n", i + 1, meta));
        }
        out.push_str(chunk.content.trim());
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

pub fn intent_prompt(question: &str) -> Prompt {
    Prompt::user(Stage::Classify, render(INTENT_PROMPT, &[("question", question)]))
}

pub fn condense_prompt(history: &str, question: &str) -> Prompt {
    Prompt::user(
        Stage::Rewrite,
        render(
            CONDENSE_QUESTION_PROMPT,
            &[("chat_history", history), ("question", question)],
        ),
    )
}

pub fn answer_prompt(context: &str, question: &str, tone: &str, style: &str) -> Prompt {
    let context = if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    };
    Prompt::user(
        Stage::Answer,
        render(
            ANSWER_PROMPT,
            &[
                ("context", context),
                ("question", question),
                ("tone", tone),
                ("style", style),
            ],
        ),
    )
}

pub fn self_check_prompt(question: &str, context: &str, draft: &str) -> Prompt {
    Prompt::user(
        Stage::SelfCheck,
        render(
            SELF_CHECK_PROMPT,
            &[
                ("question", question),
                ("context", context),
                ("draft_answer", draft),
            ],
        ),
    )
}

pub fn suggestions_prompt(question: &str, answer: &str, context: &str) -> Prompt {
    Prompt::user(
        Stage::Suggest,
        render(
            SUGGEST_QUESTIONS_PROMPT,
            &[("question", question), ("answer", answer), ("context", context)],
        ),
    )
}

pub fn chitchat_prompt(history: &str, question: &str, tone: &str, style: &str) -> Prompt {
    let history = if history.is_empty() { "(none)" } else { history };
    Prompt {
        task: Stage::Chitchat,
        system: Some(CHITCHAT_SYSTEM_PROMPT.to_string()),
        user: render(
            CHITCHAT_USER_PROMPT,
            &[
                ("history", history),
                ("question", question),
                ("tone", tone),
                ("style", style),
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_is_single_pass() {
        let out = render("Q: {question} / {missing}", &[("question", "what is {question}?")]);
        assert_eq!(out, "Q: what is {question}? / {missing}");
    }

    #[test]
    fn test_render_unbalanced_brace() {
        assert_eq!(render("a { b", &[("b", "x")]), "a { b");
    }

    #[test]
    fn test_format_history_keeps_last_turns() {
        let history = vec![
            ChatTurn::user("one"),
            ChatTurn::assistant("two"),
            ChatTurn::user("three"),
        ];
        assert_eq!(format_history(&history, 2), "Assistant: two\nUser: three");
        assert_eq!(format_history(&[], 5), "");
    }

    #[test]
    fn test_format_context_numbers_sources() {
        let mut metadata = BTreeMap::new();
        metadata.insert("namespace".to_string(), "kb".to_string());
        metadata.insert("filename".to_string(), "a.md".to_string());
        let chunk = RetrievedChunk {
            id: "1".into(),
            title: None,
            snippet: String::new(),
            metadata,
            score: 1.0,
            content: "Body text".into(),
        };

        let context = format_context(&[chunk.clone(), chunk]);
        assert!(context.starts_with("[S1] filename=a.md, namespace=kb\nBody text"));
        assert!(context.contains("[S2] filename=a.md"));
    }

    #[test]
    fn test_empty_context_placeholder() {
        let prompt = answer_prompt("", "Why?", "neutral", "concise");
        assert_eq!(prompt.task, Stage::Answer);
        assert!(prompt.user.contains(NO_CONTEXT));
        assert!(prompt.user.contains("USER QUESTION:\nWhy?"));
    }

    #[test]
    fn test_chitchat_prompt_has_system() {
        let prompt = chitchat_prompt("", "Hi", "casual", "concise");
        assert_eq!(prompt.system.as_deref(), Some(CHITCHAT_SYSTEM_PROMPT));
        assert!(prompt.user.contains("(none)"));
        assert!(prompt.user.contains("tone=casual"));
    }
}
