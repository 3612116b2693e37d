//! Answer prompt construction.

use handlebars::Handlebars;
use ragstep_core::{AppError, AppResult};
use ragstep_llm::ChatMessage;

const SYSTEM_PROMPT: &str = "You respond only with material derived from the supplied context \
and follow the user instructions exactly.";

const USER_TEMPLATE: &str = "Use the context below together with the user's career choice to craft the answer.

Career choice: {{career_choice}}

Context:
{{context}}

Question: {{question}}
Deliver a roadmap that maps 10 levels of progression, assigning relevant skills at each level \
and keeping the response strictly grounded in the provided context.";

/// Each context as a `- ` bullet, separated by blank lines.
pub fn context_block(contexts: &[String]) -> String {
    contexts
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System and user messages for the answer step.
pub fn build_messages(
    question: &str,
    career_choice: &str,
    contexts: &[String],
) -> AppResult<Vec<ChatMessage>> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    // Contexts are plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("answer", USER_TEMPLATE)
        .map_err(|e| AppError::Other(format!("Failed to register answer template: {}", e)))?;

    let data = serde_json::json!({
        "career_choice": career_choice,
        "context": context_block(contexts),
        "question": question,
    });

    let user = handlebars
        .render("answer", &data)
        .map_err(|e| AppError::Other(format!("Failed to render answer template: {}", e)))?;

    Ok(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragstep_llm::ChatRole;

    #[test]
    fn test_context_block() {
        let contexts = vec!["Learn SQL".to_string(), "Ship a <service>".to_string()];
        assert_eq!(context_block(&contexts), "- Learn SQL\n\n- Ship a <service>");
        assert_eq!(context_block(&[]), "");
    }

    #[test]
    fn test_messages_inline_everything() {
        let contexts = vec!["Rust & SQL are core skills".to_string()];
        let messages = build_messages("What skills are needed?", "data engineer", &contexts).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("supplied context"));

        let user = &messages[1].content;
        assert_eq!(messages[1].role, ChatRole::User);
        assert!(user.contains("Career choice: data engineer"));
        assert!(user.contains("- Rust & SQL are core skills"));
        assert!(user.contains("Question: What skills are needed?"));
        assert!(user.contains("10 levels of progression"));
    }
}
