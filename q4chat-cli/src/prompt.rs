//! Renders a conversation history into the prompt text fed to the scorer.

use crate::storage::{Message, Role};

/// Prompt template with one `%s` placeholder per section.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
    pub assistant: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        // Instruction/response format of the reference assistant
        Self {
            system: "%s\n".to_string(),
            user: "### Instruction:\n%s\n\n### Response:\n".to_string(),
            assistant: "%s\n".to_string(),
        }
    }
}

impl PromptTemplate {
    /// A minimal role-prefixed template.
    pub fn simple() -> Self {
        Self {
            system: "System: %s\n\n".to_string(),
            user: "User: %s\n\n".to_string(),
            assistant: "Assistant: %s\n\n".to_string(),
        }
    }

    /// Formats the full prompt: optional system text first, then every turn
    /// of the history in order.
    pub fn render(&self, system_prompt: Option<&str>, history: &[Message]) -> String {
        let mut prompt = String::new();

        if let Some(system) = system_prompt {
            prompt.push_str(&self.system.replace("%s", system));
        }

        for message in history {
            let template = match message.role {
                Role::System => &self.system,
                Role::User => &self.user,
                Role::Assistant => &self.assistant,
            };
            prompt.push_str(&template.replace("%s", &message.content));
        }

        prompt
    }
}
