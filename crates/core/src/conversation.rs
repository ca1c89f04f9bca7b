use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    User,
    Agent,
    Result,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sql: Option<String>,
}

// Tool results are free-form on the wire; anything that is not a string is kept as its JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

impl ToolCall {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Value::Null,
            result: None,
            sql: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStep {
    pub role: StepRole,
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ConversationStep {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(StepRole::User, content)
    }

    #[must_use]
    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(StepRole::Agent, content)
    }

    #[must_use]
    pub fn result(content: impl Into<String>) -> Self {
        Self::new(StepRole::Result, content)
    }

    #[must_use]
    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match (self.role, self.tool_name.as_deref()) {
            (StepRole::User, _) => "You",
            (_, Some(tool_name)) => tool_name,
            (StepRole::Agent, None) => "Agent",
            (StepRole::Result, None) => "Result",
        }
    }

    fn new(role: StepRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationLog {
    steps: Vec<ConversationStep>,
}

impl ConversationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: ConversationStep) {
        self.steps.push(step);
    }

    pub fn replace(&mut self, steps: impl IntoIterator<Item = ConversationStep>) {
        self.steps.clear();
        self.steps.extend(steps);
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    #[must_use]
    pub fn steps(&self) -> &[ConversationStep] {
        &self.steps
    }

    #[must_use]
    pub fn last(&self) -> Option<&ConversationStep> {
        self.steps.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
