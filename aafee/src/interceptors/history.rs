//! Conversation memory for interceptable stages.

use super::{InterceptableStage, SendInterceptor};
use crate::core::{Message, StageValue};
use crate::errors::FlowError;
use crate::stages::Stage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use tracing::debug;

/// Append-only message log used as a [`SendInterceptor`].
///
/// Before a send it inserts everything said so far between the template and
/// the new input, then records the input. After a send it records the
/// model's reply. The log grows without bound.
#[derive(Debug, Default)]
pub struct MessageHistory {
    messages: Mutex<Vec<Message>>,
}

impl MessageHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history seeded with earlier messages.
    #[must_use]
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    /// Returns a copy of the log.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Returns the number of recorded messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl SendInterceptor for MessageHistory {
    fn pre_send(&self, template: &[Message], input: &[Message]) -> Vec<Message> {
        let mut messages = self.messages.lock();
        let sent = template
            .iter()
            .chain(messages.iter())
            .chain(input)
            .cloned()
            .collect();
        messages.extend_from_slice(input);
        sent
    }

    fn post_send(&self, output: String) -> String {
        self.messages.lock().push(Message::agent(output.clone()));
        output
    }
}

/// Gives an interceptable stage memory of the conversation so far.
///
/// The provider owns the wrapped stage and is its only caller. One call
/// at a time is assumed; concurrent calls interleave their history.
pub struct StoredHistoryProvider<S> {
    name: String,
    stage: S,
    history: MessageHistory,
}

impl<S: InterceptableStage> StoredHistoryProvider<S> {
    /// Wraps `stage` with an empty history.
    pub fn new(stage: S) -> Self {
        Self::with_history(stage, MessageHistory::new())
    }

    /// Wraps `stage` with an existing history.
    pub fn with_history(stage: S, history: MessageHistory) -> Self {
        Self {
            name: format!("{}+history", stage.name()),
            stage,
            history,
        }
    }

    /// Returns the recorded history.
    #[must_use]
    pub const fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Returns the wrapped stage.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.stage
    }

    fn dump_history(&self) {
        let transcript = self
            .history
            .snapshot()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        debug!(stage = %self.name, history = %transcript, "conversation history");
    }
}

impl<S: fmt::Debug> fmt::Debug for StoredHistoryProvider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredHistoryProvider")
            .field("stage", &self.stage)
            .field("history_len", &self.history.messages.lock().len())
            .finish()
    }
}

#[async_trait]
impl<S: InterceptableStage> Stage for StoredHistoryProvider<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.dump_history();
        self.stage.execute_intercepted(input, &self.history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::OneShotAgent;
    use crate::testing::ScriptedLlm;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_pre_send_inserts_history_between_template_and_input() {
        let history = MessageHistory::with_messages(vec![
            Message::user("earlier"),
            Message::agent("reply"),
        ]);

        let sent = history.pre_send(&[Message::system("sys")], &[Message::user("now")]);

        assert_eq!(
            sent,
            vec![
                Message::system("sys"),
                Message::user("earlier"),
                Message::agent("reply"),
                Message::user("now"),
            ]
        );
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_post_send_records_reply_unchanged() {
        let history = MessageHistory::new();
        assert_eq!(history.post_send("answer".to_string()), "answer");
        assert_eq!(history.snapshot(), vec![Message::agent("answer")]);
    }

    #[tokio::test]
    async fn test_two_calls_carry_history() {
        let llm = Arc::new(ScriptedLlm::new(["first reply", "second reply"]));
        let agent = OneShotAgent::new("chat", llm.clone(), "You are terse.");
        let provider = StoredHistoryProvider::new(agent);

        provider.execute(Some(StageValue::text("one"))).await.unwrap();
        let output = provider.execute(Some(StageValue::text("two"))).await.unwrap();

        assert_eq!(output, StageValue::text("second reply"));
        assert_eq!(
            llm.calls()[1],
            vec![
                Message::system("You are terse."),
                Message::user("one"),
                Message::agent("first reply"),
                Message::user("two"),
            ]
        );
        assert_eq!(provider.history().len(), 4);
        assert_eq!(provider.name(), "chat+history");
    }
}
