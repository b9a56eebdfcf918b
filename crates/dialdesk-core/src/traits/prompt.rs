//! Operator confirmation.

use async_trait::async_trait;

#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Answer known up front, e.g. a `confirm` flag in a request body.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl OperatorPrompt for FixedAnswer {
    async fn confirm(&self, question: &str) -> bool {
        tracing::debug!(answer = self.0, "operator prompt: {question}");
        self.0
    }
}
