/// Scripted chat model for tests.
///
/// Replies are queued per task; once a queue drains the task's default reply
/// (if any) is used. Every call is recorded.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatModel, ChatRequest, ChatTask, LlmError};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub task: ChatTask,
    pub prompt: String,
}

#[derive(Default)]
pub struct ScriptedChatModel {
    queued: Mutex<HashMap<ChatTask, VecDeque<String>>>,
    defaults: HashMap<ChatTask, String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedChatModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply for `task`.
    #[must_use]
    pub fn with_reply(self, task: ChatTask, reply: impl Into<String>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.entry(task).or_default().push_back(reply.into());
        }
        self
    }

    /// Reply used for `task` whenever its queue is empty.
    #[must_use]
    pub fn with_default(mut self, task: ChatTask, reply: impl Into<String>) -> Self {
        self.defaults.insert(task, reply.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, task: ChatTask) -> usize {
        self.calls().iter().filter(|c| c.task == task).count()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                task: request.task,
                prompt: request.prompt.to_string(),
            });
        }

        let queued = self
            .queued
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&request.task).and_then(VecDeque::pop_front));

        queued
            .or_else(|| self.defaults.get(&request.task).cloned())
            .ok_or_else(|| LlmError::InvalidResponse(format!("no scripted reply for {}", request.task)))
    }
}
