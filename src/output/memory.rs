use super::manager::Output;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Info(String),
    Warning(String),
    Error(String),
    Result(String),
    Check { target: String, check: String, ok: bool },
}

/// Records every message, in order.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    pub messages: Vec<Message>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Error(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Warning(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Info(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Result(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Output for MemoryOutput {
    fn info(&mut self, message: &str) {
        self.messages.push(Message::Info(message.to_string()));
    }

    fn warning(&mut self, message: &str) {
        self.messages.push(Message::Warning(message.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.messages.push(Message::Error(message.to_string()));
    }

    fn result(&mut self, line: &str) {
        self.messages.push(Message::Result(line.to_string()));
    }

    fn check_result(&mut self, target: &str, check: &str, ok: bool, _hint: &str) {
        self.messages.push(Message::Check {
            target: target.to_string(),
            check: check.to_string(),
            ok,
        });
    }

    fn error_occurred(&self) -> bool {
        self.messages.iter().any(|m| matches!(m, Message::Error(_)))
    }

    fn close(&mut self) -> i32 {
        if self.error_occurred() { 1 } else { 0 }
    }
}
