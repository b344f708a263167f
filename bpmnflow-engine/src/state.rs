use serde::{Deserialize, Serialize};

/// The unit of execution. A token marks one position the instance currently
/// occupies; `substate` appears only on call-activity tokens and carries the
/// called process's state in persisted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub position: String,
    pub owning_process_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substate: Option<ProcessState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_process_id: Option<String>,
}

impl Token {
    pub fn new(position: impl Into<String>, owning_process_id: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            owning_process_id: owning_process_id.into(),
            substate: None,
            called_process_id: None,
        }
    }
}

/// Token multiset of one instance. `(position, owner)` is deliberately not a
/// set key: a parallel-gateway position holds as many tokens as arrivals so
/// far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    pub tokens: Vec<Token>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn has_token_at(&self, position: &str) -> bool {
        self.tokens.iter().any(|t| t.position == position)
    }

    pub fn count_at(&self, position: &str) -> usize {
        self.tokens.iter().filter(|t| t.position == position).count()
    }

    pub fn find_first_at(&self, position: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.position == position)
    }

    pub fn find_first_at_mut(&mut self, position: &str) -> Option<&mut Token> {
        self.tokens.iter_mut().find(|t| t.position == position)
    }

    /// First-match removal, the advance primitive of `_emit_tokens`.
    pub fn remove_first_at(&mut self, position: &str) -> Option<Token> {
        let idx = self.tokens.iter().position(|t| t.position == position)?;
        Some(self.tokens.remove(idx))
    }

    pub fn remove_all_at(&mut self, position: &str) -> Vec<Token> {
        let (removed, kept) = std::mem::take(&mut self.tokens)
            .into_iter()
            .partition(|t| t.position == position);
        self.tokens = kept;
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_position_holds_multiple_tokens() {
        let mut state = ProcessState::new();
        state.put(Token::new("join", "p1"));
        state.put(Token::new("join", "p1"));
        assert_eq!(state.count_at("join"), 2);

        state.remove_first_at("join");
        assert_eq!(state.count_at("join"), 1);

        state.put(Token::new("join", "p1"));
        assert_eq!(state.remove_all_at("join").len(), 2);
        assert!(state.is_empty());
    }
}
