use crate::error::{Error, Result};

/// One answer slot per question, by position. Empty string means unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerStore {
    slots: Vec<String>,
}

impl AnswerStore {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![String::new(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(String::as_str)
    }

    pub fn set(&mut self, index: usize, value: String) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            Error::BadRequest(format!(
                "Question index {} out of range (0..{})",
                index, len
            ))
        })?;
        *slot = value;
        Ok(())
    }

    pub fn is_answered(&self, index: usize) -> bool {
        self.get(index).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|v| !v.trim().is_empty()).count()
    }

    /// Fraction of answered slots in `[0, 1]`; zero when there are no questions.
    pub fn progress(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.answered_count() as f64 / self.slots.len() as f64
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(String::as_str)
    }
}

/// Current question pointer, clamped to `[0, len - 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    len: usize,
}

impl Navigator {
    pub fn new(len: usize) -> Self {
        Self { current: 0, len }
    }

    pub fn current(&self) -> Option<usize> {
        (self.len > 0).then_some(self.current)
    }

    pub fn can_go_previous(&self) -> bool {
        self.len > 0 && self.current > 0
    }

    pub fn can_go_next(&self) -> bool {
        self.len > 0 && self.current + 1 < self.len
    }

    pub fn next(&mut self) -> usize {
        if self.can_go_next() {
            self.current += 1;
        }
        self.current
    }

    pub fn prev(&mut self) -> usize {
        if self.can_go_previous() {
            self.current -= 1;
        }
        self.current
    }

    pub fn jump_to(&mut self, index: usize) -> Result<usize> {
        if index >= self.len {
            return Err(Error::BadRequest(format!(
                "Question index {} out of range (0..{})",
                index, self.len
            )));
        }
        self.current = index;
        Ok(self.current)
    }
}
