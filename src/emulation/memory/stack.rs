use crate::{
    emulation::{EmValue, EmulationError},
    Result,
};

/// The operand stack shared by all frames of a thread.
///
/// Callers leave their arguments on this stack and callees leave their return value on it.
#[derive(Debug, Clone, Default)]
pub struct EvaluationStack {
    values: Vec<EmValue>,
}

impl EvaluationStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> EvaluationStack {
        EvaluationStack::default()
    }

    /// Number of values on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the stack holds no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Push a value.
    pub fn push(&mut self, value: EmValue) {
        self.values.push(value);
    }

    /// Pop the top value.
    ///
    /// # Errors
    /// Returns [`EmulationError::StackUnderflow`] on an empty stack.
    pub fn pop(&mut self) -> Result<EmValue> {
        self.values
            .pop()
            .ok_or_else(|| EmulationError::StackUnderflow.into())
    }

    /// Pop the top two values as `(value1, value2)`, where `value2` was on top.
    ///
    /// # Errors
    /// Returns [`EmulationError::StackUnderflow`] if fewer than two values are present; the
    /// stack is left untouched in that case.
    pub fn pop_pair(&mut self) -> Result<(EmValue, EmValue)> {
        if self.values.len() < 2 {
            return Err(EmulationError::StackUnderflow.into());
        }

        let value2 = self.pop()?;
        let value1 = self.pop()?;
        Ok((value1, value2))
    }

    /// Remove the top `count` values, returned bottom first.
    ///
    /// # Errors
    /// Returns [`EmulationError::StackUnderflow`] if fewer than `count` values are present.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<EmValue>> {
        let Some(start) = self.values.len().checked_sub(count) else {
            return Err(EmulationError::StackUnderflow.into());
        };
        Ok(self.values.split_off(start))
    }

    /// The value `depth` entries below the top, `0` being the top.
    ///
    /// # Errors
    /// Returns [`EmulationError::StackUnderflow`] if the stack is not that deep.
    pub fn peek(&self, depth: usize) -> Result<&EmValue> {
        self.values
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| EmulationError::StackUnderflow.into())
    }

    /// Iterate from bottom to top.
    pub fn iter(&self) -> std::slice::Iter<'_, EmValue> {
        self.values.iter()
    }
}
