use std::fmt;

use thiserror::Error;

use crate::vm::value::Value;

/// Number of value slots in the operand stack.
pub const STACK_MAX: usize = 256;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("Stack overflow")]
    Overflow,

    #[error("Stack underflow")]
    Underflow,

    #[error("Stack slot {0} is out of range")]
    InvalidSlot(usize),
}

/// Fixed-capacity operand stack. Local variables live in the low slots of
/// the same array, addressed by index.
#[derive(Debug, Clone)]
pub struct Stack {
    values: Vec<Value>,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    pub fn new() -> Self {
        Self {
            values: Vec::with_capacity(STACK_MAX),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), StackError> {
        if self.values.len() >= STACK_MAX {
            return Err(StackError::Overflow);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pop the top value. An empty stack reports [`StackError::Underflow`];
    /// callers that want the `nil` sentinel use `unwrap_or_default()`.
    pub fn pop(&mut self) -> Result<Value, StackError> {
        self.values.pop().ok_or(StackError::Underflow)
    }

    /// Look `distance` slots down from the top; 0 is the top itself.
    pub fn peek(&self, distance: usize) -> Result<&Value, StackError> {
        self.values
            .len()
            .checked_sub(distance + 1)
            .map(|idx| &self.values[idx])
            .ok_or(StackError::Underflow)
    }

    pub fn get(&self, slot: usize) -> Result<&Value, StackError> {
        self.values.get(slot).ok_or(StackError::InvalidSlot(slot))
    }

    pub fn set(&mut self, slot: usize, value: Value) -> Result<(), StackError> {
        let target = self
            .values
            .get_mut(slot)
            .ok_or(StackError::InvalidSlot(slot))?;
        *target = value;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in &self.values {
            write!(f, "[ {value} ]")?;
        }
        Ok(())
    }
}
