//! Numeric entry pad state: the typed buffer and which line field it edits.

use serde::{Deserialize, Serialize};

use crate::cart::Register;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumpadMode {
    #[default]
    Quantity,
    UnitPrice,
    DiscountPercent,
}

const MAX_BUFFER_LEN: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct NumericPad {
    mode: NumpadMode,
    buffer: String,
}

impl NumericPad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> NumpadMode {
        self.mode
    }

    pub fn value(&self) -> &str {
        &self.buffer
    }

    pub fn set_mode(&mut self, mode: NumpadMode) {
        self.mode = mode;
    }

    /// Append a key press. Accepts digits and a single decimal point.
    pub fn press(&mut self, key: char) {
        if self.buffer.len() >= MAX_BUFFER_LEN {
            return;
        }
        match key {
            '0'..='9' => self.buffer.push(key),
            '.' | ',' if !self.buffer.contains('.') => {
                if self.buffer.is_empty() {
                    self.buffer.push('0');
                }
                self.buffer.push('.');
            }
            _ => {}
        }
    }

    pub fn backspace(&mut self) {
        self.buffer.pop();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Apply the buffer to the register's selected line. The buffer is
    /// cleared only when the value was applied.
    pub fn apply(&mut self, register: &mut Register) -> bool {
        let applied = register.apply_numeric_entry(self.mode, &self.buffer);
        if applied {
            self.buffer.clear();
        }
        applied
    }
}
