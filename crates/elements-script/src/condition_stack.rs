/// Tracks the nesting of IF/NOTIF/ELSE/ENDIF during script execution.
///
/// Logically this is a vector of booleans, one per open conditional. Only two facts about
/// it are ever observed, whether it is empty and whether every entry is true, so it is
/// stored as the implied depth plus the position of the first false entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionStack {
    size: u32,
    first_false_pos: u32,
}

impl Default for ConditionStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionStack {
    const NO_FALSE: u32 = u32::MAX;

    pub const fn new() -> Self {
        Self {
            size: 0,
            first_false_pos: Self::NO_FALSE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the current branch is executed.
    pub fn all_true(&self) -> bool {
        self.first_false_pos == Self::NO_FALSE
    }

    pub fn push_back(&mut self, value: bool) {
        if !value && self.all_true() {
            self.first_false_pos = self.size;
        }
        self.size += 1;
    }

    /// Closes the innermost conditional. The caller checks for emptiness first.
    pub fn pop_back(&mut self) {
        debug_assert!(!self.is_empty(), "pop_back on an empty condition stack");
        self.size = self.size.saturating_sub(1);
        if self.first_false_pos == self.size {
            self.first_false_pos = Self::NO_FALSE;
        }
    }

    /// Flips the innermost conditional. The caller checks for emptiness first.
    pub fn toggle_top(&mut self) {
        debug_assert!(!self.is_empty(), "toggle_top on an empty condition stack");
        let Some(top) = self.size.checked_sub(1) else {
            return;
        };
        if self.all_true() {
            self.first_false_pos = top;
        } else if self.first_false_pos == top {
            self.first_false_pos = Self::NO_FALSE;
        }
        // A false entry below the top stays the first false one.
    }
}
