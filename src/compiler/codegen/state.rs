use std::collections::HashMap;

/**
 Maps variable names to their stack positions during code generation.

 Positions are absolute offsets in the virtual stack coordinate system the
 generator runs (function entry is 0 and grows negative); the offset used
 in an instruction is `position - current_sp`. Each name keeps a stack of
 positions so an inner scope's declaration shadows the outer one until the
 scope closes and `pop_scope` drops it.
*/
pub struct FrameState {
    positions: HashMap<String, Vec<i32>>,
}

impl FrameState {
    pub fn new() -> Self {
        FrameState {
            positions: HashMap::new(),
        }
    }

    /// Binds `name` at `position`, shadowing any outer binding.
    pub fn set(&mut self, name: &str, position: i32) {
        self.positions.entry(name.into()).or_default().push(position);
    }

    /// The innermost binding of `name`.
    pub fn get(&self, name: &str) -> Option<i32> {
        self.positions.get(name).and_then(|v| v.last().copied())
    }

    /// Drops the innermost binding of every name declared in a closing
    /// scope. Names the scope declared but the generator never bound
    /// (function symbols) are ignored.
    pub fn pop_scope<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        for name in names {
            if let Some(stack) = self.positions.get_mut(name) {
                stack.pop();
                if stack.is_empty() {
                    self.positions.remove(name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowed_binding_returns_after_pop() {
        let mut state = FrameState::new();
        state.set("x", -8);
        state.set("x", -12);
        assert_eq!(state.get("x"), Some(-12));
        state.pop_scope(["x"].iter().copied());
        assert_eq!(state.get("x"), Some(-8));
        state.pop_scope(["x"].iter().copied());
        assert_eq!(state.get("x"), None);
    }

    #[test]
    fn popping_an_unbound_name_is_harmless() {
        let mut state = FrameState::new();
        state.set("x", 0);
        state.pop_scope(["f", "x"].iter().copied());
        assert_eq!(state.get("x"), None);
    }
}
