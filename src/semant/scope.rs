//! A stack of name→type mappings (§3), one frame per nested `let`/`case`/
//! formal-parameter scope plus the method-level frame seeded with `self`.
//!
//! Grounded directly on the original `Scope::add_if_can`/`Scope::find`
//! contract: `self` can never be (re)defined, and redefinition within the
//! *same* frame is an error while shadowing across frames is allowed.

use crate::ast::SELF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddResult {
    Ok,
    Reserved,
    Redefined,
}

pub struct Scope {
    frames: Vec<Vec<(String, String)>>,
}

impl Scope {
    pub fn new(self_type: &str) -> Self {
        Self {
            frames: vec![vec![(SELF.to_string(), self_type.to_string())]],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn add_if_can(&mut self, name: &str, ty: &str) -> AddResult {
        if name == SELF {
            return AddResult::Reserved;
        }
        let frame = self.frames.last_mut().expect("scope has at least one frame");
        if frame.iter().any(|(n, _)| n == name) {
            return AddResult::Redefined;
        }
        frame.push((name.to_string(), ty.to_string()));
        AddResult::Ok
    }

    /// Looks up `name` starting `scope_shift` frames back from the top.
    pub fn find(&self, name: &str, scope_shift: usize) -> Option<&str> {
        let top = self.frames.len().saturating_sub(scope_shift);
        for frame in self.frames[..top].iter().rev() {
            if let Some((_, ty)) = frame.iter().rev().find(|(n, _)| n == name) {
                return Some(ty);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_seeded_and_reserved() {
        let mut scope = Scope::new("A");
        assert_eq!(scope.find(SELF, 0), Some("A"));
        assert_eq!(scope.add_if_can(SELF, "B"), AddResult::Reserved);
    }

    #[test]
    fn test_redefinition_in_same_frame() {
        let mut scope = Scope::new("A");
        scope.push();
        assert_eq!(scope.add_if_can("x", "Int"), AddResult::Ok);
        assert_eq!(scope.add_if_can("x", "Bool"), AddResult::Redefined);
    }

    #[test]
    fn test_shadowing_across_frames_is_allowed() {
        let mut scope = Scope::new("A");
        scope.push();
        scope.add_if_can("x", "Int");
        scope.push();
        assert_eq!(scope.add_if_can("x", "Bool"), AddResult::Ok);
        assert_eq!(scope.find("x", 0), Some("Bool"));
        scope.pop();
        assert_eq!(scope.find("x", 0), Some("Int"));
    }
}
