//! Hold predicates gating interpreter progress.

use std::time::Instant;

/// Zero-argument predicate; `true` means "do not make progress yet".
pub type Hold = Box<dyn FnMut() -> bool + Send>;

/// Hold that releases once `deadline` has passed.
pub fn until(deadline: Instant) -> Hold {
    Box::new(move || Instant::now() < deadline)
}

/// Permanent and temporary hold sets.
///
/// Permanent holds stay installed until [`clear`](Holds::clear). A temporary
/// hold is dropped the first time it returns `false` and does not hold the
/// tick on which it resolved.
#[derive(Default)]
pub struct Holds {
    permanent: Vec<Hold>,
    temporary: Vec<Hold>,
}

impl Holds {
    pub fn add(&mut self, hold: Hold) {
        self.permanent.push(hold);
    }

    pub fn add_temporary(&mut self, hold: Hold) {
        self.temporary.push(hold);
    }

    /// Evaluates every hold once, pruning resolved temporaries.
    pub fn check(&mut self) -> bool {
        self.temporary.retain_mut(|hold| hold());
        let temporary = !self.temporary.is_empty();
        // Every permanent predicate sees every tick.
        let permanent = self
            .permanent
            .iter_mut()
            .fold(false, |held, hold| hold() || held);
        temporary || permanent
    }

    pub fn clear_temporary(&mut self) {
        self.temporary.clear();
    }

    pub fn clear(&mut self) {
        self.permanent.clear();
        self.temporary.clear();
    }

    pub fn permanent_len(&self) -> usize {
        self.permanent.len()
    }

    pub fn temporary_len(&self) -> usize {
        self.temporary.len()
    }
}

impl std::fmt::Debug for Holds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holds")
            .field("permanent", &self.permanent.len())
            .field("temporary", &self.temporary.len())
            .finish()
    }
}
