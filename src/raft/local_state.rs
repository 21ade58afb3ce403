use crate::protocol::Member;
use std::fmt;

#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq)]
pub struct Term(i32);

impl Term {
    pub fn new(term: i32) -> Self {
        Term(term)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    pub(crate) fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PersistentLocalState holds what Raft requires to survive a restart for safety: the current
/// term and who we voted for in it.
///
/// Store methods are CAS-like. They return true if they mutated state.
pub trait PersistentLocalState: Send {
    /// Set current term to `new_term` iff it is larger than the current term. Clears the vote.
    fn store_term_if_increased(&mut self, new_term: Term) -> bool;

    /// Store our vote iff `expected_current_term` is the current term and we haven't voted in it.
    fn store_vote_for_term_if_unvoted(&mut self, expected_current_term: Term, vote: Member) -> bool;

    /// Return the new term. Used when transitioning to candidate.
    fn increment_term_and_vote_for_self(&mut self) -> Term;

    fn current_term(&self) -> Term;
    fn voted_for_current_term(&self) -> (Term, Option<&Member>);
}

// Kept in memory only. A restarted member starts from term 0 with no vote.
pub struct VolatileLocalState {
    current_term: Term,
    voted_for_this_term: Option<Member>,
    me: Member,
}

impl VolatileLocalState {
    pub fn new(me: Member) -> Self {
        VolatileLocalState {
            current_term: Term::new(0),
            voted_for_this_term: None,
            me,
        }
    }
}

impl PersistentLocalState for VolatileLocalState {
    fn store_term_if_increased(&mut self, new_term: Term) -> bool {
        if new_term <= self.current_term {
            return false;
        }

        self.current_term = new_term;
        self.voted_for_this_term = None;
        true
    }

    fn store_vote_for_term_if_unvoted(&mut self, expected_term: Term, vote: Member) -> bool {
        if expected_term != self.current_term || self.voted_for_this_term.is_some() {
            return false;
        }

        self.voted_for_this_term.replace(vote);
        true
    }

    fn increment_term_and_vote_for_self(&mut self) -> Term {
        self.current_term.incr();
        self.voted_for_this_term.replace(self.me.clone());

        self.current_term
    }

    fn current_term(&self) -> Term {
        self.current_term
    }

    fn voted_for_current_term(&self) -> (Term, Option<&Member>) {
        (self.current_term, self.voted_for_this_term.as_ref())
    }
}
