use crate::protocol::Member;

/// The member list of a partition and where in the log it was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    members: Vec<Member>,
    entry_position: i64,
    entry_term: i32,
}

impl Configuration {
    /// Configuration a member boots with, before any configuration entry is known.
    pub fn initial(members: Vec<Member>) -> Self {
        Configuration {
            members,
            entry_position: -1,
            entry_term: -1,
        }
    }

    pub fn new(members: Vec<Member>, entry_position: i64, entry_term: i32) -> Self {
        Configuration {
            members,
            entry_position,
            entry_term,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn entry_position(&self) -> i64 {
        self.entry_position
    }

    pub fn entry_term(&self) -> i32 {
        self.entry_term
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.members.contains(member)
    }

    /// Number of votes or acknowledgements, counting our own, needed to win or commit.
    pub fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Configurations are ordered by the log entry that introduced them, term first.
    pub fn is_newer_than(&self, other: &Configuration) -> bool {
        (self.entry_term, self.entry_position) > (other.entry_term, other.entry_position)
    }

    pub(crate) fn with_member(&self, member: Member) -> Vec<Member> {
        let mut members = self.members.clone();
        members.push(member);
        members
    }

    pub(crate) fn without_member(&self, member: &Member) -> Vec<Member> {
        self.members.iter().filter(|m| *m != member).cloned().collect()
    }
}
