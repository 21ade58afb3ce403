use crate::protocol::Member;
use std::collections::HashMap;

/// Replication progress the leader tracks for each other member, for one term.
pub(crate) struct LeaderState {
    members: HashMap<Member, MemberProgress>,
    // First position written in this term. Entries before it are only committed indirectly,
    // once something from this term commits.
    initial_position: i64,
}

impl LeaderState {
    pub(crate) fn new<'a>(others: impl Iterator<Item = &'a Member>, next_position: i64) -> Self {
        LeaderState {
            members: others
                .map(|member| (member.clone(), MemberProgress::new(next_position)))
                .collect(),
            initial_position: next_position,
        }
    }

    pub(crate) fn initial_position(&self) -> i64 {
        self.initial_position
    }

    pub(crate) fn progress_mut(&mut self, member: &Member) -> Option<&mut MemberProgress> {
        self.members.get_mut(member)
    }

    pub(crate) fn progress(&self, member: &Member) -> Option<&MemberProgress> {
        self.members.get(member)
    }

    pub(crate) fn add_member(&mut self, member: Member, next_position: i64) {
        self.members
            .entry(member)
            .or_insert_with(|| MemberProgress::new(next_position));
    }

    pub(crate) fn remove_member(&mut self, member: &Member) {
        self.members.remove(member);
    }

    pub(crate) fn matched_positions(&self) -> Vec<i64> {
        self.members.values().map(|p| p.matched).collect()
    }
}

pub(crate) struct MemberProgress {
    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: i64,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    // -1 until the member acknowledged anything.
    matched: i64,
}

impl MemberProgress {
    fn new(next_position: i64) -> Self {
        MemberProgress {
            next: next_position,
            matched: -1,
        }
    }

    pub(crate) fn next(&self) -> i64 {
        self.next
    }

    pub(crate) fn matched(&self) -> i64 {
        self.matched
    }

    /// The member confirmed it holds everything up to `position`.
    pub(crate) fn ratchet_fwd_matched(&mut self, position: i64) {
        if position > self.matched {
            self.matched = position;
        }
        if self.matched + 1 > self.next {
            self.next = self.matched + 1;
        }
    }

    /// The member rejected our previous entry. Step back, jumping straight past its log tail
    /// when it told us where that is.
    pub(crate) fn rewind_log(&mut self, logger: &slog::Logger, member_tail: i64) {
        let new_next = (self.next - 1).min(member_tail + 1).max(self.matched + 1).max(1);
        if new_next == self.next {
            slog::warn!(logger, "Can't rewind member log any further, next is {}", self.next);
            return;
        }
        self.next = new_next;
    }
}

/// Highest position replicated on a quorum, given what every *other* member matched. The leader
/// always holds the longest log, so it sits at the tail of the sorted list.
pub(crate) fn cluster_commit_position(mut others_matched: Vec<i64>, leader_position: i64) -> i64 {
    if others_matched.is_empty() {
        return leader_position;
    }

    others_matched.sort_unstable();

    // Overview of why algo is correct:
    // 1. add "me": cluster_size = others + 1
    // 2. majority = cluster_size / 2 + 1
    // 3. subtract "me": others needed = majority - 1
    // 4. take the `others needed`-th value from the right
    // which simplifies to index `len / 2`. When in doubt, read the unit tests.
    let quorum_idx = others_matched.len() / 2;
    others_matched[quorum_idx].min(leader_position)
}
