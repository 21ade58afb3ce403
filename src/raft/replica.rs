use crate::logstream::{LogStream, LogStreamError, LoggedEvent, RecordMetadata, ValueType};
use crate::protocol::{
    AppendRequest, AppendResponse, ConfigureRequest, ConfigureResponse, JoinRequest, JoinResponse, LeaveRequest,
    LeaveResponse, Member, PollRequest, PollResponse, VoteRequest, VoteResponse,
};
use crate::raft::configuration::Configuration;
use crate::raft::error::ReplicaError;
use crate::raft::leader_state::{cluster_commit_position, LeaderState};
use crate::raft::local_state::{PersistentLocalState, Term};
use crate::raft::raft_log::RaftLog;
use crate::record::{raft_intent, RaftRecordValue};
use chrono::Utc;
use std::collections::HashSet;
use std::convert::TryFrom;
use std::sync::Arc;

pub struct ReplicaConfig<S: PersistentLocalState> {
    pub logger: slog::Logger,
    pub topic_name: String,
    pub local_member: Member,
    /// Initial member list, including the local member.
    pub members: Vec<Member>,
    pub log_stream: Arc<dyn LogStream>,
    pub local_state: S,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

enum ElectionState {
    Follower { leader: Option<Member> },
    Candidate { votes: HashSet<Member> },
    Leader(LeaderState),
}

/// One member's share of a partition's consensus.
///
/// Replica is pure protocol: every handler takes a decoded request, updates local state and the
/// log, and returns the response to send back. Moving bytes between members and firing timers is
/// the caller's job.
pub struct Replica<S: PersistentLocalState> {
    logger: slog::Logger,
    partition_id: u16,
    topic_name: String,
    me: Member,
    configuration: Configuration,
    local_state: S,
    election_state: ElectionState,
    log: RaftLog,
}

impl<S: PersistentLocalState> Replica<S> {
    pub fn new(config: ReplicaConfig<S>) -> Self {
        let partition_id = config.log_stream.partition_id();
        let logger = config.logger.new(slog::o!(
            "partition" => partition_id,
            "member" => config.local_member.endpoint(),
        ));

        Replica {
            log: RaftLog::new(logger.clone(), config.log_stream),
            logger,
            partition_id,
            topic_name: config.topic_name,
            me: config.local_member,
            configuration: Configuration::initial(config.members),
            local_state: config.local_state,
            election_state: ElectionState::Follower { leader: None },
        }
    }

    pub fn role(&self) -> RaftRole {
        match self.election_state {
            ElectionState::Follower { .. } => RaftRole::Follower,
            ElectionState::Candidate { .. } => RaftRole::Candidate,
            ElectionState::Leader(_) => RaftRole::Leader,
        }
    }

    pub fn leader(&self) -> Option<&Member> {
        match &self.election_state {
            ElectionState::Follower { leader } => leader.as_ref(),
            ElectionState::Candidate { .. } => None,
            ElectionState::Leader(_) => Some(&self.me),
        }
    }

    pub fn current_term(&self) -> Term {
        self.local_state.current_term()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn commit_position(&self) -> i64 {
        self.log.commit_position()
    }

    pub fn local_member(&self) -> &Member {
        &self.me
    }

    // -- elections --

    /// Candidate's log is at least as up to date as ours: compare last entries, term first.
    fn is_log_up_to_date(&self, last_entry_term: i32, last_entry_position: i64) -> bool {
        (Term::new(last_entry_term), last_entry_position) >= self.log.latest_entry()
    }

    pub fn poll_request(&self) -> PollRequest {
        let (last_term, last_position) = self.log.latest_entry();
        PollRequest {
            partition_id: self.partition_id,
            term: self.current_term().as_i32(),
            last_entry_position: last_position,
            last_entry_term: last_term.as_i32(),
            topic_name: self.topic_name.clone(),
            candidate: Some(self.me.clone()),
        }
    }

    /// Non-binding: answers whether we would vote, without touching term or vote.
    pub fn handle_poll(&self, request: &PollRequest) -> PollResponse {
        let current_term = self.current_term();
        let granted = request.candidate.is_some()
            && Term::new(request.term) >= current_term
            && self.is_log_up_to_date(request.last_entry_term, request.last_entry_position);

        slog::debug!(
            self.logger,
            "Poll from {:?} for term {}: granted={}",
            request.candidate,
            request.term,
            granted
        );
        PollResponse {
            term: current_term.as_i32(),
            granted,
        }
    }

    pub fn start_election(&mut self) -> Result<VoteRequest, ReplicaError> {
        let term = self.local_state.increment_term_and_vote_for_self();
        slog::info!(self.logger, "Starting election for term {:?}", term);

        let mut votes = HashSet::new();
        votes.insert(self.me.clone());
        self.election_state = ElectionState::Candidate { votes };
        if self.configuration.quorum() <= 1 {
            self.become_leader()?;
        }

        let (last_term, last_position) = self.log.latest_entry();
        Ok(VoteRequest {
            partition_id: self.partition_id,
            term: term.as_i32(),
            last_entry_position: last_position,
            last_entry_term: last_term.as_i32(),
            topic_name: self.topic_name.clone(),
            candidate: Some(self.me.clone()),
        })
    }

    pub fn handle_vote(&mut self, request: &VoteRequest) -> VoteResponse {
        let request_term = Term::new(request.term);
        if request_term > self.current_term() {
            self.step_down(request_term);
        }
        let current_term = self.current_term();

        let granted = match &request.candidate {
            Some(candidate) if request_term == current_term => {
                if !self.is_log_up_to_date(request.last_entry_term, request.last_entry_position) {
                    false
                } else {
                    let (_, voted_for) = self.local_state.voted_for_current_term();
                    voted_for == Some(candidate)
                        || self
                            .local_state
                            .store_vote_for_term_if_unvoted(current_term, candidate.clone())
                }
            }
            _ => false,
        };

        slog::info!(
            self.logger,
            "Vote request from {:?} for term {}: granted={}",
            request.candidate,
            request.term,
            granted
        );
        VoteResponse {
            term: current_term.as_i32(),
            granted,
        }
    }

    pub fn handle_vote_response(&mut self, from: &Member, response: &VoteResponse) -> Result<(), ReplicaError> {
        let response_term = Term::new(response.term);
        let current_term = self.current_term();
        if response_term > current_term {
            self.step_down(response_term);
            return Ok(());
        }

        let quorum = self.configuration.quorum();
        let is_member = self.configuration.contains(from);
        let won = match &mut self.election_state {
            ElectionState::Candidate { votes } if response.granted && response_term == current_term && is_member => {
                votes.insert(from.clone());
                votes.len() >= quorum
            }
            _ => false,
        };

        if won {
            self.become_leader()?;
        }
        Ok(())
    }

    fn become_leader(&mut self) -> Result<(), ReplicaError> {
        let next_position = self.log.next_position();
        let others = self.configuration.members().iter().filter(|m| **m != self.me);
        self.election_state = ElectionState::Leader(LeaderState::new(others, next_position));
        slog::info!(self.logger, "Became leader for term {:?}", self.current_term());

        // The first entry of the term. Nothing before it commits until it does.
        let members = self.configuration.members().to_vec();
        self.append_configuration(members, raft_intent::MEMBER_ADDED)?;
        Ok(())
    }

    fn become_follower(&mut self, leader: Option<Member>) {
        let changed = match &self.election_state {
            ElectionState::Follower { leader: current } => *current != leader,
            _ => true,
        };
        if changed {
            slog::info!(
                self.logger,
                "Following {:?} in term {:?}",
                leader,
                self.current_term()
            );
        }
        self.election_state = ElectionState::Follower { leader };
    }

    fn step_down(&mut self, term: Term) {
        if self.local_state.store_term_if_increased(term) {
            self.become_follower(None);
        }
    }

    // -- replication --

    /// Leader only. Assigns position and term to `event` and appends it to the local log.
    pub fn append_entry(&mut self, mut event: LoggedEvent) -> Result<i64, ReplicaError> {
        if !matches!(self.election_state, ElectionState::Leader(_)) {
            return Err(ReplicaError::NotLeader("append entries"));
        }

        event.position = self.log.next_position();
        event.raft_term = self.current_term().as_i32();
        let position = self.log.append(event)?;
        self.try_commit();
        Ok(position)
    }

    /// Next request to send to `member`: its next entry if it is behind, a heartbeat otherwise.
    pub fn next_append_request(&self, member: &Member) -> Result<Option<AppendRequest>, ReplicaError> {
        let leader = match &self.election_state {
            ElectionState::Leader(leader) => leader,
            _ => return Err(ReplicaError::NotLeader("replicate")),
        };
        let next = match leader.progress(member) {
            Some(progress) => progress.next(),
            None => return Ok(None),
        };

        let previous = next - 1;
        let (previous_entry_position, previous_entry_term) = if previous < 1 {
            (-1, 0)
        } else {
            (previous, self.log.term_at(previous).map(|t| t.as_i32()).unwrap_or(0))
        };
        let entry = self.log.read(next).map(|e| e.encode()).transpose()?;

        Ok(Some(AppendRequest {
            partition_id: self.partition_id,
            term: self.current_term().as_i32(),
            previous_entry_position,
            previous_entry_term,
            commit_position: self.log.commit_position(),
            topic_name: self.topic_name.clone(),
            leader: Some(self.me.clone()),
            entry,
        }))
    }

    pub fn handle_append(&mut self, request: &AppendRequest) -> Result<AppendResponse, ReplicaError> {
        let request_term = Term::new(request.term);
        if request_term < self.current_term() {
            let (_, last_position) = self.log.latest_entry();
            return Ok(self.append_response(false, last_position));
        }

        if self.local_state.store_term_if_increased(request_term) {
            slog::info!(self.logger, "New term {:?} from append request", request_term);
        }
        self.become_follower(request.leader.clone());

        let previous_matches = request.previous_entry_position < 0
            || self.log.term_at(request.previous_entry_position) == Some(Term::new(request.previous_entry_term));
        if !previous_matches {
            let (_, last_position) = self.log.latest_entry();
            slog::debug!(
                self.logger,
                "Rejecting append after {} in term {}, log tail is {}",
                request.previous_entry_position,
                request.previous_entry_term,
                last_position
            );
            return Ok(self.append_response(false, last_position));
        }

        let mut last_new_position = request.previous_entry_position.max(-1);
        if let Some(bytes) = &request.entry {
            let event = LoggedEvent::try_from(&bytes[..])?;
            let position = request.previous_entry_position.max(0) + 1;
            if event.position != position {
                return Err(LogStreamError::NonContiguousAppend {
                    expected: position,
                    actual: event.position,
                }
                .into());
            }

            match self.log.term_at(position) {
                Some(term) if term.as_i32() == event.raft_term => {
                    // Already have it, a retransmit.
                }
                existing => {
                    if existing.is_some() {
                        self.log.truncate(position)?;
                    }
                    self.apply_configuration_entry(&event);
                    self.log.append(event)?;
                }
            }
            last_new_position = position;
        }

        self.log
            .ratchet_fwd_commit_position(request.commit_position.min(last_new_position));
        Ok(self.append_response(true, last_new_position))
    }

    fn append_response(&self, succeeded: bool, entry_position: i64) -> AppendResponse {
        AppendResponse {
            partition_id: self.partition_id,
            term: self.current_term().as_i32(),
            succeeded,
            entry_position,
            topic_name: self.topic_name.clone(),
            member: Some(self.me.clone()),
        }
    }

    pub fn handle_append_response(&mut self, response: &AppendResponse) {
        let response_term = Term::new(response.term);
        let current_term = self.current_term();
        if response_term > current_term {
            self.step_down(response_term);
            return;
        }

        let member = match &response.member {
            Some(member) => member,
            None => {
                slog::warn!(self.logger, "Append response without member, dropping it");
                return;
            }
        };
        let leader = match &mut self.election_state {
            ElectionState::Leader(leader) if response_term == current_term => leader,
            _ => return,
        };
        let progress = match leader.progress_mut(member) {
            Some(progress) => progress,
            None => {
                slog::warn!(self.logger, "Append response from unknown member {:?}", member);
                return;
            }
        };

        if response.succeeded {
            progress.ratchet_fwd_matched(response.entry_position);
            self.try_commit();
        } else {
            progress.rewind_log(&self.logger, response.entry_position);
        }
    }

    /// Commits the highest position a quorum holds, as long as it was written in this term.
    fn try_commit(&mut self) {
        let leader = match &self.election_state {
            ElectionState::Leader(leader) => leader,
            _ => return,
        };

        let (_, last_position) = self.log.latest_entry();
        let position = cluster_commit_position(leader.matched_positions(), last_position);
        if position >= leader.initial_position() && position > self.log.commit_position() {
            self.log.ratchet_fwd_commit_position(position);
        }
    }

    // -- membership --

    fn append_configuration(&mut self, members: Vec<Member>, intent: u8) -> Result<i64, ReplicaError> {
        let value = serde_json::to_vec(&RaftRecordValue {
            members: members.clone(),
        })?;
        let event = LoggedEvent::new(RecordMetadata::event(ValueType::Raft, intent), value)
            .with_timestamp(Utc::now().timestamp_millis());

        let position = self.append_entry(event)?;
        self.configuration = Configuration::new(members, position, self.current_term().as_i32());
        slog::info!(
            self.logger,
            "Configuration at position {}: {:?}",
            position,
            self.configuration.members()
        );
        Ok(position)
    }

    // Followers adopt a configuration as soon as its entry is in their log.
    fn apply_configuration_entry(&mut self, event: &LoggedEvent) {
        if event.metadata.value_type != ValueType::Raft {
            return;
        }

        match serde_json::from_slice::<RaftRecordValue>(&event.value) {
            Ok(value) => {
                self.configuration = Configuration::new(value.members, event.position, event.raft_term);
            }
            Err(e) => {
                slog::warn!(
                    self.logger,
                    "Ignoring unreadable configuration entry at {}: {}",
                    event.position,
                    e
                );
            }
        }
    }

    fn configuration_fields(&self) -> (i64, i32, Vec<Member>) {
        (
            self.configuration.entry_position(),
            self.configuration.entry_term(),
            self.configuration.members().to_vec(),
        )
    }

    pub fn handle_join(&mut self, request: &JoinRequest) -> Result<JoinResponse, ReplicaError> {
        let succeeded = match &request.member {
            Some(member) if self.role() == RaftRole::Leader => {
                if !self.configuration.contains(member) {
                    let members = self.configuration.with_member(member.clone());
                    let next_position = self.log.next_position();
                    if let ElectionState::Leader(leader) = &mut self.election_state {
                        leader.add_member(member.clone(), next_position);
                    }
                    self.append_configuration(members, raft_intent::MEMBER_ADDED)?;
                }
                true
            }
            _ => false,
        };

        let (position, term, members) = self.configuration_fields();
        Ok(JoinResponse {
            term: self.current_term().as_i32(),
            succeeded,
            configuration_entry_position: position,
            configuration_entry_term: term,
            members,
        })
    }

    pub fn handle_leave(&mut self, request: &LeaveRequest) -> Result<LeaveResponse, ReplicaError> {
        let succeeded = match &request.member {
            Some(member) if self.role() == RaftRole::Leader => {
                if self.configuration.contains(member) {
                    let members = self.configuration.without_member(member);
                    if let ElectionState::Leader(leader) = &mut self.election_state {
                        leader.remove_member(member);
                    }
                    self.append_configuration(members, raft_intent::MEMBER_REMOVED)?;
                }
                true
            }
            _ => false,
        };

        let (position, term, members) = self.configuration_fields();
        Ok(LeaveResponse {
            term: self.current_term().as_i32(),
            succeeded,
            configuration_entry_position: position,
            configuration_entry_term: term,
            members,
        })
    }

    pub fn configure_request(&self) -> ConfigureRequest {
        let (position, term, members) = self.configuration_fields();
        ConfigureRequest {
            partition_id: self.partition_id,
            term: self.current_term().as_i32(),
            configuration_entry_position: position,
            configuration_entry_term: term,
            members,
            topic_name: self.topic_name.clone(),
        }
    }

    /// Adopts the pushed configuration if it was decided later than ours.
    pub fn handle_configure(&mut self, request: &ConfigureRequest) -> ConfigureResponse {
        let request_term = Term::new(request.term);
        if request_term >= self.current_term() {
            self.step_down(request_term);

            let incoming = Configuration::new(
                request.members.clone(),
                request.configuration_entry_position,
                request.configuration_entry_term,
            );
            if incoming.is_newer_than(&self.configuration) {
                slog::info!(self.logger, "Adopting configuration {:?}", incoming.members());
                self.configuration = incoming;
            }
        }

        ConfigureResponse {
            term: self.current_term().as_i32(),
        }
    }
}
