//! Sessions are one end of a bidirectional channel between two flows on
//! two nodes. The executor consults the session's initiation state when
//! deciding whether a peer may be sent anything at all.

use crate::domain::flow::Party;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: identifier for one end of a flow session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a fresh session identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session stands in its handshake with the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitiatedState {
    /// The initial message has not been confirmed by the peer yet
    Uninitiated,
    /// The peer has confirmed the session and given us its sink session id
    Live {
        /// The peer's receiving session id; outbound messages address this
        peer_sink_session_id: SessionId,
    },
    /// The session has been closed by either side
    Ended,
}

/// State carried per session inside a flow's checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// The counterparty on the other end of the session
    pub peer: Party,

    /// Handshake progress
    pub initiated_state: InitiatedState,

    /// Sequence number the next outbound message will carry
    pub next_sending_seq_no: u64,

    /// Highest sequence number received from the peer so far
    pub last_received_seq_no: u64,
}

impl SessionState {
    /// A session that has been created locally but not confirmed yet
    pub fn uninitiated(peer: Party) -> Self {
        Self {
            peer,
            initiated_state: InitiatedState::Uninitiated,
            next_sending_seq_no: 0,
            last_received_seq_no: 0,
        }
    }

    /// A confirmed session addressing the given peer sink
    pub fn live(peer: Party, peer_sink_session_id: SessionId) -> Self {
        Self {
            peer,
            initiated_state: InitiatedState::Live {
                peer_sink_session_id,
            },
            next_sending_seq_no: 0,
            last_received_seq_no: 0,
        }
    }

    /// A session that has been closed
    pub fn ended(peer: Party) -> Self {
        Self {
            peer,
            initiated_state: InitiatedState::Ended,
            next_sending_seq_no: 0,
            last_received_seq_no: 0,
        }
    }

    /// Whether the peer may currently be sent messages on this session
    pub fn is_live(&self) -> bool {
        matches!(self.initiated_state, InitiatedState::Live { .. })
    }
}
