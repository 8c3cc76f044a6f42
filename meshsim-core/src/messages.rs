//! Frame variants exchanged over the wireless channel (§4.A).
//!
//! Constructors always set `hop_count = 0` and `path = []`; the task that
//! freshly emits a frame appends its own id to `path` before handing it to
//! the channel (mirrored by every forwarding handler in `node.rs`, which
//! pushes `self` onto `path` if it isn't already the last entry — this
//! lets a single "ensure I'm on my own path" rule serve both the
//! originator and every relay).

use crate::types::{DataId, NodeId, Position, SessionId};

/// One neighbor-presence beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    pub src: NodeId,
    pub pos: Position,
    pub seq: u64,
}

/// A node's routing-table snapshot, advertised to its neighbors. No
/// split-horizon or poisoned-reverse (§4.B) — the full table goes out
/// verbatim, including routes whose next hop is the recipient itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceVector {
    pub src: NodeId,
    pub vector: Vec<(NodeId, f64, NodeId)>,
    pub seq: u64,
}

/// Handshake request, the first phase of a session (§4.D).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReq {
    pub src: NodeId,
    pub dst: NodeId,
    pub session_id: SessionId,
    pub created_at_s: f64,
    pub path: Vec<NodeId>,
    pub hop_count: u32,
}

impl SessionReq {
    pub fn new(src: NodeId, dst: NodeId, session_id: SessionId, created_at_s: f64) -> Self {
        Self {
            src,
            dst,
            session_id,
            created_at_s,
            path: Vec::new(),
            hop_count: 0,
        }
    }
}

/// Handshake acknowledgment, traveling back from the responder to the
/// original initiator (§4.D).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAck {
    pub src: NodeId,
    pub dst: NodeId,
    pub session_id: SessionId,
    pub target: NodeId,
    pub created_at_s: f64,
    pub path: Vec<NodeId>,
    pub hop_count: u32,
}

impl SessionAck {
    pub fn new(src_responder: NodeId, dst_initiator: NodeId, session_id: SessionId, created_at_s: f64) -> Self {
        Self {
            src: src_responder,
            dst: dst_initiator,
            session_id,
            target: src_responder,
            created_at_s,
            path: Vec::new(),
            hop_count: 0,
        }
    }
}

/// Application payload, emitted only once a handshake has completed
/// (§4.D: "generated is incremented exactly once per successful handshake
/// completion at the initiator").
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub src: NodeId,
    pub dst: NodeId,
    pub payload: Vec<u8>,
    pub created_at_s: f64,
    pub path: Vec<NodeId>,
    pub hop_count: u32,
    pub id: DataId,
}

impl Data {
    pub fn new(src: NodeId, dst: NodeId, payload: Vec<u8>, created_at_s: f64, id: DataId) -> Self {
        Self {
            src,
            dst,
            payload,
            created_at_s,
            path: Vec::new(),
            hop_count: 0,
            id,
        }
    }
}

/// Every frame shape that can travel over the channel or sit in a node's
/// inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello(Hello),
    Dv(DistanceVector),
    SessionReq(SessionReq),
    SessionAck(SessionAck),
    Data(Data),
}

impl Frame {
    pub fn src(&self) -> NodeId {
        match self {
            Frame::Hello(m) => m.src,
            Frame::Dv(m) => m.src,
            Frame::SessionReq(m) => m.src,
            Frame::SessionAck(m) => m.src,
            Frame::Data(m) => m.src,
        }
    }
}

/// Shared "append self to path if not already last" step used by every
/// forwarding handler (§4.D Forwarding handlers, step (i)).
pub(crate) fn mark_forwarded(path: &mut Vec<NodeId>, me: NodeId) {
    if path.last() != Some(&me) {
        path.push(me);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_start_empty() {
        let req = SessionReq::new(NodeId(0), NodeId(1), SessionId(1), 0.0);
        assert!(req.path.is_empty());
        assert_eq!(req.hop_count, 0);
    }

    #[test]
    fn session_ack_target_is_responder() {
        let ack = SessionAck::new(NodeId(3), NodeId(0), SessionId(9), 1.0);
        assert_eq!(ack.target, NodeId(3));
        assert_eq!(ack.src, NodeId(3));
        assert_eq!(ack.dst, NodeId(0));
    }

    #[test]
    fn mark_forwarded_no_duplicate() {
        let mut path = vec![NodeId(0), NodeId(1)];
        mark_forwarded(&mut path, NodeId(1));
        assert_eq!(path, vec![NodeId(0), NodeId(1)]);
        mark_forwarded(&mut path, NodeId(2));
        assert_eq!(path, vec![NodeId(0), NodeId(1), NodeId(2)]);
    }
}
