//! The single in-memory packet record carried between every layer.
//!
//! There is no on-the-wire byte layout here — field identity and semantics
//! are preserved across layers, not byte positions. INC packets are not a
//! separate Rust type reached via downcasting; they are plain [`Packet`]s
//! with `inc` set, an explicit tagged variant rather than runtime type
//! discrimination.

use serde::{Deserialize, Serialize};

use crate::time::Tick;

pub type HostId = u32;
pub type FlowId = u32;
pub type Seq = u64;
pub type PathId = u32;

/// Transport-level packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    Data,
    Ack,
    Nack,
}

/// Collective communication primitive an INC packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectiveType {
    AllReduce,
    AllGather,
    Broadcast,
    ReduceScatter,
}

/// Reduction operator for a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionOp {
    Sum,
    Max,
    Min,
    Prod,
    And,
    Or,
}

/// Fields present only on a packet flowing through the INC processor.
/// Their presence (via `Packet::inc`) *is* the INC/non-INC discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncFields {
    pub collective: CollectiveType,
    pub reduction_op: ReductionOp,
    pub participant_count: u32,
    pub intermediate: bool,
}

/// A label a workload attaches to the packets it generates, carried through
/// untouched so the application layer can recognise its own traffic on
/// delivery (e.g. scenario 2's `INFERENCE_REQUEST` label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficLabel {
    TrainingCollective,
    InferenceRequest,
    HpcPointToPoint,
}

/// The UET packet. Every layer mutates a small set of fields that belong to
/// it (byte/bit length at PHY and link, path id at IP, ack sequence at
/// link) and otherwise passes the record through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub src: HostId,
    pub dst: HostId,
    pub flow_id: FlowId,
    pub transport_type: TransportType,
    pub seq: Seq,
    pub timestamp: Tick,
    pub byte_len: usize,
    pub bit_len: u64,
    pub spray_path: Option<u8>,
    pub path_id: Option<PathId>,
    pub llr_ack_seq: Option<Seq>,
    pub label: Option<TrafficLabel>,
    pub inc: Option<IncFields>,
}

impl Packet {
    /// Constructs a DATA packet with byte/bit length derived from
    /// `byte_len` (bit length is recomputed at PHY once FEC is applied).
    pub fn new_data(src: HostId, dst: HostId, flow_id: FlowId, seq: Seq, byte_len: usize, now: Tick) -> Self {
        Packet {
            src,
            dst,
            flow_id,
            transport_type: TransportType::Data,
            seq,
            timestamp: now,
            byte_len,
            bit_len: byte_len as u64 * 8,
            spray_path: None,
            path_id: None,
            llr_ack_seq: None,
            label: None,
            inc: None,
        }
    }

    pub fn is_inc(&self) -> bool {
        self.inc.is_some()
    }

    /// Builds an ACK echoing this packet's sequence number, addressed back
    /// to the original sender.
    pub fn make_ack(&self, now: Tick) -> Packet {
        Packet {
            src: self.dst,
            dst: self.src,
            flow_id: self.flow_id,
            transport_type: TransportType::Ack,
            seq: self.seq,
            timestamp: now,
            byte_len: 0,
            bit_len: 0,
            spray_path: None,
            path_id: None,
            llr_ack_seq: None,
            label: None,
            inc: None,
        }
    }

    /// Produces the INC result packet for this request: source/destination
    /// swapped, byte length replaced by the collective-specific transform,
    /// reduction op and participant count preserved.
    pub fn make_inc_result(&self, result_byte_len: usize, now: Tick) -> Option<Packet> {
        let mut inc = self.inc?;
        inc.intermediate = true;
        Some(Packet {
            src: self.dst,
            dst: self.src,
            flow_id: self.flow_id,
            transport_type: self.transport_type,
            seq: self.seq,
            timestamp: now,
            byte_len: result_byte_len,
            bit_len: result_byte_len as u64 * 8,
            spray_path: self.spray_path,
            path_id: None,
            llr_ack_seq: None,
            label: self.label,
            inc: Some(inc),
        })
    }
}

/// Link-level ack type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlrAckType {
    Positive,
    Negative,
}

/// Link-level ack: a control packet, never buffered beyond delivery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LlrAck {
    pub ack_seq: Seq,
    pub ack_type: LlrAckType,
    pub path_id: PathId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_echoes_sequence_and_swaps_endpoints() {
        let pkt = Packet::new_data(1, 2, 100, 7, 512, 0);
        let ack = pkt.make_ack(10);
        assert_eq!(ack.seq, 7);
        assert_eq!(ack.src, 2);
        assert_eq!(ack.dst, 1);
        assert_eq!(ack.transport_type, TransportType::Ack);
    }

    #[test]
    fn inc_result_swaps_endpoints_and_preserves_collective_fields() {
        let mut pkt = Packet::new_data(3, 9, 1, 0, 1024, 0);
        pkt.inc = Some(IncFields {
            collective: CollectiveType::AllGather,
            reduction_op: ReductionOp::Sum,
            participant_count: 8,
            intermediate: false,
        });
        let result = pkt.make_inc_result(8192, 50).unwrap();
        assert_eq!(result.src, 9);
        assert_eq!(result.dst, 3);
        assert_eq!(result.byte_len, 8192);
        let inc = result.inc.unwrap();
        assert_eq!(inc.participant_count, 8);
        assert!(inc.intermediate);
    }

    #[test]
    fn non_inc_packet_has_no_inc_fields() {
        let pkt = Packet::new_data(1, 2, 1, 0, 64, 0);
        assert!(!pkt.is_inc());
        assert!(pkt.make_inc_result(64, 0).is_none());
    }
}
