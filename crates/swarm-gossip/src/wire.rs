//! Wire codec
//!
//! Every gossip datagram is one fixed-size frame:
//!
//! ```text
//! HELLO            [0x01][node_id: u32]                                        [tag: 32]
//! MIGRATE_FORMULA  [0x02][node_id: u32][count: u8][digits: 32][fitness: f64]  [tag: 32]
//! ACK              [0x03][status: u8]                                          [tag: 32]
//! ```
//!
//! Integers and the fitness are big-endian. `tag` is a keyed BLAKE3 hash over
//! every byte before it. Decoding authenticates before it looks at the tag
//! byte, so a forged frame is never interpreted as any message kind.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use swarm_common::{AuthKey, NodeId, WireError, AUTH_TAG_LEN, MAX_GENE_LEN};
use swarm_darwinian::{Formula, Gene};

pub const TAG_HELLO: u8 = 0x01;
pub const TAG_MIGRATE_FORMULA: u8 = 0x02;
pub const TAG_ACK: u8 = 0x03;

pub const HELLO_FRAME_LEN: usize = 1 + 4 + AUTH_TAG_LEN;
pub const MIGRATE_FRAME_LEN: usize = 1 + 4 + 1 + MAX_GENE_LEN + 8 + AUTH_TAG_LEN;
pub const ACK_FRAME_LEN: usize = 1 + 1 + AUTH_TAG_LEN;

/// Largest frame this protocol produces
pub const MAX_FRAME_LEN: usize = MIGRATE_FRAME_LEN;

/// Shortest buffer that can hold a tag byte and an authentication tag
const MIN_FRAME_LEN: usize = 1 + AUTH_TAG_LEN;

/// ACK status: formula queued for the receiving application
pub const ACK_ACCEPTED: u8 = 0;
/// ACK status: receiver's event queue was full, formula not delivered
pub const ACK_QUEUE_FULL: u8 = 1;

/// Decoded gossip message
#[derive(Debug, Clone, PartialEq)]
pub enum NetMessage {
    Hello {
        node_id: NodeId,
    },
    MigrateFormula {
        node_id: NodeId,
        gene: Gene,
        fitness: f64,
    },
    Ack {
        status: u8,
    },
}

impl NetMessage {
    /// MIGRATE_FORMULA carrying `formula`'s gene and fitness
    pub fn migrate(node_id: NodeId, formula: &Formula) -> Self {
        NetMessage::MigrateFormula {
            node_id,
            gene: formula.gene,
            fitness: formula.fitness,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            NetMessage::Hello { .. } => TAG_HELLO,
            NetMessage::MigrateFormula { .. } => TAG_MIGRATE_FORMULA,
            NetMessage::Ack { .. } => TAG_ACK,
        }
    }

    /// Encoded size including the authentication tag
    pub fn frame_len(&self) -> usize {
        match self {
            NetMessage::Hello { .. } => HELLO_FRAME_LEN,
            NetMessage::MigrateFormula { .. } => MIGRATE_FRAME_LEN,
            NetMessage::Ack { .. } => ACK_FRAME_LEN,
        }
    }

    /// Sender id, for the kinds that carry one
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            NetMessage::Hello { node_id } | NetMessage::MigrateFormula { node_id, .. } => {
                Some(*node_id)
            }
            NetMessage::Ack { .. } => None,
        }
    }
}

/// Frame encoder/decoder bound to one swarm key
#[derive(Debug, Clone)]
pub struct WireCodec {
    key: AuthKey,
}

impl WireCodec {
    pub fn new(key: AuthKey) -> Self {
        Self { key }
    }

    /// Serialize and authenticate `message`
    pub fn encode(&self, message: &NetMessage) -> Bytes {
        let mut buf = BytesMut::with_capacity(message.frame_len());
        buf.put_u8(message.tag());
        match message {
            NetMessage::Hello { node_id } => {
                buf.put_u32(*node_id);
            }
            NetMessage::MigrateFormula {
                node_id,
                gene,
                fitness,
            } => {
                buf.put_u32(*node_id);
                buf.put_u8(gene.len() as u8);
                buf.put_slice(gene.padded());
                buf.put_f64(*fitness);
            }
            NetMessage::Ack { status } => {
                buf.put_u8(*status);
            }
        }
        let tag = self.key.tag(&buf);
        buf.put_slice(&tag);
        buf.freeze()
    }

    /// Authenticate and decode one frame
    pub fn decode(&self, frame: &[u8]) -> Result<NetMessage, WireError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(WireError::Truncated { len: frame.len() });
        }

        let (body, tag) = frame.split_at(frame.len() - AUTH_TAG_LEN);
        if !self.key.verify(body, tag) {
            return Err(WireError::Authentication);
        }

        let mut body = body;
        match body.get_u8() {
            TAG_HELLO => {
                expect_len(frame, HELLO_FRAME_LEN)?;
                Ok(NetMessage::Hello {
                    node_id: body.get_u32(),
                })
            }
            TAG_MIGRATE_FORMULA => {
                expect_len(frame, MIGRATE_FRAME_LEN)?;
                let node_id = body.get_u32();
                let count = body.get_u8() as usize;
                if count > MAX_GENE_LEN {
                    return Err(WireError::Malformed(format!("digit count {}", count)));
                }

                let mut digits = [0u8; MAX_GENE_LEN];
                body.copy_to_slice(&mut digits);
                if digits[count..].iter().any(|d| *d != 0) {
                    return Err(WireError::Malformed("non-zero padding after digits".into()));
                }
                let gene = Gene::from_digits(&digits[..count])
                    .map_err(|e| WireError::Malformed(e.to_string()))?;

                let fitness = body.get_f64();
                if !(0.0..=1.0).contains(&fitness) {
                    return Err(WireError::Malformed(format!("fitness {}", fitness)));
                }

                Ok(NetMessage::MigrateFormula {
                    node_id,
                    gene,
                    fitness,
                })
            }
            TAG_ACK => {
                expect_len(frame, ACK_FRAME_LEN)?;
                Ok(NetMessage::Ack {
                    status: body.get_u8(),
                })
            }
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

fn expect_len(frame: &[u8], expected: usize) -> Result<(), WireError> {
    if frame.len() < expected {
        Err(WireError::Truncated { len: frame.len() })
    } else if frame.len() > expected {
        Err(WireError::Malformed(format!(
            "{} trailing bytes",
            frame.len() - expected
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> WireCodec {
        WireCodec::new(AuthKey::for_frames(b"wire tests").unwrap())
    }

    fn migrate() -> NetMessage {
        NetMessage::MigrateFormula {
            node_id: 7,
            gene: "210000".parse().unwrap(),
            fitness: 0.975,
        }
    }

    /// Authenticate an arbitrary body the way `encode` would
    fn seal(body: &[u8]) -> Vec<u8> {
        let key = AuthKey::for_frames(b"wire tests").unwrap();
        let mut frame = body.to_vec();
        frame.extend_from_slice(&key.tag(body));
        frame
    }

    #[test]
    fn test_frame_sizes() {
        let codec = codec();
        assert_eq!(codec.encode(&NetMessage::Hello { node_id: 1 }).len(), 37);
        assert_eq!(codec.encode(&migrate()).len(), 78);
        assert_eq!(codec.encode(&NetMessage::Ack { status: 0 }).len(), 34);
    }

    #[test]
    fn test_hello_layout() {
        let frame = codec().encode(&NetMessage::Hello { node_id: 0x0102_0304 });
        assert_eq!(&frame[..5], &[TAG_HELLO, 1, 2, 3, 4]);
    }

    #[test]
    fn test_migrate_layout() {
        let frame = codec().encode(&migrate());
        assert_eq!(frame[0], TAG_MIGRATE_FORMULA);
        assert_eq!(&frame[1..5], &7u32.to_be_bytes());
        assert_eq!(frame[5], 6);
        assert_eq!(&frame[6..12], &[2, 1, 0, 0, 0, 0]);
        assert!(frame[12..38].iter().all(|b| *b == 0));
        assert_eq!(&frame[38..46], &0.975f64.to_be_bytes());
    }

    #[test]
    fn test_decode_each_kind() {
        let codec = codec();
        for message in [
            NetMessage::Hello { node_id: u32::MAX },
            migrate(),
            NetMessage::Ack { status: ACK_QUEUE_FULL },
        ] {
            assert_eq!(codec.decode(&codec.encode(&message)).unwrap(), message);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let codec = codec();
        assert_eq!(codec.encode(&migrate()), codec.encode(&migrate()));
    }

    #[test]
    fn test_truncated() {
        let codec = codec();
        assert_eq!(codec.decode(&[]), Err(WireError::Truncated { len: 0 }));
        assert_eq!(codec.decode(&[TAG_HELLO; 20]), Err(WireError::Truncated { len: 20 }));
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let other = WireCodec::new(AuthKey::for_frames(b"other swarm").unwrap());
        let frame = other.encode(&NetMessage::Hello { node_id: 1 });
        assert_eq!(codec().decode(&frame), Err(WireError::Authentication));
    }

    #[test]
    fn test_cut_frame_fails_authentication() {
        let frame = codec().encode(&migrate());
        assert_eq!(
            codec().decode(&frame[..frame.len() - 1]),
            Err(WireError::Authentication)
        );
    }

    #[test]
    fn test_unknown_tag_after_authentication() {
        let frame = seal(&[0x09, 0, 0, 0, 1]);
        assert_eq!(codec().decode(&frame), Err(WireError::UnknownTag(0x09)));
    }

    #[test]
    fn test_authenticated_but_short_body() {
        let frame = seal(&[TAG_HELLO, 0, 1]);
        assert!(matches!(codec().decode(&frame), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn test_authenticated_but_oversized_body() {
        let frame = seal(&[TAG_ACK, 0, 0]);
        assert!(matches!(codec().decode(&frame), Err(WireError::Malformed(_))));
    }

    #[test]
    fn test_malformed_migrate_fields() {
        let mut body = vec![TAG_MIGRATE_FORMULA, 0, 0, 0, 1, 33];
        body.extend_from_slice(&[0u8; MAX_GENE_LEN]);
        body.extend_from_slice(&0.5f64.to_be_bytes());
        assert!(matches!(codec().decode(&seal(&body)), Err(WireError::Malformed(_))));

        // digit above 9
        body[5] = 2;
        body[6] = 12;
        assert!(matches!(codec().decode(&seal(&body)), Err(WireError::Malformed(_))));

        // stray byte in padding
        body[6] = 1;
        body[20] = 3;
        assert!(matches!(codec().decode(&seal(&body)), Err(WireError::Malformed(_))));

        // fitness out of range
        body[20] = 0;
        let fitness_at = 6 + MAX_GENE_LEN;
        body[fitness_at..fitness_at + 8].copy_from_slice(&f64::NAN.to_be_bytes());
        assert!(matches!(codec().decode(&seal(&body)), Err(WireError::Malformed(_))));
        body[fitness_at..fitness_at + 8].copy_from_slice(&1.5f64.to_be_bytes());
        assert!(matches!(codec().decode(&seal(&body)), Err(WireError::Malformed(_))));

        body[fitness_at..fitness_at + 8].copy_from_slice(&1.0f64.to_be_bytes());
        assert!(codec().decode(&seal(&body)).is_ok());
    }

    #[test]
    fn test_empty_gene_roundtrip() {
        let codec = codec();
        let message = NetMessage::MigrateFormula {
            node_id: 3,
            gene: Gene::from_digits(&[]).unwrap(),
            fitness: 0.0,
        };
        assert_eq!(codec.decode(&codec.encode(&message)).unwrap(), message);
    }

    proptest! {
        #[test]
        fn prop_single_bit_flip_is_authentication_failure(
            kind in 0u8..3,
            node_id in any::<u32>(),
            digits in proptest::collection::vec(0u8..10, 0..=32),
            fitness in 0.0f64..=1.0,
            bit in any::<usize>(),
        ) {
            let codec = codec();
            let message = match kind {
                0 => NetMessage::Hello { node_id },
                1 => NetMessage::MigrateFormula { node_id, gene: Gene::from_digits(&digits).unwrap(), fitness },
                _ => NetMessage::Ack { status: node_id as u8 },
            };
            let mut frame = codec.encode(&message).to_vec();
            let bit = bit % (frame.len() * 8);
            frame[bit / 8] ^= 1 << (bit % 8);
            prop_assert_eq!(codec.decode(&frame), Err(WireError::Authentication));
        }

        #[test]
        fn prop_random_bytes_never_decode(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            prop_assert!(codec().decode(&bytes).is_err());
        }
    }
}
