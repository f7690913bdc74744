use std::io::{Read, Write};

use crate::sim::PlayerRef;

use super::codec::{read_bytes, read_u32_le, read_u8, write_bytes, write_u32_le, write_u8};
use super::error::ReplayError;

/// One raw input command, exactly as the simulation consumed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub frame: u32,
    pub player: PlayerRef,
    pub payload: Vec<u8>,
}

/// The input command stream of a match, in the order commands were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLog {
    records: Vec<InputRecord>,
}

impl InputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: InputRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.records.last().map(|r| r.frame)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputRecord> {
        self.records.iter()
    }

    /// Commands applied on `frame`. Records are frame-ordered, so this is a
    /// binary search followed by a short scan.
    pub fn at_frame(&self, frame: u32) -> &[InputRecord] {
        let start = self.records.partition_point(|r| r.frame < frame);
        let end = self.records.partition_point(|r| r.frame <= frame);
        &self.records[start..end]
    }

    pub fn encode(&self, w: &mut dyn Write) -> Result<(), ReplayError> {
        write_u32_le(w, self.records.len() as u32)?;
        for record in &self.records {
            write_u32_le(w, record.frame)?;
            write_u8(w, record.player)?;
            write_bytes(w, &record.payload)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut dyn Read) -> Result<Self, ReplayError> {
        let count = read_u32_le(r)?;
        let mut records = Vec::new();
        let mut last_frame = 0;
        for _ in 0..count {
            let record = InputRecord {
                frame: read_u32_le(r)?,
                player: read_u8(r)?,
                payload: read_bytes(r)?,
            };
            if record.frame < last_frame {
                return Err(ReplayError::malformed(format!(
                    "input for frame {} after frame {}",
                    record.frame, last_frame
                )));
            }
            last_frame = record.frame;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ReplayError> {
        let mut buf: Vec<u8> = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(mut data: &[u8]) -> Result<Self, ReplayError> {
        Self::decode(&mut data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(frame: u32, player: PlayerRef) -> InputRecord {
        InputRecord {
            frame,
            player,
            payload: vec![player, frame as u8],
        }
    }

    #[test]
    fn test_at_frame_groups_commands() {
        let mut log = InputLog::new();
        log.push(record(1, 0));
        log.push(record(3, 0));
        log.push(record(3, 1));
        log.push(record(7, 1));

        assert_eq!(log.at_frame(3).len(), 2);
        assert!(log.at_frame(2).is_empty());
        assert_eq!(log.at_frame(7)[0].player, 1);
        assert_eq!(log.last_frame(), Some(7));
    }

    #[test]
    fn test_bytes_decode_back_to_same_log() {
        let mut log = InputLog::new();
        log.push(record(10, 2));
        log.push(record(11, 3));
        let bytes = log.to_bytes().unwrap();
        assert_eq!(InputLog::from_bytes(&bytes).unwrap(), log);
    }

    #[test]
    fn test_out_of_order_frames_are_malformed() {
        let mut log = InputLog::new();
        log.push(record(5, 0));
        log.push(record(4, 0));
        let bytes = log.to_bytes().unwrap();
        assert!(matches!(
            InputLog::from_bytes(&bytes),
            Err(ReplayError::Malformed { .. })
        ));
    }
}
