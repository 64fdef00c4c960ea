use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::structs::*;
use crate::HEADER_LEN;

/// A failure while decoding a request body.
///
/// Any of these aborts the whole request; partially-applied packet streams
/// are never committed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of data (wanted {wanted} more bytes, had {available})")]
    UnexpectedEof { wanted: usize, available: usize },

    #[error("invalid string marker {0:#04x}")]
    InvalidStringMarker(u8),

    #[error("unterminated or oversized uleb128 length")]
    InvalidLength,

    #[error("string payload is not valid utf-8")]
    InvalidUtf8,

    #[error("truncated frame: header says {claimed} bytes, {available} available")]
    TruncatedFrame { claimed: usize, available: usize },

    #[error("unknown replay action {0}")]
    UnknownReplayAction(u8),
}

/// A single frame of a request body: raw packet id plus its payload bytes.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub id: u16,
    pub payload: &'a [u8],
}

/// Iterates the concatenated frames of a request body.
///
/// Yields every frame (including ones with ids the server does not know;
/// skipping those is the dispatcher's business). A header or payload that
/// runs past the end of the body yields an error and ends the stream.
pub struct PacketStream<'a> {
    buf: &'a [u8],
}

impl<'a> PacketStream<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        PacketStream { buf: body }
    }
}

impl<'a> Iterator for PacketStream<'a> {
    type Item = Result<Frame<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < HEADER_LEN {
            let err = DecodeError::TruncatedFrame {
                claimed: HEADER_LEN,
                available: self.buf.len(),
            };
            self.buf = &[];
            return Some(Err(err));
        }

        let id = self.buf.get_u16_le();
        self.buf.advance(1); // reserved byte
        let len = self.buf.get_u32_le() as usize;

        if len > self.buf.len() {
            let err = DecodeError::TruncatedFrame {
                claimed: len,
                available: self.buf.len(),
            };
            self.buf = &[];
            return Some(Err(err));
        }

        let (payload, rest) = self.buf.split_at(len);
        self.buf = rest;
        Some(Ok(Frame { id, payload }))
    }
}

/// Decodes typed fields out of a packet payload.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Reader { buf: payload }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, wanted: usize) -> Result<(), DecodeError> {
        if self.buf.len() < wanted {
            Err(DecodeError::UnexpectedEof {
                wanted: wanted - self.buf.len(),
                available: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// One-byte presence marker, ULEB128 length, UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        match self.read_u8()? {
            0x00 => Ok(String::new()),
            0x0b => {
                let len = self.read_uleb128()?;
                self.need(len)?;
                let (raw, rest) = self.buf.split_at(len);
                self.buf = rest;
                String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
            }
            other => Err(DecodeError::InvalidStringMarker(other)),
        }
    }

    fn read_uleb128(&mut self) -> Result<usize, DecodeError> {
        let mut value: usize = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 35 {
                return Err(DecodeError::InvalidLength);
            }
        }
    }

    /// An i32 list with a u16 element count.
    pub fn read_i32_list(&mut self) -> Result<Vec<i32>, DecodeError> {
        let count = self.read_u16()? as usize;
        self.need(count * 4)?;
        (0..count).map(|_| self.read_i32()).collect()
    }

    /// The alternate i32 list form with a u32 element count.
    pub fn read_i32_list_u32len(&mut self) -> Result<Vec<i32>, DecodeError> {
        let count = self.read_u32()? as usize;
        self.need(count.saturating_mul(4))?;
        (0..count).map(|_| self.read_i32()).collect()
    }

    pub fn read_message(&mut self) -> Result<Message, DecodeError> {
        Ok(Message {
            sender: self.read_string()?,
            text: self.read_string()?,
            recipient: self.read_string()?,
            sender_id: self.read_i32()?,
        })
    }

    pub fn read_channel_info(&mut self) -> Result<ChannelInfo, DecodeError> {
        Ok(ChannelInfo {
            name: self.read_string()?,
            topic: self.read_string()?,
            member_count: self.read_u16()?,
        })
    }

    pub fn read_match(&mut self) -> Result<MatchData, DecodeError> {
        let mut data = MatchData {
            id: self.read_u16()?,
            in_progress: self.read_i8()? == 1,
            powerplay: self.read_u8()?,
            mods: self.read_u32()?,
            name: self.read_string()?,
            password: self.read_string()?,
            map_name: self.read_string()?,
            map_id: self.read_i32()?,
            map_md5: self.read_string()?,
            ..MatchData::default()
        };

        for status in data.slot_statuses.iter_mut() {
            *status = self.read_u8()?;
        }
        for team in data.slot_teams.iter_mut() {
            *team = self.read_u8()?;
        }
        for status in data.slot_statuses {
            if status & SLOT_HAS_PLAYER != 0 {
                data.slot_ids.push(self.read_i32()?);
            }
        }

        data.host_id = self.read_i32()?;
        data.mode = self.read_u8()?;
        data.win_condition = self.read_u8()?;
        data.team_type = self.read_u8()?;
        data.freemods = self.read_u8()? == 1;

        if data.freemods {
            for mods in data.slot_mods.iter_mut() {
                *mods = self.read_i32()?;
            }
        }

        data.seed = self.read_i32()?;
        Ok(data)
    }

    pub fn read_score_frame(&mut self) -> Result<ScoreFrame, DecodeError> {
        let mut frame = ScoreFrame {
            time: self.read_i32()?,
            id: self.read_u8()?,
            num300: self.read_u16()?,
            num100: self.read_u16()?,
            num50: self.read_u16()?,
            num_geki: self.read_u16()?,
            num_katu: self.read_u16()?,
            num_miss: self.read_u16()?,
            total_score: self.read_i32()?,
            current_combo: self.read_u16()?,
            max_combo: self.read_u16()?,
            perfect: self.read_u8()? == 1,
            current_hp: self.read_u8()?,
            tag_byte: self.read_u8()?,
            score_v2: self.read_u8()? == 1,
            combo_portion: None,
            bonus_portion: None,
        };
        if frame.score_v2 {
            frame.combo_portion = Some(self.read_f64()?);
            frame.bonus_portion = Some(self.read_f64()?);
        }
        Ok(frame)
    }

    pub fn read_replay_frame(&mut self) -> Result<ReplayFrame, DecodeError> {
        Ok(ReplayFrame {
            button_state: self.read_u8()?,
            taiko_byte: self.read_u8()?,
            x: self.read_f32()?,
            y: self.read_f32()?,
            time: self.read_i32()?,
        })
    }

    /// Parse a full spectate bundle, retaining the raw payload for verbatim
    /// retransmission to spectators.
    pub fn read_replay_frame_bundle(&mut self) -> Result<ReplayFrameBundle, DecodeError> {
        let raw = Bytes::copy_from_slice(self.buf);

        let extra = self.read_i32()?;
        let frame_count = self.read_u16()? as usize;
        let frames = (0..frame_count)
            .map(|_| self.read_replay_frame())
            .collect::<Result<Vec<_>, _>>()?;
        let action_byte = self.read_u8()?;
        let action = ReplayAction::from_u8(action_byte)
            .ok_or(DecodeError::UnknownReplayAction(action_byte))?;
        let score_frame = self.read_score_frame()?;
        let sequence = self.read_u16()?;

        Ok(ReplayFrameBundle {
            extra,
            frames,
            action,
            score_frame,
            sequence,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_walks_consecutive_frames() {
        // ping (no payload) followed by a user stats request for [3, 4]
        let body = [
            4u8, 0, 0, 0, 0, 0, 0, //
            85, 0, 0, 10, 0, 0, 0, 2, 0, 3, 0, 0, 0, 4, 0, 0, 0,
        ];
        let frames: Vec<_> = PacketStream::new(&body)
            .collect::<Result<_, _>>()
            .expect("both frames decode");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, 4);
        assert!(frames[0].payload.is_empty());
        assert_eq!(frames[1].id, 85);

        let ids = Reader::new(frames[1].payload).read_i32_list().unwrap();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn stream_rejects_truncated_payload() {
        let body = [1u8, 0, 0, 255, 0, 0, 0, 1, 2, 3];
        let results: Vec<_> = PacketStream::new(&body).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(DecodeError::TruncatedFrame { claimed: 255, .. })
        ));
    }

    #[test]
    fn string_markers() {
        assert_eq!(Reader::new(&[0x00]).read_string().unwrap(), "");

        let mut buf = vec![0x0b, 0x05];
        buf.extend_from_slice(b"cmyui");
        assert_eq!(Reader::new(&buf).read_string().unwrap(), "cmyui");

        assert_eq!(
            Reader::new(&[0x07]).read_string(),
            Err(DecodeError::InvalidStringMarker(0x07))
        );
    }

    #[test]
    fn uleb128_multibyte_length() {
        // 300 = 0xac 0x02
        let mut buf = vec![0x0b, 0xac, 0x02];
        buf.extend(std::iter::repeat(b'a').take(300));
        assert_eq!(Reader::new(&buf).read_string().unwrap().len(), 300);
    }

    #[test]
    fn truncated_string_is_an_error() {
        let buf = [0x0b, 0x10, b'a', b'b'];
        assert!(matches!(
            Reader::new(&buf).read_string(),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }
}
