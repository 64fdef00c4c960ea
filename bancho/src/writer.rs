use bytes::{BufMut, Bytes, BytesMut};

use crate::ids::ServerPacketId;
use crate::structs::*;
use crate::HEADER_LEN;

/// Builds one outgoing frame. The header's length field is filled in by
/// [`Writer::finish`] once the payload is complete, so payloads never need
/// to be sized up front.
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new(id: ServerPacketId) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u16_le(id as u16);
        buf.put_u8(0); // reserved
        buf.put_u32_le(0); // payload length, patched in finish()
        Writer { buf }
    }

    pub fn finish(mut self) -> Bytes {
        let payload_len = (self.buf.len() - HEADER_LEN) as u32;
        self.buf[3..7].copy_from_slice(&payload_len.to_le_bytes());
        self.buf.freeze()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_i8(&mut self, v: i8) -> &mut Self {
        self.buf.put_i8(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16_le(v);
        self
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.put_i16_le(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32_le(v);
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32_le(v);
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64_le(v);
        self
    }

    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.put_i64_le(v);
        self
    }

    pub fn put_f32(&mut self, v: f32) -> &mut Self {
        self.buf.put_f32_le(v);
        self
    }

    pub fn put_f64(&mut self, v: f64) -> &mut Self {
        self.buf.put_f64_le(v);
        self
    }

    pub fn put_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    pub fn put_string(&mut self, s: &str) -> &mut Self {
        if s.is_empty() {
            self.buf.put_u8(0x00);
        } else {
            self.buf.put_u8(0x0b);
            self.put_uleb128(s.len());
            self.buf.put_slice(s.as_bytes());
        }
        self
    }

    fn put_uleb128(&mut self, mut value: usize) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.put_u8(byte);
            if value == 0 {
                break;
            }
        }
    }

    pub fn put_i32_list(&mut self, values: &[i32]) -> &mut Self {
        self.buf.put_u16_le(values.len() as u16);
        for v in values {
            self.buf.put_i32_le(*v);
        }
        self
    }

    pub fn put_message(&mut self, msg: &Message) -> &mut Self {
        self.put_string(&msg.sender);
        self.put_string(&msg.text);
        self.put_string(&msg.recipient);
        self.put_i32(msg.sender_id);
        self
    }

    pub fn put_channel_info(&mut self, info: &ChannelInfo) -> &mut Self {
        self.put_string(&info.name);
        self.put_string(&info.topic);
        self.put_u16(info.member_count);
        self
    }

    pub fn put_score_frame(&mut self, frame: &ScoreFrame) -> &mut Self {
        self.put_i32(frame.time);
        self.put_u8(frame.id);
        self.put_u16(frame.num300);
        self.put_u16(frame.num100);
        self.put_u16(frame.num50);
        self.put_u16(frame.num_geki);
        self.put_u16(frame.num_katu);
        self.put_u16(frame.num_miss);
        self.put_i32(frame.total_score);
        self.put_u16(frame.current_combo);
        self.put_u16(frame.max_combo);
        self.put_u8(frame.perfect as u8);
        self.put_u8(frame.current_hp);
        self.put_u8(frame.tag_byte);
        self.put_u8(frame.score_v2 as u8);
        if frame.score_v2 {
            self.put_f64(frame.combo_portion.unwrap_or(0.0));
            self.put_f64(frame.bonus_portion.unwrap_or(0.0));
        }
        self
    }

    /// Encode a match. When `send_password` is false and the match has a
    /// password, the client is told one exists (`\x0b\x00`) without being
    /// given it.
    pub fn put_match(&mut self, m: &MatchData, send_password: bool) -> &mut Self {
        self.put_u16(m.id);
        self.put_i8(m.in_progress as i8);
        self.put_u8(m.powerplay);
        self.put_u32(m.mods);
        self.put_string(&m.name);

        if m.password.is_empty() {
            self.put_u8(0x00);
        } else if send_password {
            self.put_string(&m.password);
        } else {
            self.put_u8(0x0b);
            self.put_u8(0x00);
        }

        self.put_string(&m.map_name);
        self.put_i32(m.map_id);
        self.put_string(&m.map_md5);

        for status in m.slot_statuses {
            self.put_u8(status);
        }
        for team in m.slot_teams {
            self.put_u8(team);
        }
        for id in &m.slot_ids {
            self.put_i32(*id);
        }

        self.put_i32(m.host_id);
        self.put_u8(m.mode);
        self.put_u8(m.win_condition);
        self.put_u8(m.team_type);
        self.put_u8(m.freemods as u8);

        if m.freemods {
            for mods in m.slot_mods {
                self.put_i32(mods);
            }
        }

        self.put_i32(m.seed);
        self
    }
}
