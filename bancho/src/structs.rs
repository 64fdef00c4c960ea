use bytes::Bytes;

/// A chat message as carried on the wire, in either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub text: String,
    pub recipient: String,
    pub sender_id: i32,
}

/// Channel metadata as presented to clients. The member count is what the
/// server chooses to report and may exceed the actual membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: String,
    pub member_count: u16,
}

/// The multiplayer match as carried on the wire.
///
/// Slot statuses/teams/mods are raw bytes here; the server layer gives them
/// meaning. `slot_ids` holds one user id per slot whose status has any of
/// the occupied bits (`0b0111_1100`) set, in slot order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchData {
    pub id: u16,
    pub in_progress: bool,
    pub powerplay: u8,
    pub mods: u32,
    pub name: String,
    pub password: String,
    pub map_name: String,
    pub map_id: i32,
    pub map_md5: String,
    pub slot_statuses: [u8; 16],
    pub slot_teams: [u8; 16],
    pub slot_ids: Vec<i32>,
    pub host_id: i32,
    pub mode: u8,
    pub win_condition: u8,
    pub team_type: u8,
    pub freemods: bool,
    pub slot_mods: [i32; 16],
    pub seed: i32,
}

/// Slot status bits that mean "a player occupies this slot".
pub const SLOT_HAS_PLAYER: u8 = 0b0111_1100;

/// The 29-byte score frame, plus the two trailing doubles under score v2.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreFrame {
    pub time: i32,
    pub id: u8,
    pub num300: u16,
    pub num100: u16,
    pub num50: u16,
    pub num_geki: u16,
    pub num_katu: u16,
    pub num_miss: u16,
    pub total_score: i32,
    pub current_combo: u16,
    pub max_combo: u16,
    pub perfect: bool,
    pub current_hp: u8,
    pub tag_byte: u8,
    pub score_v2: bool,
    pub combo_portion: Option<f64>,
    pub bonus_portion: Option<f64>,
}

/// What the replaying client is doing, as declared in a frame bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplayAction {
    Standard = 0,
    NewSong = 1,
    Skip = 2,
    Completion = 3,
    Fail = 4,
    Pause = 5,
    Unpause = 6,
    SongSelect = 7,
    WatchingOther = 8,
}

impl ReplayAction {
    pub fn from_u8(v: u8) -> Option<ReplayAction> {
        use ReplayAction::*;
        Some(match v {
            0 => Standard,
            1 => NewSong,
            2 => Skip,
            3 => Completion,
            4 => Fail,
            5 => Pause,
            6 => Unpause,
            7 => SongSelect,
            8 => WatchingOther,
            _ => return None,
        })
    }
}

/// A single input frame within a spectate bundle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReplayFrame {
    pub button_state: u8,
    // pre-2009 taiko clients stored input here; kept for wire compat
    pub taiko_byte: u8,
    pub x: f32,
    pub y: f32,
    pub time: i32,
}

/// A parsed spectate-frame bundle.
///
/// `raw` holds the original payload bytes verbatim; spectator retransmission
/// must forward those, never a re-encoding.
#[derive(Clone, Debug)]
pub struct ReplayFrameBundle {
    pub extra: i32,
    pub frames: Vec<ReplayFrame>,
    pub action: ReplayAction,
    pub score_frame: ScoreFrame,
    pub sequence: u16,
    pub raw: Bytes,
}
