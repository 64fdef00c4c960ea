use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::task::JoinHandle;

use bancho::MatchData;

use crate::gamemode::GameMode;
use crate::mods::Mods;

/// The number of matches that may exist at once; ids are indexes into the
/// match table.
pub const MAX_MATCHES: usize = 64;

/// The state of one slot in a match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotStatus {
    #[default]
    Open = 1,
    Locked = 2,
    NotReady = 4,
    Ready = 8,
    NoMap = 16,
    Playing = 32,
    Complete = 64,
    Quit = 128,
}

impl SlotStatus {
    /// Whether this status means a player occupies the slot
    /// (`not_ready | ready | no_map | playing | complete`).
    pub fn has_player(self) -> bool {
        (self as u8) & bancho::SLOT_HAS_PLAYER != 0
    }
}

/// Slot team assignment; `Neutral` in head-to-head and tag-coop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MatchTeam {
    #[default]
    Neutral = 0,
    Blue = 1,
    Red = 2,
}

impl MatchTeam {
    pub fn opponent(self) -> MatchTeam {
        match self {
            MatchTeam::Blue => MatchTeam::Red,
            MatchTeam::Red => MatchTeam::Blue,
            MatchTeam::Neutral => MatchTeam::Neutral,
        }
    }
}

/// Which scalar decides a play's winner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum WinCondition {
    #[default]
    Score = 0,
    Accuracy = 1,
    Combo = 2,
    ScoreV2 = 3,
}

impl WinCondition {
    pub fn from_u8(v: u8) -> WinCondition {
        match v {
            1 => WinCondition::Accuracy,
            2 => WinCondition::Combo,
            3 => WinCondition::ScoreV2,
            _ => WinCondition::Score,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TeamType {
    #[default]
    HeadToHead = 0,
    TagCoop = 1,
    TeamVs = 2,
    TagTeamVs = 3,
}

impl TeamType {
    pub fn from_u8(v: u8) -> TeamType {
        match v {
            1 => TeamType::TagCoop,
            2 => TeamType::TeamVs,
            3 => TeamType::TagTeamVs,
            _ => TeamType::HeadToHead,
        }
    }

    /// Free-for-all modes score per player; the others per team.
    pub fn is_ffa(self) -> bool {
        matches!(self, TeamType::HeadToHead | TeamType::TagCoop)
    }
}

/// One of sixteen player slots.
#[derive(Clone, Copy, Debug, Default)]
pub struct Slot {
    pub user_id: Option<i32>,
    pub status: SlotStatus,
    pub team: MatchTeam,
    /// Only meaningful under freemods.
    pub mods: Mods,
    /// Set when the client confirms the map loaded.
    pub loaded: bool,
    /// Set on skip request while playing.
    pub skipped: bool,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
    }

    /// Take over another slot's occupant (slot change).
    pub fn copy_from(&mut self, other: &Slot) {
        self.user_id = other.user_id;
        self.status = other.status;
        self.team = other.team;
        self.mods = other.mods;
    }

    /// Clear the slot, leaving it in `new_status` (open, or locked after a
    /// kick).
    pub fn reset(&mut self, new_status: SlotStatus) {
        *self = Slot {
            status: new_status,
            ..Slot::default()
        };
    }
}

/// Who a scrim point is credited to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScrimKey {
    User(i32),
    Team(MatchTeam),
}

/// An armed `!mp start <seconds>` timer. One task owns both the countdown
/// alerts and the final fire; aborting it cancels everything.
#[derive(Debug)]
pub struct PendingStart {
    pub task: JoinHandle<()>,
    pub fire_at: Instant,
    /// The user who armed the timer; it aborts if they leave.
    pub armed_by: i32,
}

/// A tournament mappool loaded into a match via `!mp loadpool`.
#[derive(Clone, Debug)]
pub struct LoadedPool {
    pub id: i32,
    pub name: String,
}

/// An osu! multiplayer match.
#[derive(Debug, Default)]
pub struct Match {
    pub id: u16,
    pub name: String,
    pub password: String,
    /// False when the creating client appended `//private` to the password.
    pub has_public_history: bool,

    pub map_name: String,
    pub map_id: i32,
    pub map_md5: String,
    /// The map selected before the current "changing map" sentinel.
    pub prev_map_id: i32,

    pub host_id: i32,
    /// Users granted mp-command access beyond the host.
    pub referees: HashSet<i32>,

    pub mode: GameMode,
    pub mods: Mods,
    pub freemods: bool,
    pub win_condition: WinCondition,
    pub team_type: TeamType,

    pub in_progress: bool,
    pub starting: Option<PendingStart>,
    /// Feeds osu!mania's random mod.
    pub seed: i32,

    pub slots: [Slot; 16],

    // scrim state
    pub is_scrimming: bool,
    pub match_points: HashMap<ScrimKey, i32>,
    pub bans: HashSet<(Mods, i32)>,
    /// One entry per completed point; `None` marks a tie.
    pub winners: Vec<Option<ScrimKey>>,
    pub winning_points: i32,
    /// Score with pp instead of the win condition during scrims.
    pub use_pp_scoring: bool,

    /// Tourney-client observers (in chat, not in a slot).
    pub tourney_clients: HashSet<i32>,
    pub pool: Option<LoadedPool>,
}

impl Match {
    /// The match's instanced chat channel name.
    pub fn chat_name(&self) -> String {
        format!("#multi_{}", self.id)
    }

    /// An osu! chat embed joining the match.
    pub fn embed(&self) -> String {
        format!("[osump://{}/{} {}]", self.id, self.password, self.name)
    }

    /// A chat embed for the selected map.
    pub fn map_embed(&self, domain: &str) -> String {
        format!(
            "[https://osu.{}/beatmapsets/#/{} {}]",
            domain, self.map_id, self.map_name
        )
    }

    pub fn slot_of(&self, user_id: i32) -> Option<&Slot> {
        self.slots.iter().find(|s| s.user_id == Some(user_id))
    }

    pub fn slot_of_mut(&mut self, user_id: i32) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.user_id == Some(user_id))
    }

    pub fn slot_id_of(&self, user_id: i32) -> Option<usize> {
        self.slots.iter().position(|s| s.user_id == Some(user_id))
    }

    /// The first open slot, if any.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.status == SlotStatus::Open)
    }

    pub fn host_slot_mut(&mut self) -> Option<&mut Slot> {
        let host_id = self.host_id;
        self.slot_of_mut(host_id)
    }

    pub fn occupied_user_ids(&self) -> Vec<i32> {
        self.slots.iter().filter_map(|s| s.user_id).collect()
    }

    pub fn is_deserted(&self) -> bool {
        self.slots.iter().all(Slot::is_empty)
    }

    /// Everyone with referee powers: the explicit set plus the host.
    pub fn referees(&self) -> HashSet<i32> {
        let mut refs = self.referees.clone();
        refs.insert(self.host_id);
        refs
    }

    /// Move every slot in `expected` state back to not-ready.
    pub fn unready_players(&mut self, expected: SlotStatus) {
        for slot in self.slots.iter_mut() {
            if slot.status == expected {
                slot.status = SlotStatus::NotReady;
            }
        }
    }

    pub fn reset_loaded_flags(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.loaded = false;
            slot.skipped = false;
        }
    }

    /// Flip occupied slots to playing (skipping no-map slots) and mark the
    /// match in progress. Returns the user ids without the map, which are
    /// immune from the start broadcast.
    pub fn start(&mut self) -> Vec<i32> {
        let mut no_map = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some(user_id) = slot.user_id {
                if slot.status != SlotStatus::NoMap {
                    slot.status = SlotStatus::Playing;
                } else {
                    no_map.push(user_id);
                }
            }
        }
        self.in_progress = true;
        no_map
    }

    /// Clear accumulated scrim points, winners and bans.
    pub fn reset_scrim(&mut self) {
        self.match_points.clear();
        self.winners.clear();
        self.bans.clear();
    }

    /// Abort a pending `!mp start` timer. Returns whether one was armed.
    pub fn cancel_pending_start(&mut self) -> bool {
        match self.starting.take() {
            Some(pending) => {
                pending.task.abort();
                true
            }
            None => false,
        }
    }

    /// Snapshot for the wire. Password disclosure is decided at encode time.
    pub fn to_wire(&self) -> MatchData {
        let mut data = MatchData {
            id: self.id,
            in_progress: self.in_progress,
            powerplay: 0,
            mods: self.mods.bits(),
            name: self.name.clone(),
            password: self.password.clone(),
            map_name: self.map_name.clone(),
            map_id: self.map_id,
            map_md5: self.map_md5.clone(),
            host_id: self.host_id,
            mode: self.mode.as_vanilla(),
            win_condition: self.win_condition as u8,
            team_type: self.team_type as u8,
            freemods: self.freemods,
            seed: self.seed,
            ..MatchData::default()
        };

        for (i, slot) in self.slots.iter().enumerate() {
            data.slot_statuses[i] = slot.status as u8;
            data.slot_teams[i] = slot.team as u8;
            data.slot_mods[i] = slot.mods.bits() as i32;
            if let Some(user_id) = slot.user_id {
                if slot.status.has_player() {
                    data.slot_ids.push(user_id);
                }
            }
        }

        data
    }
}

/// The match table: 64 fixed ids, `None` where no match lives.
pub struct MatchRegistry {
    matches: Vec<Option<Match>>,
}

impl Default for MatchRegistry {
    fn default() -> Self {
        MatchRegistry {
            matches: (0..MAX_MATCHES).map(|_| None).collect(),
        }
    }
}

impl MatchRegistry {
    pub fn init() -> Self {
        MatchRegistry::default()
    }

    pub fn get(&self, id: u16) -> Option<&Match> {
        self.matches.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Match> {
        self.matches.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// The first unused match id.
    pub fn first_free_id(&self) -> Option<u16> {
        self.matches.iter().position(Option::is_none).map(|i| i as u16)
    }

    pub fn insert(&mut self, m: Match) {
        let id = m.id as usize;
        debug_assert!(id < MAX_MATCHES && self.matches[id].is_none());
        self.matches[id] = Some(m);
    }

    /// Remove a match, aborting any armed start timer.
    pub fn remove(&mut self, id: u16) -> Option<Match> {
        let mut removed = self.matches.get_mut(id as usize)?.take()?;
        removed.cancel_pending_start();
        log::debug!("match {} ({}) removed", removed.name, removed.id);
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_state_bits_match_the_wire() {
        assert!(SlotStatus::NotReady.has_player());
        assert!(SlotStatus::Playing.has_player());
        assert!(!SlotStatus::Open.has_player());
        assert!(!SlotStatus::Locked.has_player());
        assert!(!SlotStatus::Quit.has_player());
    }

    #[test]
    fn start_skips_no_map_slots() {
        let mut m = Match::default();
        m.slots[0].user_id = Some(3);
        m.slots[0].status = SlotStatus::Ready;
        m.slots[1].user_id = Some(4);
        m.slots[1].status = SlotStatus::NoMap;

        let no_map = m.start();
        assert!(m.in_progress);
        assert_eq!(m.slots[0].status, SlotStatus::Playing);
        assert_eq!(m.slots[1].status, SlotStatus::NoMap);
        assert_eq!(no_map, vec![4]);
    }

    #[test]
    fn wire_snapshot_lists_occupied_slots_in_order() {
        let mut m = Match {
            id: 5,
            host_id: 3,
            ..Match::default()
        };
        m.slots[2].user_id = Some(4);
        m.slots[2].status = SlotStatus::NotReady;
        m.slots[7].user_id = Some(3);
        m.slots[7].status = SlotStatus::Ready;

        let wire = m.to_wire();
        assert_eq!(wire.slot_ids, vec![4, 3]);
        assert_eq!(wire.slot_statuses[2], 4);
        assert_eq!(wire.slot_statuses[7], 8);
    }

    #[test]
    fn registry_reuses_freed_ids() {
        let mut registry = MatchRegistry::init();
        assert_eq!(registry.first_free_id(), Some(0));

        registry.insert(Match {
            id: 0,
            ..Match::default()
        });
        assert_eq!(registry.first_free_id(), Some(1));

        registry.remove(0);
        assert_eq!(registry.first_free_id(), Some(0));
    }

    #[test]
    fn referees_always_include_host() {
        let mut m = Match {
            host_id: 3,
            ..Match::default()
        };
        m.referees.insert(7);
        let refs = m.referees();
        assert!(refs.contains(&3));
        assert!(refs.contains(&7));
    }
}
