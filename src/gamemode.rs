use crate::mods::Mods;

/// A play mode, including the server-side relax/autopilot variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum GameMode {
    #[default]
    VanillaOsu = 0,
    VanillaTaiko = 1,
    VanillaCatch = 2,
    VanillaMania = 3,
    RelaxOsu = 4,
    RelaxTaiko = 5,
    RelaxCatch = 6,
    AutopilotOsu = 8,
}

/// Every mode, in leaderboard/stats row order.
pub const ALL_MODES: [GameMode; 8] = [
    GameMode::VanillaOsu,
    GameMode::VanillaTaiko,
    GameMode::VanillaCatch,
    GameMode::VanillaMania,
    GameMode::RelaxOsu,
    GameMode::RelaxTaiko,
    GameMode::RelaxCatch,
    GameMode::AutopilotOsu,
];

impl GameMode {
    pub fn from_u8(v: u8) -> Option<GameMode> {
        use GameMode::*;
        Some(match v {
            0 => VanillaOsu,
            1 => VanillaTaiko,
            2 => VanillaCatch,
            3 => VanillaMania,
            4 => RelaxOsu,
            5 => RelaxTaiko,
            6 => RelaxCatch,
            8 => AutopilotOsu,
            _ => return None,
        })
    }

    /// Combine a vanilla mode with relax/autopilot mods, dropping the mod
    /// bits for combinations that do not exist (rx!mania, ap!anything-but-std).
    pub fn from_vanilla(mode_vanilla: u8, mods: &mut Mods) -> GameMode {
        let mut value = mode_vanilla.min(3);
        if mods.contains(Mods::RELAX) {
            if value == 3 {
                *mods &= !Mods::RELAX;
            } else {
                value += 4;
            }
        } else if mods.contains(Mods::AUTOPILOT) {
            if value != 0 {
                *mods &= !Mods::AUTOPILOT;
            } else {
                value += 8;
            }
        }
        GameMode::from_u8(value).unwrap_or_default()
    }

    /// The mode as the client knows it (0-3).
    pub fn as_vanilla(self) -> u8 {
        (self as u8) % 4
    }

    pub fn label(self) -> &'static str {
        use GameMode::*;
        match self {
            VanillaOsu => "vn!std",
            VanillaTaiko => "vn!taiko",
            VanillaCatch => "vn!catch",
            VanillaMania => "vn!mania",
            RelaxOsu => "rx!std",
            RelaxTaiko => "rx!taiko",
            RelaxCatch => "rx!catch",
            AutopilotOsu => "ap!std",
        }
    }

    pub fn from_label(label: &str) -> Option<GameMode> {
        ALL_MODES.iter().copied().find(|m| m.label() == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relax_offsets() {
        let mut mods = Mods::RELAX;
        assert_eq!(GameMode::from_vanilla(0, &mut mods), GameMode::RelaxOsu);
        assert!(mods.contains(Mods::RELAX));

        // rx!mania doesn't exist; the mod is stripped
        let mut mods = Mods::RELAX;
        assert_eq!(GameMode::from_vanilla(3, &mut mods), GameMode::VanillaMania);
        assert!(!mods.contains(Mods::RELAX));
    }

    #[test]
    fn autopilot_only_std() {
        let mut mods = Mods::AUTOPILOT;
        assert_eq!(GameMode::from_vanilla(0, &mut mods), GameMode::AutopilotOsu);

        let mut mods = Mods::AUTOPILOT;
        assert_eq!(GameMode::from_vanilla(2, &mut mods), GameMode::VanillaCatch);
        assert!(!mods.contains(Mods::AUTOPILOT));
    }

    #[test]
    fn vanilla_projection() {
        assert_eq!(GameMode::RelaxCatch.as_vanilla(), 2);
        assert_eq!(GameMode::AutopilotOsu.as_vanilla(), 0);
        assert_eq!(GameMode::from_label("rx!std"), Some(GameMode::RelaxOsu));
    }
}
