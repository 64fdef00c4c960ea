use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// The osu! mod bitset.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Mods: u32 {
        const NOFAIL = 1 << 0;
        const EASY = 1 << 1;
        const TOUCHSCREEN = 1 << 2;
        const HIDDEN = 1 << 3;
        const HARDROCK = 1 << 4;
        const SUDDENDEATH = 1 << 5;
        const DOUBLETIME = 1 << 6;
        const RELAX = 1 << 7;
        const HALFTIME = 1 << 8;
        const NIGHTCORE = 1 << 9;
        const FLASHLIGHT = 1 << 10;
        const AUTOPLAY = 1 << 11;
        const SPUNOUT = 1 << 12;
        const AUTOPILOT = 1 << 13;
        const PERFECT = 1 << 14;
        const KEY4 = 1 << 15;
        const KEY5 = 1 << 16;
        const KEY6 = 1 << 17;
        const KEY7 = 1 << 18;
        const KEY8 = 1 << 19;
        const FADEIN = 1 << 20;
        const RANDOM = 1 << 21;
        const CINEMA = 1 << 22;
        const TARGET = 1 << 23;
        const KEY9 = 1 << 24;
        const KEYCOOP = 1 << 25;
        const KEY1 = 1 << 26;
        const KEY3 = 1 << 27;
        const KEY2 = 1 << 28;
        const SCOREV2 = 1 << 29;
        const MIRROR = 1 << 30;

        /// Mods that alter playback speed; under freemods these stay on the
        /// match while everything else moves to the slots.
        const SPEED_CHANGING = Self::DOUBLETIME.bits() | Self::NIGHTCORE.bits() | Self::HALFTIME.bits();
    }
}

const MOD_CODES: &[(Mods, &str)] = &[
    (Mods::NOFAIL, "NF"),
    (Mods::EASY, "EZ"),
    (Mods::TOUCHSCREEN, "TD"),
    (Mods::HIDDEN, "HD"),
    (Mods::HARDROCK, "HR"),
    (Mods::SUDDENDEATH, "SD"),
    (Mods::DOUBLETIME, "DT"),
    (Mods::RELAX, "RX"),
    (Mods::HALFTIME, "HT"),
    (Mods::NIGHTCORE, "NC"),
    (Mods::FLASHLIGHT, "FL"),
    (Mods::AUTOPLAY, "AT"),
    (Mods::SPUNOUT, "SO"),
    (Mods::AUTOPILOT, "AP"),
    (Mods::PERFECT, "PF"),
    (Mods::KEY4, "K4"),
    (Mods::KEY5, "K5"),
    (Mods::KEY6, "K6"),
    (Mods::KEY7, "K7"),
    (Mods::KEY8, "K8"),
    (Mods::FADEIN, "FI"),
    (Mods::RANDOM, "RN"),
    (Mods::CINEMA, "CN"),
    (Mods::TARGET, "TP"),
    (Mods::KEY9, "K9"),
    (Mods::KEYCOOP, "CO"),
    (Mods::KEY1, "K1"),
    (Mods::KEY3, "K3"),
    (Mods::KEY2, "K2"),
    (Mods::SCOREV2, "V2"),
    (Mods::MIRROR, "MR"),
];

impl Mods {
    /// Parse a concatenated mod string like `HDDT` (case-insensitive).
    /// Unknown two-character chunks are ignored.
    pub fn from_modstr(s: &str) -> Mods {
        let upper = s.to_uppercase();
        let chars: Vec<char> = upper.chars().collect();
        let mut mods = Mods::empty();

        for chunk in chars.chunks(2) {
            if chunk.len() != 2 {
                break;
            }
            let code: String = chunk.iter().collect();
            if let Some((m, _)) = MOD_CODES.iter().find(|(_, c)| *c == code) {
                mods |= *m;
            }
        }

        mods
    }

    /// Parse the mods portion of a /np action, where mods arrive as words
    /// separated by `+`/`-`/`~`/`|` (f.e. ` +HardRock +DoubleTime`).
    pub fn from_np(s: &str, mode_vanilla: u8) -> Mods {
        let mut mods = Mods::empty();

        for word in s.split_whitespace() {
            let name = word.trim_matches(|c| matches!(c, '+' | '-' | '~' | '|'));
            mods |= match name.to_lowercase().as_str() {
                "nofail" => Mods::NOFAIL,
                "easy" => Mods::EASY,
                "touchscreen" | "touchdevice" => Mods::TOUCHSCREEN,
                "hidden" => Mods::HIDDEN,
                "hardrock" => Mods::HARDROCK,
                "suddendeath" => Mods::SUDDENDEATH,
                "doubletime" => Mods::DOUBLETIME,
                "relax" => Mods::RELAX,
                "halftime" => Mods::HALFTIME,
                "nightcore" => Mods::NIGHTCORE | Mods::DOUBLETIME,
                "flashlight" => Mods::FLASHLIGHT,
                "spunout" => Mods::SPUNOUT,
                "autopilot" | "relax2" => Mods::AUTOPILOT,
                "perfect" => Mods::PERFECT | Mods::SUDDENDEATH,
                "fadein" => Mods::FADEIN,
                "random" => Mods::RANDOM,
                "mirror" => Mods::MIRROR,
                "scorev2" => Mods::SCOREV2,
                _ => Mods::empty(),
            };
        }

        mods.filter_invalid_combos(mode_vanilla)
    }

    /// Drop combinations the client itself refuses: conflicting speed or
    /// difficulty mods, and mods that do not exist in the given mode.
    pub fn filter_invalid_combos(mut self, mode_vanilla: u8) -> Mods {
        if self.contains(Mods::NIGHTCORE) {
            self |= Mods::DOUBLETIME;
        }
        if self.contains(Mods::PERFECT) {
            self |= Mods::SUDDENDEATH;
        }
        if self.contains(Mods::DOUBLETIME) && self.contains(Mods::HALFTIME) {
            self &= !Mods::HALFTIME;
        }
        if self.contains(Mods::EASY) && self.contains(Mods::HARDROCK) {
            self &= !Mods::HARDROCK;
        }

        if mode_vanilla != 0 {
            self &= !Mods::AUTOPILOT;
        }
        if mode_vanilla == 3 {
            // relax does not exist in mania
            self &= !Mods::RELAX;
        } else {
            // key mods and mirror are mania-only
            self &= !(Mods::KEY1
                | Mods::KEY2
                | Mods::KEY3
                | Mods::KEY4
                | Mods::KEY5
                | Mods::KEY6
                | Mods::KEY7
                | Mods::KEY8
                | Mods::KEY9
                | Mods::KEYCOOP
                | Mods::FADEIN
                | Mods::MIRROR);
        }

        self
    }
}

impl fmt::Display for Mods {
    /// Concatenated short codes (`HDDT`), or `NM` for no mods.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NM");
        }
        for (m, code) in MOD_CODES {
            // NC and PF imply DT/SD; show only the implying mod
            if *m == Mods::DOUBLETIME && self.contains(Mods::NIGHTCORE) {
                continue;
            }
            if *m == Mods::SUDDENDEATH && self.contains(Mods::PERFECT) {
                continue;
            }
            if self.contains(*m) {
                write!(f, "{}", code)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modstr_round_trip() {
        let mods = Mods::from_modstr("hddt");
        assert_eq!(mods, Mods::HIDDEN | Mods::DOUBLETIME);
        assert_eq!(mods.to_string(), "HDDT");
    }

    #[test]
    fn nomod_display() {
        assert_eq!(Mods::empty().to_string(), "NM");
    }

    #[test]
    fn nightcore_implies_doubletime() {
        let mods = Mods::from_np("+Nightcore", 0);
        assert!(mods.contains(Mods::DOUBLETIME));
        assert_eq!(mods.to_string(), "NC");
    }

    #[test]
    fn invalid_combos_filtered() {
        let mods = (Mods::DOUBLETIME | Mods::HALFTIME | Mods::EASY | Mods::HARDROCK)
            .filter_invalid_combos(0);
        assert_eq!(mods, Mods::DOUBLETIME | Mods::EASY);

        let mania = (Mods::RELAX | Mods::KEY4).filter_invalid_combos(3);
        assert_eq!(mania, Mods::KEY4);
    }
}
