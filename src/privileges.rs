use bitflags::bitflags;

bitflags! {
    /// Server-side user privileges, stored as a bitset in the users table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Privileges: i32 {
        /// An unbanned player.
        const UNRESTRICTED = 1 << 0;
        /// Has logged in to the server in-game at least once.
        const VERIFIED = 1 << 1;
        /// Bypasses low-ceiling anticheat measures (trusted).
        const WHITELISTED = 1 << 2;

        // donation tiers
        const SUPPORTER = 1 << 4;
        const PREMIUM = 1 << 5;

        /// Notable users, receives some extra benefits.
        const ALUMNI = 1 << 7;

        // staff permissions
        /// Able to manage match state without being host.
        const TOURNEY_MANAGER = 1 << 10;
        /// Able to manage maps' ranked status.
        const NOMINATOR = 1 << 11;
        /// Able to manage users (level 1).
        const MODERATOR = 1 << 12;
        /// Able to manage users (level 2).
        const ADMINISTRATOR = 1 << 13;
        /// Able to manage the full server state.
        const DEVELOPER = 1 << 14;

        const DONATOR = Self::SUPPORTER.bits() | Self::PREMIUM.bits();
        const STAFF = Self::MODERATOR.bits() | Self::ADMINISTRATOR.bits() | Self::DEVELOPER.bits();
    }
}

bitflags! {
    /// The privilege bits the osu! client understands.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClientPrivileges: u8 {
        const PLAYER = 1 << 0;
        const MODERATOR = 1 << 1;
        const SUPPORTER = 1 << 2;
        const OWNER = 1 << 3;
        const DEVELOPER = 1 << 4;
    }
}

impl Privileges {
    /// Project server privileges down to what the client is shown.
    pub fn client_privileges(self) -> ClientPrivileges {
        let mut out = ClientPrivileges::empty();
        if self.contains(Privileges::UNRESTRICTED) {
            out |= ClientPrivileges::PLAYER;
        }
        if self.intersects(Privileges::DONATOR) {
            out |= ClientPrivileges::SUPPORTER;
        }
        if self.contains(Privileges::MODERATOR) {
            out |= ClientPrivileges::MODERATOR;
        }
        if self.contains(Privileges::ADMINISTRATOR) {
            out |= ClientPrivileges::DEVELOPER;
        }
        if self.contains(Privileges::DEVELOPER) {
            out |= ClientPrivileges::OWNER;
        }
        out
    }
}

/// Clan membership levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ClanPrivileges {
    Member = 1,
    Officer = 2,
    Owner = 3,
}

impl ClanPrivileges {
    pub fn from_i32(v: i32) -> Option<ClanPrivileges> {
        Some(match v {
            1 => ClanPrivileges::Member,
            2 => ClanPrivileges::Officer,
            3 => ClanPrivileges::Owner,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            ClanPrivileges::Member => "Member",
            ClanPrivileges::Officer => "Officer",
            ClanPrivileges::Owner => "Owner",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_projection() {
        let privs = Privileges::UNRESTRICTED | Privileges::SUPPORTER | Privileges::DEVELOPER;
        let client = privs.client_privileges();
        assert!(client.contains(ClientPrivileges::PLAYER));
        assert!(client.contains(ClientPrivileges::SUPPORTER));
        assert!(client.contains(ClientPrivileges::OWNER));
        assert!(!client.contains(ClientPrivileges::MODERATOR));
    }

    #[test]
    fn staff_mask() {
        assert!(Privileges::MODERATOR.intersects(Privileges::STAFF));
        assert!(!Privileges::NOMINATOR.intersects(Privileges::STAFF));
    }
}
