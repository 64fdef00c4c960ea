use indexmap::IndexMap;

use crate::privileges::Privileges;

/// An osu! chat channel.
///
/// `real_name` is the server-side name (`#multi_7`, `#spec_1001`); the
/// client-facing name collapses instanced channels to `#multiplayer` /
/// `#spectator`.
#[derive(Clone, Debug)]
pub struct Channel {
    pub real_name: String,
    pub topic: String,
    pub read_priv: Privileges,
    pub write_priv: Privileges,
    pub auto_join: bool,
    /// Instanced channels are destroyed when their last member leaves.
    pub instance: bool,
    pub members: Vec<i32>,
}

impl Channel {
    pub fn new(
        real_name: &str,
        topic: &str,
        read_priv: Privileges,
        write_priv: Privileges,
        auto_join: bool,
        instance: bool,
    ) -> Channel {
        Channel {
            real_name: real_name.to_string(),
            topic: topic.to_string(),
            read_priv,
            write_priv,
            auto_join,
            instance,
            members: Vec::new(),
        }
    }

    /// An instanced channel for a match or a spectator group.
    pub fn instanced(real_name: &str, topic: &str) -> Channel {
        Channel::new(
            real_name,
            topic,
            Privileges::UNRESTRICTED,
            Privileges::UNRESTRICTED,
            false,
            true,
        )
    }

    /// The name as shown to clients.
    pub fn wire_name(&self) -> &str {
        if self.real_name.starts_with("#spec_") {
            "#spectator"
        } else if self.real_name.starts_with("#multi_") {
            "#multiplayer"
        } else {
            &self.real_name
        }
    }

    /// A zero mask means everyone; otherwise any overlapping bit grants
    /// access.
    pub fn can_read(&self, privileges: Privileges) -> bool {
        self.read_priv.is_empty() || privileges.intersects(self.read_priv)
    }

    pub fn can_write(&self, privileges: Privileges) -> bool {
        self.write_priv.is_empty() || privileges.intersects(self.write_priv)
    }

    pub fn contains(&self, user_id: i32) -> bool {
        self.members.contains(&user_id)
    }

    pub fn member_count(&self) -> u16 {
        self.members.len() as u16
    }
}

/// All live channels, static and instanced, keyed by real name in creation
/// order.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: IndexMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn init() -> Self {
        ChannelRegistry::default()
    }

    pub fn get(&self, real_name: &str) -> Option<&Channel> {
        self.channels.get(real_name)
    }

    pub fn get_mut(&mut self, real_name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(real_name)
    }

    pub fn contains(&self, real_name: &str) -> bool {
        self.channels.contains_key(real_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn append(&mut self, channel: Channel) {
        log::debug!("channel {} added", channel.real_name);
        self.channels.insert(channel.real_name.clone(), channel);
    }

    pub fn remove(&mut self, real_name: &str) -> Option<Channel> {
        let removed = self.channels.shift_remove(real_name);
        if removed.is_some() {
            log::debug!("channel {} removed", real_name);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_aliases_instances() {
        let spec = Channel::instanced("#spec_1001", "");
        assert_eq!(spec.wire_name(), "#spectator");

        let multi = Channel::instanced("#multi_12", "");
        assert_eq!(multi.wire_name(), "#multiplayer");

        let osu = Channel::new(
            "#osu",
            "general",
            Privileges::UNRESTRICTED,
            Privileges::UNRESTRICTED,
            true,
            false,
        );
        assert_eq!(osu.wire_name(), "#osu");
    }

    #[test]
    fn privilege_gates() {
        let staff_only = Channel::new(
            "#staff",
            "",
            Privileges::STAFF,
            Privileges::STAFF,
            false,
            false,
        );
        assert!(!staff_only.can_read(Privileges::UNRESTRICTED));
        assert!(staff_only.can_read(Privileges::MODERATOR));

        let open = Channel::new(
            "#osu",
            "",
            Privileges::empty(),
            Privileges::empty(),
            true,
            false,
        );
        assert!(open.can_read(Privileges::empty()));
    }
}
