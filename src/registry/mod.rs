pub use channels::{Channel, ChannelRegistry};
pub use players::{BcryptCache, PlayerRegistry};

mod channels;
mod players;
