//! torii: an osu!-compatible game server core. Presence, chat, spectating
//! and multiplayer over the Bancho protocol; everything else (web, score
//! submission, beatmap hosting) lives behind the ports in [`network`],
//! [`database`], [`leaderboard`] and [`performance`].

pub mod bot;
pub mod commands;
pub mod config;
pub mod constants;
pub mod database;
pub mod gamemode;
pub mod handlers;
pub mod housekeeping;
pub mod http;
pub mod leaderboard;
pub mod login;
pub mod matches;
pub mod mods;
pub mod network;
pub mod performance;
pub mod privileges;
pub mod registry;
pub mod server;
pub mod session;
pub mod world;

mod chat;
