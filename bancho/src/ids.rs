/// Packet ids sent by the osu! client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClientPacketId {
    ChangeAction = 0,
    SendPublicMessage = 1,
    Logout = 2,
    RequestStatusUpdate = 3,
    Ping = 4,
    StartSpectating = 16,
    StopSpectating = 17,
    SpectateFrames = 18,
    ErrorReport = 20,
    CantSpectate = 21,
    SendPrivateMessage = 25,
    PartLobby = 29,
    JoinLobby = 30,
    CreateMatch = 31,
    JoinMatch = 32,
    PartMatch = 33,
    MatchChangeSlot = 38,
    MatchReady = 39,
    MatchLock = 40,
    MatchChangeSettings = 41,
    MatchStart = 44,
    MatchScoreUpdate = 47,
    MatchComplete = 49,
    MatchChangeMods = 51,
    MatchLoadComplete = 52,
    MatchNoBeatmap = 54,
    MatchNotReady = 55,
    MatchFailed = 56,
    MatchHasBeatmap = 59,
    MatchSkipRequest = 60,
    ChannelJoin = 63,
    MatchTransferHost = 70,
    FriendAdd = 73,
    FriendRemove = 74,
    MatchChangeTeam = 77,
    ChannelPart = 78,
    ReceiveUpdates = 79,
    SetAwayMessage = 82,
    UserStatsRequest = 85,
    MatchInvite = 87,
    MatchChangePassword = 90,
    TournamentMatchInfoRequest = 93,
    UserPresenceRequest = 97,
    UserPresenceRequestAll = 98,
    ToggleBlockNonFriendDms = 99,
    TournamentJoinMatchChannel = 108,
    TournamentLeaveMatchChannel = 109,
}

impl ClientPacketId {
    /// Map a raw packet id to a known client packet, or `None` for ids the
    /// server does not handle (these are skipped, never an error).
    pub fn from_u16(id: u16) -> Option<ClientPacketId> {
        use ClientPacketId::*;
        Some(match id {
            0 => ChangeAction,
            1 => SendPublicMessage,
            2 => Logout,
            3 => RequestStatusUpdate,
            4 => Ping,
            16 => StartSpectating,
            17 => StopSpectating,
            18 => SpectateFrames,
            20 => ErrorReport,
            21 => CantSpectate,
            25 => SendPrivateMessage,
            29 => PartLobby,
            30 => JoinLobby,
            31 => CreateMatch,
            32 => JoinMatch,
            33 => PartMatch,
            38 => MatchChangeSlot,
            39 => MatchReady,
            40 => MatchLock,
            41 => MatchChangeSettings,
            44 => MatchStart,
            47 => MatchScoreUpdate,
            49 => MatchComplete,
            51 => MatchChangeMods,
            52 => MatchLoadComplete,
            54 => MatchNoBeatmap,
            55 => MatchNotReady,
            56 => MatchFailed,
            59 => MatchHasBeatmap,
            60 => MatchSkipRequest,
            63 => ChannelJoin,
            70 => MatchTransferHost,
            73 => FriendAdd,
            74 => FriendRemove,
            77 => MatchChangeTeam,
            78 => ChannelPart,
            79 => ReceiveUpdates,
            82 => SetAwayMessage,
            85 => UserStatsRequest,
            87 => MatchInvite,
            90 => MatchChangePassword,
            93 => TournamentMatchInfoRequest,
            97 => UserPresenceRequest,
            98 => UserPresenceRequestAll,
            99 => ToggleBlockNonFriendDms,
            108 => TournamentJoinMatchChannel,
            109 => TournamentLeaveMatchChannel,
            _ => return None,
        })
    }
}

/// Packet ids sent to the osu! client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServerPacketId {
    UserId = 5,
    SendMessage = 7,
    Pong = 8,
    UserStats = 11,
    UserLogout = 12,
    SpectatorJoined = 13,
    SpectatorLeft = 14,
    SpectateFrames = 15,
    VersionUpdate = 19,
    SpectatorCantSpectate = 22,
    Notification = 24,
    UpdateMatch = 26,
    NewMatch = 27,
    DisposeMatch = 28,
    MatchJoinSuccess = 36,
    MatchJoinFail = 37,
    FellowSpectatorJoined = 42,
    FellowSpectatorLeft = 43,
    MatchStart = 46,
    MatchScoreUpdate = 48,
    MatchTransferHost = 50,
    MatchAllPlayersLoaded = 53,
    MatchPlayerFailed = 57,
    MatchComplete = 58,
    MatchSkip = 61,
    ChannelJoinSuccess = 64,
    ChannelInfo = 65,
    ChannelKick = 66,
    ChannelAutoJoin = 67,
    Privileges = 71,
    FriendsList = 72,
    ProtocolVersion = 75,
    MainMenuIcon = 76,
    MatchPlayerSkipped = 81,
    UserPresence = 83,
    Restart = 86,
    MatchInvite = 88,
    ChannelInfoEnd = 89,
    MatchChangePassword = 91,
    SilenceEnd = 92,
    UserSilenced = 94,
    UserPresenceSingle = 95,
    UserPresenceBundle = 96,
    UserDmBlocked = 100,
    TargetIsSilenced = 101,
    VersionUpdateForced = 102,
    SwitchServer = 103,
    AccountRestricted = 104,
    MatchAbort = 106,
    SwitchTournamentServer = 107,
}
