use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::database::api::*;
use crate::database::structs::*;

/// An in-memory stand-in for the persistent store. Everything lives behind
/// one mutex; good enough for tests and for running the server without a
/// database.
#[derive(Default)]
pub struct MockDatabase {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    stats: Vec<(i32, ModeStatsRow)>,
    relationships: Vec<(i32, i32, RelationshipKind)>,
    mail: Vec<StoredMail>,
    channels: Vec<ChannelRow>,
    logs: Vec<(i32, i32, LogAction, String)>,
    clans: Vec<Clan>,
    pools: Vec<TourneyPool>,
    pool_maps: Vec<PoolMap>,
    client_hashes: Vec<(i32, String, String, String, String)>,
    logins: usize,
}

struct StoredMail {
    from_id: i32,
    to_id: i32,
    msg: String,
    sent_at: i64,
    read: bool,
}

impl MockDatabase {
    pub fn new() -> Self {
        MockDatabase::default()
    }

    pub fn add_user(&self, user: User) {
        self.inner.lock().unwrap().users.push(user);
    }

    pub fn add_channel(&self, channel: ChannelRow) {
        self.inner.lock().unwrap().channels.push(channel);
    }

    pub fn add_stats(&self, user_id: i32, row: ModeStatsRow) {
        self.inner.lock().unwrap().stats.push((user_id, row));
    }

    pub fn login_count(&self) -> usize {
        self.inner.lock().unwrap().logins
    }

    pub fn log_count(&self) -> usize {
        self.inner.lock().unwrap().logs.len()
    }

    pub fn mail_count(&self) -> usize {
        self.inner.lock().unwrap().mail.len()
    }
}

#[async_trait]
impl UserQueries for MockDatabase {
    async fn user_by_safe_name(&self, safe_name: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.safe_name == safe_name).cloned())
    }

    async fn user_by_id(&self, id: i32) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn username_taken(&self, name: &str) -> Result<bool> {
        let safe = crate::session::make_safe_name(name);
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().any(|u| u.safe_name == safe))
    }

    async fn update_username(&self, id: i32, name: &str, safe_name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.name = name.to_string();
            user.safe_name = safe_name.to_string();
        }
        Ok(())
    }

    async fn update_privileges(&self, id: i32, privileges: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.privileges = privileges;
        }
        Ok(())
    }

    async fn update_silence_end(&self, id: i32, silence_end: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.silence_end = silence_end;
        }
        Ok(())
    }

    async fn update_country(&self, id: i32, country: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.country = country.to_string();
        }
        Ok(())
    }

    async fn update_donor_end(&self, id: i32, donor_end: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.donor_end = donor_end;
        }
        Ok(())
    }

    async fn update_clan(&self, id: i32, clan_id: i32, clan_priv: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.clan_id = clan_id;
            user.clan_priv = clan_priv;
        }
        Ok(())
    }

    async fn touch_latest_activity(&self, _id: i32) -> Result<()> {
        Ok(())
    }

    async fn update_api_key(&self, id: i32, api_key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.api_key = Some(api_key.to_string());
        }
        Ok(())
    }

    async fn expired_donors(&self, now: i64) -> Result<Vec<User>> {
        let donor_bits = crate::privileges::Privileges::DONATOR.bits();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|u| u.donor_end <= now && u.privileges & donor_bits != 0)
            .cloned()
            .collect())
    }

    async fn stats_for_user(&self, id: i32) -> Result<Vec<ModeStatsRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stats
            .iter()
            .filter(|(uid, _)| *uid == id)
            .map(|(_, row)| *row)
            .collect())
    }
}

#[async_trait]
impl RelationshipQueries for MockDatabase {
    async fn relationships_for(&self, user_id: i32) -> Result<Vec<Relationship>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .relationships
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, t, k)| Relationship {
                target_id: *t,
                kind: *k,
            })
            .collect())
    }

    async fn upsert_relationship(
        &self,
        user_id: i32,
        target_id: i32,
        kind: RelationshipKind,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .relationships
            .retain(|(u, t, _)| !(*u == user_id && *t == target_id));
        inner.relationships.push((user_id, target_id, kind));
        Ok(())
    }

    async fn delete_relationship(&self, user_id: i32, target_id: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .relationships
            .retain(|(u, t, _)| !(*u == user_id && *t == target_id));
        Ok(())
    }
}

#[async_trait]
impl MailQueries for MockDatabase {
    async fn unread_mail(&self, to_id: i32) -> Result<Vec<Mail>> {
        let inner = self.inner.lock().unwrap();
        let name_of = |id: i32| {
            inner
                .users
                .iter()
                .find(|u| u.id == id)
                .map(|u| u.name.clone())
                .unwrap_or_default()
        };
        Ok(inner
            .mail
            .iter()
            .filter(|m| m.to_id == to_id && !m.read)
            .map(|m| Mail {
                from_id: m.from_id,
                from_name: name_of(m.from_id),
                to_id: m.to_id,
                to_name: name_of(m.to_id),
                msg: m.msg.clone(),
                sent_at: m.sent_at,
            })
            .collect())
    }

    async fn create_mail(&self, from_id: i32, to_id: i32, msg: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mail.push(StoredMail {
            from_id,
            to_id,
            msg: msg.to_string(),
            sent_at: Utc::now().timestamp(),
            read: false,
        });
        Ok(())
    }

    async fn mark_mail_read(&self, to_id: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for m in inner.mail.iter_mut().filter(|m| m.to_id == to_id) {
            m.read = true;
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelQueries for MockDatabase {
    async fn all_channels(&self) -> Result<Vec<ChannelRow>> {
        Ok(self.inner.lock().unwrap().channels.clone())
    }
}

#[async_trait]
impl LogQueries for MockDatabase {
    async fn create_log(&self, from: i32, to: i32, action: LogAction, msg: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.logs.push((from, to, action, msg.to_string()));
        Ok(())
    }

    async fn recent_notes(&self, about: i32, _days: i64) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .logs
            .iter()
            .filter(|(_, to, action, _)| *to == about && *action == LogAction::Note)
            .map(|(from, _, _, msg)| format!("{}: {}", from, msg))
            .collect())
    }
}

#[async_trait]
impl ClanQueries for MockDatabase {
    async fn clan_by_id(&self, id: i32) -> Result<Option<Clan>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clans.iter().find(|c| c.id == id).cloned())
    }

    async fn clan_by_tag(&self, tag: &str) -> Result<Option<Clan>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clans.iter().find(|c| c.tag == tag).cloned())
    }

    async fn clan_by_name(&self, name: &str) -> Result<Option<Clan>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clans.iter().find(|c| c.name == name).cloned())
    }

    async fn all_clans(&self) -> Result<Vec<Clan>> {
        Ok(self.inner.lock().unwrap().clans.clone())
    }

    async fn create_clan(&self, name: &str, tag: &str, owner: i32) -> Result<Clan> {
        let mut inner = self.inner.lock().unwrap();
        let clan = Clan {
            id: inner.clans.len() as i32 + 1,
            name: name.to_string(),
            tag: tag.to_string(),
            owner,
            created_at: Utc::now().naive_utc(),
        };
        inner.clans.push(clan.clone());
        Ok(clan)
    }

    async fn delete_clan(&self, id: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.clans.retain(|c| c.id != id);
        Ok(())
    }

    async fn clan_members(&self, clan_id: i32) -> Result<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|u| u.clan_id == clan_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PoolQueries for MockDatabase {
    async fn all_pools(&self) -> Result<Vec<TourneyPool>> {
        Ok(self.inner.lock().unwrap().pools.clone())
    }

    async fn pool_by_name(&self, name: &str) -> Result<Option<TourneyPool>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.pools.iter().find(|p| p.name == name).cloned())
    }

    async fn create_pool(&self, name: &str, created_by: i32) -> Result<TourneyPool> {
        let mut inner = self.inner.lock().unwrap();
        let pool = TourneyPool {
            id: inner.pools.len() as i32 + 1,
            name: name.to_string(),
            created_by,
            created_at: Utc::now().naive_utc(),
        };
        inner.pools.push(pool.clone());
        Ok(pool)
    }

    async fn delete_pool(&self, id: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.pools.retain(|p| p.id != id);
        inner.pool_maps.retain(|m| m.pool_id != id);
        Ok(())
    }

    async fn pool_maps(&self, pool_id: i32) -> Result<Vec<PoolMap>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pool_maps
            .iter()
            .filter(|m| m.pool_id == pool_id)
            .copied()
            .collect())
    }

    async fn pool_pick(&self, pool_id: i32, mods: i32, slot: i32) -> Result<Option<PoolMap>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pool_maps
            .iter()
            .find(|m| m.pool_id == pool_id && m.mods == mods && m.slot == slot)
            .copied())
    }

    async fn add_pool_map(&self, entry: PoolMap) -> Result<()> {
        self.inner.lock().unwrap().pool_maps.push(entry);
        Ok(())
    }

    async fn remove_pool_map(&self, pool_id: i32, map_id: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .pool_maps
            .retain(|m| !(m.pool_id == pool_id && m.map_id == map_id));
        Ok(())
    }
}

#[async_trait]
impl AuditQueries for MockDatabase {
    async fn create_login(
        &self,
        _user_id: i32,
        _ip: &str,
        _osu_version: &str,
        _osu_stream: &str,
    ) -> Result<()> {
        self.inner.lock().unwrap().logins += 1;
        Ok(())
    }

    async fn create_client_hashes(
        &self,
        user_id: i32,
        osu_path_md5: &str,
        adapters_md5: &str,
        uninstall_md5: &str,
        disk_signature_md5: &str,
    ) -> Result<()> {
        self.inner.lock().unwrap().client_hashes.push((
            user_id,
            osu_path_md5.to_string(),
            adapters_md5.to_string(),
            uninstall_md5.to_string(),
            disk_signature_md5.to_string(),
        ));
        Ok(())
    }

    async fn hardware_matches(
        &self,
        user_id: i32,
        running_under_wine: bool,
        adapters_md5: &str,
        uninstall_md5: &str,
        disk_signature_md5: Option<&str>,
    ) -> Result<Vec<HardwareMatch>> {
        let inner = self.inner.lock().unwrap();
        let mut matched = Vec::new();
        for (uid, _, adapters, uninstall, disk) in &inner.client_hashes {
            if *uid == user_id {
                continue;
            }
            let hit = if running_under_wine {
                uninstall == uninstall_md5
            } else {
                adapters == adapters_md5
                    || uninstall == uninstall_md5
                    || disk_signature_md5.is_some_and(|d| disk == d)
            };
            if hit {
                if let Some(user) = inner.users.iter().find(|u| u.id == *uid) {
                    matched.push(HardwareMatch {
                        user_id: *uid,
                        privileges: user.privileges,
                    });
                }
            }
        }
        Ok(matched)
    }
}
