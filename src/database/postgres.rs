use anyhow::Result;
use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use tokio_postgres::{NoTls, Row};

use crate::database::api::*;
use crate::database::structs::*;
use crate::session::make_safe_name;

type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// The production store, over a bb8 connection pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

/// Connect using a libpq-style connection string.
pub async fn pg_connect(connection: &str) -> Result<PgDatabase> {
    let manager = PostgresConnectionManager::new_from_stringlike(connection, NoTls)?;
    let pool = Pool::builder().build(manager).await?;
    Ok(PgDatabase { pool })
}

const USER_COLUMNS: &str =
    "id, name, safe_name, pw_bcrypt, priv, country, silence_end, donor_end, \
     clan_id, clan_priv, api_key";

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        safe_name: row.get("safe_name"),
        pw_bcrypt: row.get("pw_bcrypt"),
        privileges: row.get("priv"),
        country: row.get("country"),
        silence_end: row.get("silence_end"),
        donor_end: row.get("donor_end"),
        clan_id: row.get("clan_id"),
        clan_priv: row.get("clan_priv"),
        api_key: row.get("api_key"),
    }
}

#[async_trait]
impl UserQueries for PgDatabase {
    async fn user_by_safe_name(&self, safe_name: &str) -> Result<Option<User>> {
        let conn = self.pool.get().await?;
        let stmt = format!("SELECT {} FROM users WHERE safe_name = $1", USER_COLUMNS);
        let row = conn.query_opt(stmt.as_str(), &[&safe_name]).await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn user_by_id(&self, id: i32) -> Result<Option<User>> {
        let conn = self.pool.get().await?;
        let stmt = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = conn.query_opt(stmt.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn username_taken(&self, name: &str) -> Result<bool> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT 1 FROM users WHERE safe_name = $1",
                &[&make_safe_name(name)],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn update_username(&self, id: i32, name: &str, safe_name: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET name = $1, safe_name = $2 WHERE id = $3",
            &[&name, &safe_name, &id],
        )
        .await?;
        Ok(())
    }

    async fn update_privileges(&self, id: i32, privileges: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET priv = $1 WHERE id = $2",
            &[&privileges, &id],
        )
        .await?;
        Ok(())
    }

    async fn update_silence_end(&self, id: i32, silence_end: i64) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET silence_end = $1 WHERE id = $2",
            &[&silence_end, &id],
        )
        .await?;
        Ok(())
    }

    async fn update_country(&self, id: i32, country: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET country = $1 WHERE id = $2",
            &[&country, &id],
        )
        .await?;
        Ok(())
    }

    async fn update_donor_end(&self, id: i32, donor_end: i64) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET donor_end = $1 WHERE id = $2",
            &[&donor_end, &id],
        )
        .await?;
        Ok(())
    }

    async fn update_clan(&self, id: i32, clan_id: i32, clan_priv: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET clan_id = $1, clan_priv = $2 WHERE id = $3",
            &[&clan_id, &clan_priv, &id],
        )
        .await?;
        Ok(())
    }

    async fn touch_latest_activity(&self, id: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET latest_activity = EXTRACT(EPOCH FROM NOW())::BIGINT WHERE id = $1",
            &[&id],
        )
        .await?;
        Ok(())
    }

    async fn update_api_key(&self, id: i32, api_key: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE users SET api_key = $1 WHERE id = $2",
            &[&api_key, &id],
        )
        .await?;
        Ok(())
    }

    async fn expired_donors(&self, now: i64) -> Result<Vec<User>> {
        let conn = self.pool.get().await?;
        let donor_bits = (crate::privileges::Privileges::DONATOR).bits();
        let stmt = format!(
            "SELECT {} FROM users WHERE donor_end <= $1 AND priv & $2 != 0",
            USER_COLUMNS
        );
        let rows = conn.query(stmt.as_str(), &[&now, &donor_bits]).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn stats_for_user(&self, id: i32) -> Result<Vec<ModeStatsRow>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT mode, tscore, rscore, pp, acc, plays, playtime, max_combo \
                 FROM stats WHERE id = $1 ORDER BY mode",
                &[&id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| ModeStatsRow {
                mode: row.get("mode"),
                total_score: row.get("tscore"),
                ranked_score: row.get("rscore"),
                pp: row.get("pp"),
                accuracy: row.get("acc"),
                plays: row.get("plays"),
                playtime: row.get("playtime"),
                max_combo: row.get("max_combo"),
            })
            .collect())
    }
}

#[async_trait]
impl RelationshipQueries for PgDatabase {
    async fn relationships_for(&self, user_id: i32) -> Result<Vec<Relationship>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT user2, type FROM relationships WHERE user1 = $1",
                &[&user_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| Relationship {
                target_id: row.get("user2"),
                kind: if row.get::<_, &str>("type") == "friend" {
                    RelationshipKind::Friend
                } else {
                    RelationshipKind::Block
                },
            })
            .collect())
    }

    async fn upsert_relationship(
        &self,
        user_id: i32,
        target_id: i32,
        kind: RelationshipKind,
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        let kind_str = match kind {
            RelationshipKind::Friend => "friend",
            RelationshipKind::Block => "block",
        };
        conn.execute(
            "INSERT INTO relationships (user1, user2, type) VALUES ($1, $2, $3) \
             ON CONFLICT (user1, user2) DO UPDATE SET type = $3",
            &[&user_id, &target_id, &kind_str],
        )
        .await?;
        Ok(())
    }

    async fn delete_relationship(&self, user_id: i32, target_id: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "DELETE FROM relationships WHERE user1 = $1 AND user2 = $2",
            &[&user_id, &target_id],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MailQueries for PgDatabase {
    async fn unread_mail(&self, to_id: i32) -> Result<Vec<Mail>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT m.from_id, fu.name AS from_name, m.to_id, tu.name AS to_name, \
                        m.msg, m.time \
                 FROM mail m \
                 INNER JOIN users fu ON fu.id = m.from_id \
                 INNER JOIN users tu ON tu.id = m.to_id \
                 WHERE m.to_id = $1 AND m.read = FALSE \
                 ORDER BY m.time",
                &[&to_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| Mail {
                from_id: row.get("from_id"),
                from_name: row.get("from_name"),
                to_id: row.get("to_id"),
                to_name: row.get("to_name"),
                msg: row.get("msg"),
                sent_at: row.get("time"),
            })
            .collect())
    }

    async fn create_mail(&self, from_id: i32, to_id: i32, msg: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO mail (from_id, to_id, msg, time, read) \
             VALUES ($1, $2, $3, EXTRACT(EPOCH FROM NOW())::BIGINT, FALSE)",
            &[&from_id, &to_id, &msg],
        )
        .await?;
        Ok(())
    }

    async fn mark_mail_read(&self, to_id: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE mail SET read = TRUE WHERE to_id = $1 AND read = FALSE",
            &[&to_id],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelQueries for PgDatabase {
    async fn all_channels(&self) -> Result<Vec<ChannelRow>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT name, topic, read_priv, write_priv, auto_join FROM channels",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| ChannelRow {
                name: row.get("name"),
                topic: row.get("topic"),
                read_priv: row.get("read_priv"),
                write_priv: row.get("write_priv"),
                auto_join: row.get("auto_join"),
            })
            .collect())
    }
}

#[async_trait]
impl LogQueries for PgDatabase {
    async fn create_log(&self, from: i32, to: i32, action: LogAction, msg: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO logs (\"from\", \"to\", action, msg, time) \
             VALUES ($1, $2, $3, $4, NOW())",
            &[&from, &to, &action.as_str(), &msg],
        )
        .await?;
        Ok(())
    }

    async fn recent_notes(&self, about: i32, days: i64) -> Result<Vec<String>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT l.msg, l.time, u.name \
                 FROM logs l INNER JOIN users u ON u.id = l.\"from\" \
                 WHERE l.\"to\" = $1 AND l.action = 'note' \
                 AND l.time > NOW() - make_interval(days => $2) \
                 ORDER BY l.time",
                &[&about, &(days as i32)],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let time: chrono::NaiveDateTime = row.get("time");
                format!("[{}] {}: {}", time, row.get::<_, String>("name"), row.get::<_, String>("msg"))
            })
            .collect())
    }
}

#[async_trait]
impl ClanQueries for PgDatabase {
    async fn clan_by_id(&self, id: i32) -> Result<Option<Clan>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, name, tag, owner, created_at FROM clans WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.map(|row| clan_from_row(&row)))
    }

    async fn clan_by_tag(&self, tag: &str) -> Result<Option<Clan>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, name, tag, owner, created_at FROM clans WHERE tag = $1",
                &[&tag],
            )
            .await?;
        Ok(row.map(|row| clan_from_row(&row)))
    }

    async fn clan_by_name(&self, name: &str) -> Result<Option<Clan>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, name, tag, owner, created_at FROM clans WHERE name = $1",
                &[&name],
            )
            .await?;
        Ok(row.map(|row| clan_from_row(&row)))
    }

    async fn all_clans(&self) -> Result<Vec<Clan>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query("SELECT id, name, tag, owner, created_at FROM clans", &[])
            .await?;
        Ok(rows.iter().map(clan_from_row).collect())
    }

    async fn create_clan(&self, name: &str, tag: &str, owner: i32) -> Result<Clan> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_one(
                "INSERT INTO clans (name, tag, owner, created_at) VALUES ($1, $2, $3, NOW()) \
                 RETURNING id, name, tag, owner, created_at",
                &[&name, &tag, &owner],
            )
            .await?;
        Ok(clan_from_row(&row))
    }

    async fn delete_clan(&self, id: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute("DELETE FROM clans WHERE id = $1", &[&id]).await?;
        Ok(())
    }

    async fn clan_members(&self, clan_id: i32) -> Result<Vec<User>> {
        let conn = self.pool.get().await?;
        let stmt = format!("SELECT {} FROM users WHERE clan_id = $1", USER_COLUMNS);
        let rows = conn.query(stmt.as_str(), &[&clan_id]).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }
}

fn clan_from_row(row: &Row) -> Clan {
    Clan {
        id: row.get("id"),
        name: row.get("name"),
        tag: row.get("tag"),
        owner: row.get("owner"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl PoolQueries for PgDatabase {
    async fn all_pools(&self) -> Result<Vec<TourneyPool>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT id, name, created_by, created_at FROM tourney_pools",
                &[],
            )
            .await?;
        Ok(rows.iter().map(pool_from_row).collect())
    }

    async fn pool_by_name(&self, name: &str) -> Result<Option<TourneyPool>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, name, created_by, created_at FROM tourney_pools WHERE name = $1",
                &[&name],
            )
            .await?;
        Ok(row.map(|row| pool_from_row(&row)))
    }

    async fn create_pool(&self, name: &str, created_by: i32) -> Result<TourneyPool> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_one(
                "INSERT INTO tourney_pools (name, created_by, created_at) \
                 VALUES ($1, $2, NOW()) \
                 RETURNING id, name, created_by, created_at",
                &[&name, &created_by],
            )
            .await?;
        Ok(pool_from_row(&row))
    }

    async fn delete_pool(&self, id: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute("DELETE FROM tourney_pool_maps WHERE pool_id = $1", &[&id])
            .await?;
        conn.execute("DELETE FROM tourney_pools WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn pool_maps(&self, pool_id: i32) -> Result<Vec<PoolMap>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT pool_id, map_id, mods, slot FROM tourney_pool_maps WHERE pool_id = $1",
                &[&pool_id],
            )
            .await?;
        Ok(rows.iter().map(pool_map_from_row).collect())
    }

    async fn pool_pick(&self, pool_id: i32, mods: i32, slot: i32) -> Result<Option<PoolMap>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT pool_id, map_id, mods, slot FROM tourney_pool_maps \
                 WHERE pool_id = $1 AND mods = $2 AND slot = $3",
                &[&pool_id, &mods, &slot],
            )
            .await?;
        Ok(row.map(|row| pool_map_from_row(&row)))
    }

    async fn add_pool_map(&self, entry: PoolMap) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO tourney_pool_maps (pool_id, map_id, mods, slot) \
             VALUES ($1, $2, $3, $4)",
            &[&entry.pool_id, &entry.map_id, &entry.mods, &entry.slot],
        )
        .await?;
        Ok(())
    }

    async fn remove_pool_map(&self, pool_id: i32, map_id: i32) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "DELETE FROM tourney_pool_maps WHERE pool_id = $1 AND map_id = $2",
            &[&pool_id, &map_id],
        )
        .await?;
        Ok(())
    }
}

fn pool_from_row(row: &Row) -> TourneyPool {
    TourneyPool {
        id: row.get("id"),
        name: row.get("name"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

fn pool_map_from_row(row: &Row) -> PoolMap {
    PoolMap {
        pool_id: row.get("pool_id"),
        map_id: row.get("map_id"),
        mods: row.get("mods"),
        slot: row.get("slot"),
    }
}

#[async_trait]
impl AuditQueries for PgDatabase {
    async fn create_login(
        &self,
        user_id: i32,
        ip: &str,
        osu_version: &str,
        osu_stream: &str,
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO ingame_logins (userid, ip, osu_ver, osu_stream, datetime) \
             VALUES ($1, $2, $3, $4, NOW())",
            &[&user_id, &ip, &osu_version, &osu_stream],
        )
        .await?;
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
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO client_hashes \
             (userid, osupath, adapters, uninstall_id, disk_serial, latest_time, occurrences) \
             VALUES ($1, $2, $3, $4, $5, NOW(), 1) \
             ON CONFLICT (userid, osupath, adapters, uninstall_id, disk_serial) \
             DO UPDATE SET latest_time = NOW(), occurrences = client_hashes.occurrences + 1",
            &[
                &user_id,
                &osu_path_md5,
                &adapters_md5,
                &uninstall_md5,
                &disk_signature_md5,
            ],
        )
        .await?;
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
        let conn = self.pool.get().await?;
        let rows = if running_under_wine {
            // adapters and disk serials are fabricated under wine
            conn.query(
                "SELECT DISTINCT u.id, u.priv FROM client_hashes ch \
                 INNER JOIN users u ON u.id = ch.userid \
                 WHERE ch.userid != $1 AND ch.uninstall_id = $2",
                &[&user_id, &uninstall_md5],
            )
            .await?
        } else {
            conn.query(
                "SELECT DISTINCT u.id, u.priv FROM client_hashes ch \
                 INNER JOIN users u ON u.id = ch.userid \
                 WHERE ch.userid != $1 AND \
                 (ch.adapters = $2 OR ch.uninstall_id = $3 OR ch.disk_serial = $4)",
                &[&user_id, &adapters_md5, &uninstall_md5, &disk_signature_md5],
            )
            .await?
        };
        Ok(rows
            .iter()
            .map(|row| HardwareMatch {
                user_id: row.get("id"),
                privileges: row.get("priv"),
            })
            .collect())
    }
}
