//! Scrim point settlement: when every playing slot completes in a
//! scrimming match, a task polls the former players' recent scores, sums
//! them by player or team, and announces the point (or the match).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;

use crate::constants::{SCRIM_SUBMISSION_WAIT_SECS, TOURNEY_MATCH_NAME};
use crate::commands::scrim_key_label;
use crate::matches::{MatchTeam, ScrimKey, WinCondition};
use crate::server::Server;
use crate::session::RecentScore;

/// Which scalar the win condition selects out of a score.
fn score_value(score: &RecentScore, win_condition: WinCondition, use_pp: bool) -> f64 {
    if use_pp {
        return score.pp as f64;
    }
    match win_condition {
        WinCondition::Score | WinCondition::ScoreV2 => score.score as f64,
        WinCondition::Accuracy => score.accuracy as f64,
        WinCondition::Combo => score.max_combo as f64,
    }
}

fn format_value(value: f64, win_condition: WinCondition, use_pp: bool) -> String {
    if use_pp {
        format!("{:.2}pp", value)
    } else {
        match win_condition {
            WinCondition::Accuracy => format!("{:.2}%", value),
            WinCondition::Combo => format!("{}x", value as i64),
            _ => format!("{}", value as i64),
        }
    }
}

impl Server {
    /// Settle one scrim point in the background; `was_playing` is the
    /// (user, team) set captured when the last slot completed.
    pub(crate) fn spawn_scrim_scoring(&self, match_id: u16, was_playing: Vec<(i32, MatchTeam)>) {
        let server = self.clone();
        tokio::spawn(async move {
            server.settle_scrim_point(match_id, was_playing).await;
        });
    }

    async fn settle_scrim_point(&self, match_id: u16, was_playing: Vec<(i32, MatchTeam)>) {
        let Some(snapshot) = self.scrim_snapshot(match_id).await else {
            return;
        };

        let beatmap = match self.beatmaps.by_md5(&snapshot.map_md5).await {
            Ok(Some(map)) => map,
            _ => {
                // map isn't submitted anywhere we can see
                let mut world = self.world.write().await;
                world.match_send_bot(match_id, "Scores could not be calculated.");
                return;
            }
        };

        let mut totals: HashMap<ScrimKey, f64> = HashMap::new();
        let mut didnt_submit: Vec<i32> = Vec::new();
        // the wait budget is shared across all players, not per player
        let mut waited = 0.0_f64;

        for (user_id, team) in &was_playing {
            loop {
                let score = {
                    let world = self.world.read().await;
                    world
                        .players
                        .get(*user_id)
                        .and_then(|s| s.recent_score().cloned())
                };

                let max_age = Utc::now()
                    - chrono::Duration::milliseconds(
                        ((beatmap.total_length as f64 + waited + 0.5) * 1000.0) as i64,
                    );

                if let Some(score) = score {
                    if score.beatmap_md5 == snapshot.map_md5 && score.server_time > max_age {
                        let value =
                            score_value(&score, snapshot.win_condition, snapshot.use_pp_scoring);
                        if value != 0.0 {
                            let key = if snapshot.ffa {
                                ScrimKey::User(*user_id)
                            } else {
                                ScrimKey::Team(*team)
                            };
                            *totals.entry(key).or_insert(0.0) += value;
                        }
                        break;
                    }
                }

                tokio::time::sleep(Duration::from_millis(500)).await;
                waited += 0.5;
                if waited > SCRIM_SUBMISSION_WAIT_SECS {
                    didnt_submit.push(*user_id);
                    break;
                }
            }
        }

        let mut world = self.world.write().await;

        for user_id in &didnt_submit {
            let name = world
                .players
                .get(*user_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("user {}", user_id));
            world.match_send_bot(
                match_id,
                &format!("{} didn't submit a score (timeout: 10s).", name),
            );
        }

        if totals.is_empty() {
            world.match_send_bot(match_id, "Scores could not be calculated.");
            return;
        }

        // every participant scoring the same total is a tie
        let values: Vec<f64> = totals.values().copied().collect();
        if totals.len() != 1 && values.windows(2).all(|w| w[0] == w[1]) {
            if let Some(m) = world.matches.get_mut(match_id) {
                m.winners.push(None);
            }
            world.match_send_bot(match_id, "The point has ended in a tie!");
            return;
        }

        let (winner, winner_total) = totals
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, v)| (*k, *v))
            .expect("totals is non-empty");

        let (winner_points, standings, match_over, match_name) = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            m.winners.push(Some(winner));
            let entry = m.match_points.entry(winner).or_insert(0);
            *entry += 1;
            let points = *entry;

            // snapshot before a match win wipes the scrim state
            let standings = m.match_points.clone();
            let over = m.winning_points != 0 && points == m.winning_points;
            if over {
                m.is_scrimming = false;
                m.reset_scrim();
            }
            (points, standings, over, m.name.clone())
        };

        let fmt = |v: f64| format_value(v, snapshot.win_condition, snapshot.use_pp_scoring);
        let mut lines: Vec<String> = Vec::new();

        if snapshot.ffa {
            let winner_name = scrim_key_label(&world, winner);
            let avg: f64 = values.iter().sum::<f64>() / values.len() as f64;
            lines.push(format!(
                "{} takes the point! ({} [Match avg. {}])",
                winner_name,
                fmt(winner_total),
                fmt(avg)
            ));

            if match_over {
                lines.push(format!("{} takes the match! Congratulations!", winner_name));
            } else {
                // running totals, highest first
                let mut rows: Vec<(String, i32)> = standings
                    .iter()
                    .map(|(k, v)| (scrim_key_label(&world, *k), *v))
                    .collect();
                rows.sort_by_key(|(_, v)| std::cmp::Reverse(*v));
                let joined = rows
                    .iter()
                    .map(|(name, points)| format!("{} - {}", name, points))
                    .collect::<Vec<_>>()
                    .join(" | ");
                lines.push(format!("Total Score: {}", joined));
            }
        } else {
            // team names come from tourney-style titles when present
            let (title, blue_name, red_name) = match TOURNEY_MATCH_NAME.captures(&match_name) {
                Some(caps) => (
                    caps["name"].to_string(),
                    caps["t1"].to_string(),
                    caps["t2"].to_string(),
                ),
                None => (match_name.clone(), "Blue".to_string(), "Red".to_string()),
            };

            let winner_team = match winner {
                ScrimKey::Team(team) => team,
                ScrimKey::User(_) => MatchTeam::Neutral,
            };
            let loser_team = winner_team.opponent();
            let loser = ScrimKey::Team(loser_team);

            let name_of = |team: MatchTeam| match team {
                MatchTeam::Blue => blue_name.clone(),
                _ => red_name.clone(),
            };
            let winner_name = name_of(winner_team);
            let loser_name = name_of(loser_team);
            let loser_total = totals.get(&loser).copied().unwrap_or(0.0);
            let loser_points = standings.get(&loser).copied().unwrap_or(0);

            lines.push(format!(
                "{} takes the point! ({} vs. {})",
                winner_name,
                fmt(winner_total),
                fmt(loser_total)
            ));

            if match_over {
                lines.push(format!(
                    "{} takes the match, finishing {} with a score of {} - {}! Congratulations!",
                    winner_name, title, winner_points, loser_points
                ));
            } else {
                lines.push(format!(
                    "Total Score: {} | {} - {} | {}",
                    winner_name, winner_points, loser_points, loser_name
                ));
            }
        }

        if !didnt_submit.is_empty() {
            world.match_send_bot(
                match_id,
                "If you'd like to perform a rematch, please use the `!mp rematch` command.",
            );
        }
        for line in lines {
            world.match_send_bot(match_id, &line);
        }
    }

    async fn scrim_snapshot(&self, match_id: u16) -> Option<ScrimSnapshot> {
        let world = self.world.read().await;
        let m = world.matches.get(match_id)?;
        Some(ScrimSnapshot {
            map_md5: m.map_md5.clone(),
            win_condition: m.win_condition,
            use_pp_scoring: m.use_pp_scoring,
            ffa: m.team_type.is_ffa(),
        })
    }
}

struct ScrimSnapshot {
    map_md5: String,
    win_condition: WinCondition,
    use_pp_scoring: bool,
    ffa: bool,
}
