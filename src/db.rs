//! PostgreSQL persistence.
//!
//! Each upsert is a single statement: the rows are bound as one array per
//! column and expanded server-side with `UNNEST`.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::models::{GameweekRecord, Player, Team};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid database configuration: {0}")]
    Config(String),

    #[error("failed to connect to database after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to upsert into {table}: {source}")]
    Upsert {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Write side of the job. The orchestrator only sees this trait.
#[allow(async_fn_in_trait)]
pub trait StatStore {
    /// Insert or refresh teams. Returns rows written.
    async fn upsert_teams(&self, teams: &[Team]) -> Result<u64, StoreError>;

    /// Insert or refresh players. Returns rows written.
    async fn upsert_players(&self, players: &[Player]) -> Result<u64, StoreError>;

    /// Insert history rows that are not stored yet. Existing
    /// (player, gameweek) rows are left untouched. Returns rows inserted.
    async fn upsert_gameweek_history(&self, records: &[GameweekRecord]) -> Result<u64, StoreError>;
}

const UPSERT_TEAMS: &str = r#"
INSERT INTO teams (
    id, name, short_name, strength, strength_overall_home,
    strength_overall_away, strength_attack_home, strength_attack_away,
    strength_defence_home, strength_defence_away
)
SELECT * FROM UNNEST(
    $1::int4[], $2::text[], $3::text[], $4::int4[], $5::int4[],
    $6::int4[], $7::int4[], $8::int4[], $9::int4[], $10::int4[]
)
ON CONFLICT (id) DO UPDATE SET
    name = EXCLUDED.name,
    short_name = EXCLUDED.short_name,
    strength = EXCLUDED.strength,
    updated_at = CURRENT_TIMESTAMP
"#;

const UPSERT_PLAYERS: &str = r#"
INSERT INTO players (
    id, team_id, first_name, second_name, web_name, element_type,
    now_cost, status, chance_of_playing_next_round,
    chance_of_playing_this_round, news
)
SELECT * FROM UNNEST(
    $1::int4[], $2::int4[], $3::text[], $4::text[], $5::text[], $6::int4[],
    $7::int4[], $8::text[], $9::int4[], $10::int4[], $11::text[]
)
ON CONFLICT (id) DO UPDATE SET
    team_id = EXCLUDED.team_id,
    now_cost = EXCLUDED.now_cost,
    status = EXCLUDED.status,
    news = EXCLUDED.news,
    updated_at = CURRENT_TIMESTAMP
"#;

const INSERT_GAMEWEEK_HISTORY: &str = r#"
INSERT INTO gameweek_history (
    player_id, gameweek, opponent_team, total_points, was_home,
    minutes, goals_scored, assists, clean_sheets, goals_conceded,
    own_goals, penalties_saved, penalties_missed, yellow_cards,
    red_cards, saves, bonus, bps, influence, creativity, threat,
    ict_index, value, transfers_balance, selected, transfers_in,
    transfers_out, expected_goals, expected_assists,
    expected_goal_involvements, expected_goals_conceded
)
SELECT * FROM UNNEST(
    $1::int4[], $2::int4[], $3::int4[], $4::int4[], $5::bool[],
    $6::int4[], $7::int4[], $8::int4[], $9::int4[], $10::int4[],
    $11::int4[], $12::int4[], $13::int4[], $14::int4[],
    $15::int4[], $16::int4[], $17::int4[], $18::int4[], $19::float8[], $20::float8[], $21::float8[],
    $22::float8[], $23::int4[], $24::int4[], $25::int4[], $26::int4[],
    $27::int4[], $28::float8[], $29::float8[],
    $30::float8[], $31::float8[]
)
ON CONFLICT (player_id, gameweek) DO NOTHING
"#;

/// Pooled PostgreSQL connection.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool, retrying with exponential backoff.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = config
            .connect_options()
            .map_err(|e| StoreError::Config(format!("{:#}", e)))?;
        let max_attempts = config.connect_retries.max(1);
        let mut attempt = 0;

        loop {
            match PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await
            {
                Ok(pool) => {
                    info!(db = %config.describe(), "Connected to PostgreSQL");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(StoreError::Connect {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!(attempt, error = %e, "Database connection attempt failed, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
            }
        }
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn disconnect(self) {
        self.pool.close().await;
        info!("Disconnected from PostgreSQL");
    }
}

impl StatStore for Database {
    async fn upsert_teams(&self, teams: &[Team]) -> Result<u64, StoreError> {
        if teams.is_empty() {
            return Ok(0);
        }
        let teams = collapse_by_id(teams, |t| t.id, |kept, later| {
            kept.name = later.name.clone();
            kept.short_name = later.short_name.clone();
            kept.strength = later.strength;
        });
        let cols = TeamColumns::from_rows(&teams);

        let result = sqlx::query(UPSERT_TEAMS)
            .bind(&cols.id)
            .bind(&cols.name)
            .bind(&cols.short_name)
            .bind(&cols.strength)
            .bind(&cols.strength_overall_home)
            .bind(&cols.strength_overall_away)
            .bind(&cols.strength_attack_home)
            .bind(&cols.strength_attack_away)
            .bind(&cols.strength_defence_home)
            .bind(&cols.strength_defence_away)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Upsert {
                table: "teams",
                source,
            })?;

        info!(count = teams.len(), "Upserted teams");
        Ok(result.rows_affected())
    }

    async fn upsert_players(&self, players: &[Player]) -> Result<u64, StoreError> {
        if players.is_empty() {
            return Ok(0);
        }
        let players = collapse_by_id(players, |p| p.id, |kept, later| {
            kept.team = later.team;
            kept.now_cost = later.now_cost;
            kept.status = later.status.clone();
            kept.news = later.news.clone();
        });
        let cols = PlayerColumns::from_rows(&players);

        let result = sqlx::query(UPSERT_PLAYERS)
            .bind(&cols.id)
            .bind(&cols.team_id)
            .bind(&cols.first_name)
            .bind(&cols.second_name)
            .bind(&cols.web_name)
            .bind(&cols.element_type)
            .bind(&cols.now_cost)
            .bind(&cols.status)
            .bind(&cols.chance_of_playing_next_round)
            .bind(&cols.chance_of_playing_this_round)
            .bind(&cols.news)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Upsert {
                table: "players",
                source,
            })?;

        info!(count = players.len(), "Upserted players");
        Ok(result.rows_affected())
    }

    async fn upsert_gameweek_history(&self, records: &[GameweekRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let cols = HistoryColumns::from_rows(records);

        let result = sqlx::query(INSERT_GAMEWEEK_HISTORY)
            .bind(&cols.player_id)
            .bind(&cols.gameweek)
            .bind(&cols.opponent_team)
            .bind(&cols.total_points)
            .bind(&cols.was_home)
            .bind(&cols.minutes)
            .bind(&cols.goals_scored)
            .bind(&cols.assists)
            .bind(&cols.clean_sheets)
            .bind(&cols.goals_conceded)
            .bind(&cols.own_goals)
            .bind(&cols.penalties_saved)
            .bind(&cols.penalties_missed)
            .bind(&cols.yellow_cards)
            .bind(&cols.red_cards)
            .bind(&cols.saves)
            .bind(&cols.bonus)
            .bind(&cols.bps)
            .bind(&cols.influence)
            .bind(&cols.creativity)
            .bind(&cols.threat)
            .bind(&cols.ict_index)
            .bind(&cols.value)
            .bind(&cols.transfers_balance)
            .bind(&cols.selected)
            .bind(&cols.transfers_in)
            .bind(&cols.transfers_out)
            .bind(&cols.expected_goals)
            .bind(&cols.expected_assists)
            .bind(&cols.expected_goal_involvements)
            .bind(&cols.expected_goals_conceded)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Upsert {
                table: "gameweek_history",
                source,
            })?;

        debug!(
            submitted = records.len(),
            inserted = result.rows_affected(),
            "Inserted gameweek history"
        );
        Ok(result.rows_affected())
    }
}

/// Delay after the given failed attempt: 2s, 4s, 8s and so on, capped at a
/// minute.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(60))
}

/// `ON CONFLICT DO UPDATE` refuses to touch the same row twice in one
/// statement, so repeated ids are folded into one row first. The row keeps
/// its first occurrence's insert-only columns, and `refresh` copies over the
/// columns the conflict clause updates, so the result is what one upsert per
/// row would leave behind.
fn collapse_by_id<T, I, R>(rows: &[T], id: I, refresh: R) -> Vec<T>
where
    T: Clone,
    I: Fn(&T) -> i32,
    R: Fn(&mut T, &T),
{
    let mut slot: HashMap<i32, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match slot.get(&id(row)).copied() {
            Some(i) => refresh(&mut out[i], row),
            None => {
                slot.insert(id(row), out.len());
                out.push(row.clone());
            }
        }
    }
    out
}

#[derive(Debug, Default)]
struct TeamColumns {
    id: Vec<i32>,
    name: Vec<String>,
    short_name: Vec<String>,
    strength: Vec<i32>,
    strength_overall_home: Vec<i32>,
    strength_overall_away: Vec<i32>,
    strength_attack_home: Vec<i32>,
    strength_attack_away: Vec<i32>,
    strength_defence_home: Vec<i32>,
    strength_defence_away: Vec<i32>,
}

impl TeamColumns {
    fn from_rows(teams: &[Team]) -> Self {
        let mut cols = Self::default();
        for t in teams {
            cols.id.push(t.id);
            cols.name.push(t.name.clone());
            cols.short_name.push(t.short_name.clone());
            cols.strength.push(t.strength);
            cols.strength_overall_home.push(t.strength_overall_home);
            cols.strength_overall_away.push(t.strength_overall_away);
            cols.strength_attack_home.push(t.strength_attack_home);
            cols.strength_attack_away.push(t.strength_attack_away);
            cols.strength_defence_home.push(t.strength_defence_home);
            cols.strength_defence_away.push(t.strength_defence_away);
        }
        cols
    }
}

#[derive(Debug, Default)]
struct PlayerColumns {
    id: Vec<i32>,
    team_id: Vec<i32>,
    first_name: Vec<String>,
    second_name: Vec<String>,
    web_name: Vec<String>,
    element_type: Vec<i32>,
    now_cost: Vec<i32>,
    status: Vec<String>,
    chance_of_playing_next_round: Vec<Option<i32>>,
    chance_of_playing_this_round: Vec<Option<i32>>,
    news: Vec<String>,
}

impl PlayerColumns {
    fn from_rows(players: &[Player]) -> Self {
        let mut cols = Self::default();
        for p in players {
            cols.id.push(p.id);
            cols.team_id.push(p.team);
            cols.first_name.push(p.first_name.clone());
            cols.second_name.push(p.second_name.clone());
            cols.web_name.push(p.web_name.clone());
            cols.element_type.push(p.element_type);
            cols.now_cost.push(p.now_cost);
            cols.status.push(p.status.clone());
            cols.chance_of_playing_next_round.push(p.chance_of_playing_next_round);
            cols.chance_of_playing_this_round.push(p.chance_of_playing_this_round);
            cols.news.push(p.news.clone());
        }
        cols
    }
}

#[derive(Debug, Default)]
struct HistoryColumns {
    player_id: Vec<i32>,
    gameweek: Vec<i32>,
    opponent_team: Vec<i32>,
    total_points: Vec<i32>,
    was_home: Vec<bool>,
    minutes: Vec<i32>,
    goals_scored: Vec<i32>,
    assists: Vec<i32>,
    clean_sheets: Vec<i32>,
    goals_conceded: Vec<i32>,
    own_goals: Vec<i32>,
    penalties_saved: Vec<i32>,
    penalties_missed: Vec<i32>,
    yellow_cards: Vec<i32>,
    red_cards: Vec<i32>,
    saves: Vec<i32>,
    bonus: Vec<i32>,
    bps: Vec<i32>,
    influence: Vec<f64>,
    creativity: Vec<f64>,
    threat: Vec<f64>,
    ict_index: Vec<f64>,
    value: Vec<i32>,
    transfers_balance: Vec<i32>,
    selected: Vec<i32>,
    transfers_in: Vec<i32>,
    transfers_out: Vec<i32>,
    expected_goals: Vec<f64>,
    expected_assists: Vec<f64>,
    expected_goal_involvements: Vec<f64>,
    expected_goals_conceded: Vec<f64>,
}

impl HistoryColumns {
    fn from_rows(records: &[GameweekRecord]) -> Self {
        let mut cols = Self::default();
        for h in records {
            cols.player_id.push(h.element);
            cols.gameweek.push(h.round);
            cols.opponent_team.push(h.opponent_team);
            cols.total_points.push(h.total_points);
            cols.was_home.push(h.was_home);
            cols.minutes.push(h.minutes);
            cols.goals_scored.push(h.goals_scored);
            cols.assists.push(h.assists);
            cols.clean_sheets.push(h.clean_sheets);
            cols.goals_conceded.push(h.goals_conceded);
            cols.own_goals.push(h.own_goals);
            cols.penalties_saved.push(h.penalties_saved);
            cols.penalties_missed.push(h.penalties_missed);
            cols.yellow_cards.push(h.yellow_cards);
            cols.red_cards.push(h.red_cards);
            cols.saves.push(h.saves);
            cols.bonus.push(h.bonus);
            cols.bps.push(h.bps);
            cols.influence.push(h.influence);
            cols.creativity.push(h.creativity);
            cols.threat.push(h.threat);
            cols.ict_index.push(h.ict_index);
            cols.value.push(h.value);
            cols.transfers_balance.push(h.transfers_balance);
            cols.selected.push(h.selected);
            cols.transfers_in.push(h.transfers_in);
            cols.transfers_out.push(h.transfers_out);
            cols.expected_goals.push(h.expected_goals);
            cols.expected_assists.push(h.expected_assists);
            cols.expected_goal_involvements.push(h.expected_goal_involvements);
            cols.expected_goals_conceded.push(h.expected_goals_conceded);
        }
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{history_json, player_json, team_json};

    fn team(id: i32, name: &str) -> Team {
        serde_json::from_value(team_json(id, name)).unwrap()
    }

    #[test]
    fn repeated_ids_fold_into_first_occurrence() {
        let mut renamed = team(1, "Arsenal FC");
        renamed.strength = 5;
        renamed.strength_attack_home = 1;
        let teams = vec![team(1, "Arsenal"), team(2, "Villa"), renamed];

        let kept = collapse_by_id(&teams, |t| t.id, |kept, later| {
            kept.name = later.name.clone();
            kept.strength = later.strength;
        });

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, 1);
        assert_eq!(kept[0].name, "Arsenal FC");
        assert_eq!(kept[0].strength, 5);
        assert_eq!(kept[0].strength_attack_home, 1080);
        assert_eq!(kept[1].id, 2);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(8));
        assert_eq!(backoff(6), Duration::from_secs(60));
        assert_eq!(backoff(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn team_columns_line_up() {
        let teams = vec![team(1, "Arsenal"), team(2, "Villa")];
        let cols = TeamColumns::from_rows(&teams);

        assert_eq!(cols.id, vec![1, 2]);
        assert_eq!(cols.name, vec!["Arsenal", "Villa"]);
        assert_eq!(cols.short_name, vec!["ARS", "VIL"]);
        assert_eq!(cols.strength_defence_away, vec![1210, 1210]);
    }

    #[test]
    fn player_columns_keep_nulls() {
        let players: Vec<Player> = vec![
            serde_json::from_value(player_json(1, 1)).unwrap(),
            serde_json::from_value(player_json(2, 4)).unwrap(),
        ];
        let cols = PlayerColumns::from_rows(&players);

        assert_eq!(cols.team_id, vec![1, 4]);
        assert_eq!(cols.chance_of_playing_next_round, vec![None, None]);
        assert_eq!(cols.chance_of_playing_this_round, vec![Some(75), Some(75)]);
    }

    #[test]
    fn history_columns_carry_coerced_floats() {
        let records: Vec<GameweekRecord> = vec![
            serde_json::from_value(history_json(1, 1)).unwrap(),
            serde_json::from_value(history_json(1, 2)).unwrap(),
        ];
        let cols = HistoryColumns::from_rows(&records);

        assert_eq!(cols.player_id, vec![1, 1]);
        assert_eq!(cols.gameweek, vec![1, 2]);
        assert_eq!(cols.influence, vec![4.5, 4.5]);
        assert_eq!(cols.expected_goal_involvements, vec![0.52, 0.52]);
        assert_eq!(cols.was_home, vec![true, true]);
    }
}
