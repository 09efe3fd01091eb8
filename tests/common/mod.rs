#![allow(dead_code)]

use fpl_ingestion::config::ApiConfig;
use fpl_ingestion::models::{GameweekRecord, Player, Team};
use fpl_ingestion::{FplClient, StatStore, StoreError};
use serde_json::{json, Value};
use std::sync::Mutex;
use wiremock::MockServer;

pub fn team_json(id: i32, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "short_name": name.chars().take(3).collect::<String>().to_uppercase(),
        "strength": 3,
        "strength_overall_home": 1100,
        "strength_overall_away": 1150,
        "strength_attack_home": 1080,
        "strength_attack_away": 1120,
        "strength_defence_home": 1200,
        "strength_defence_away": 1210
    })
}

pub fn player_json(id: i32, team: i32) -> Value {
    json!({
        "id": id,
        "team": team,
        "first_name": "First",
        "second_name": format!("Player{}", id),
        "web_name": format!("P{}", id),
        "element_type": 2,
        "now_cost": 45,
        "status": "a",
        "chance_of_playing_next_round": 100,
        "chance_of_playing_this_round": null,
        "news": ""
    })
}

pub fn history_json(element: i32, round: i32) -> Value {
    json!({
        "element": element,
        "fixture": 1,
        "opponent_team": 2,
        "total_points": 2,
        "was_home": false,
        "round": round,
        "minutes": 90,
        "goals_scored": 0,
        "assists": 0,
        "clean_sheets": 0,
        "goals_conceded": 2,
        "own_goals": 0,
        "penalties_saved": 0,
        "penalties_missed": 0,
        "yellow_cards": 1,
        "red_cards": 0,
        "saves": 0,
        "bonus": 0,
        "bps": 11,
        "influence": "4.5",
        "creativity": "0.0",
        "threat": "2.0",
        "ict_index": "0.7",
        "value": 45,
        "transfers_balance": 0,
        "selected": 1000,
        "transfers_in": 0,
        "transfers_out": 0,
        "expected_goals": "0.00",
        "expected_assists": "0.01",
        "expected_goal_involvements": "0.01",
        "expected_goals_conceded": "1.45"
    })
}

pub fn bootstrap_json(teams: &[(i32, &str)], players: &[(i32, i32)]) -> Value {
    json!({
        "events": [],
        "teams": teams.iter().map(|&(id, name)| team_json(id, name)).collect::<Vec<_>>(),
        "elements": players.iter().map(|&(id, team)| player_json(id, team)).collect::<Vec<_>>(),
    })
}

pub fn summary_json(element: i32, rounds: &[i32]) -> Value {
    json!({
        "fixtures": [],
        "history": rounds.iter().map(|&r| history_json(element, r)).collect::<Vec<_>>(),
        "history_past": []
    })
}

pub fn client_for(server: &MockServer, max_concurrency: usize) -> FplClient {
    FplClient::new(&ApiConfig {
        base_url: format!("{}/api", server.uri()),
        max_concurrency,
        request_timeout: None,
    })
    .unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Teams(Vec<i32>),
    Players(Vec<i32>),
    History(Vec<(i32, i32)>),
}

/// Store double that records what it was asked to write.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<Call>>,
    fail_history: bool,
}

impl RecordingStore {
    pub fn failing_history() -> Self {
        Self {
            fail_history: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl StatStore for RecordingStore {
    async fn upsert_teams(&self, teams: &[Team]) -> Result<u64, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Teams(teams.iter().map(|t| t.id).collect()));
        Ok(teams.len() as u64)
    }

    async fn upsert_players(&self, players: &[Player]) -> Result<u64, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Players(players.iter().map(|p| p.id).collect()));
        Ok(players.len() as u64)
    }

    async fn upsert_gameweek_history(&self, records: &[GameweekRecord]) -> Result<u64, StoreError> {
        if self.fail_history {
            return Err(StoreError::Upsert {
                table: "gameweek_history",
                source: sqlx::Error::PoolClosed,
            });
        }
        self.calls.lock().unwrap().push(Call::History(
            records.iter().map(|r| (r.element, r.round)).collect(),
        ));
        Ok(records.len() as u64)
    }
}
