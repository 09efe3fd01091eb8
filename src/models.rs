//! Upstream payload types for the FPL API.
//!
//! Field names follow the API's JSON. A handful of history metrics arrive as
//! decimal strings and are coerced to `f64` while decoding.

use serde::{de, Deserialize, Deserializer};

/// `GET /bootstrap-static/`: every current team and player in one payload.
#[derive(Debug, Deserialize, Clone)]
pub struct Bootstrap {
    pub teams: Vec<Team>,
    pub elements: Vec<Player>,
}

impl Bootstrap {
    /// True when the payload carries nothing worth ingesting.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.elements.is_empty()
    }

    pub fn player_ids(&self) -> Vec<i32> {
        self.elements.iter().map(|p| p.id).collect()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Team {
    pub id: i32,
    pub name: String,
    pub short_name: String,
    pub strength: i32,
    pub strength_overall_home: i32,
    pub strength_overall_away: i32,
    pub strength_attack_home: i32,
    pub strength_attack_away: i32,
    pub strength_defence_home: i32,
    pub strength_defence_away: i32,
}

/// A player, called an "element" by the API.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: i32,
    /// Team id.
    pub team: i32,
    pub first_name: String,
    pub second_name: String,
    pub web_name: String,
    /// Position code (1 = GK, 2 = DEF, 3 = MID, 4 = FWD).
    pub element_type: i32,
    /// Price in tenths of a million.
    pub now_cost: i32,
    pub status: String,
    pub chance_of_playing_next_round: Option<i32>,
    pub chance_of_playing_this_round: Option<i32>,
    #[serde(default)]
    pub news: String,
}

/// `GET /element-summary/{id}/`. Only the past-gameweek history is kept.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ElementSummary {
    #[serde(default)]
    pub history: Option<Vec<GameweekRecord>>,
}

/// One player's performance in one gameweek.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GameweekRecord {
    /// Player id.
    pub element: i32,
    /// Gameweek number.
    pub round: i32,
    pub opponent_team: i32,
    pub total_points: i32,
    pub was_home: bool,
    pub minutes: i32,
    pub goals_scored: i32,
    pub assists: i32,
    pub clean_sheets: i32,
    pub goals_conceded: i32,
    pub own_goals: i32,
    pub penalties_saved: i32,
    pub penalties_missed: i32,
    pub yellow_cards: i32,
    pub red_cards: i32,
    pub saves: i32,
    pub bonus: i32,
    pub bps: i32,
    #[serde(deserialize_with = "decimal")]
    pub influence: f64,
    #[serde(deserialize_with = "decimal")]
    pub creativity: f64,
    #[serde(deserialize_with = "decimal")]
    pub threat: f64,
    #[serde(deserialize_with = "decimal")]
    pub ict_index: f64,
    pub value: i32,
    pub transfers_balance: i32,
    pub selected: i32,
    pub transfers_in: i32,
    pub transfers_out: i32,
    #[serde(deserialize_with = "decimal")]
    pub expected_goals: f64,
    #[serde(deserialize_with = "decimal")]
    pub expected_assists: f64,
    #[serde(deserialize_with = "decimal")]
    pub expected_goal_involvements: f64,
    #[serde(deserialize_with = "decimal")]
    pub expected_goals_conceded: f64,
}

/// Accepts `"4.5"` as well as `4.5`.
fn decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| de::Error::custom(format!("invalid decimal {:?}: {}", s, e))),
    }
}
