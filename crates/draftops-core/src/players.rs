// Player data loading.
//
// Reads a player CSV with `player_id,name,position[,team]` columns. The
// records seed the initial available pool and the resolver cache.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::draft::pick::{position_from_espn_id, Position};

/// One draftable player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub team: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerDataError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Raw CSV row. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct RawPlayerRow {
    #[serde(alias = "id", alias = "espn_id")]
    player_id: String,
    #[serde(alias = "full_name", alias = "player_name")]
    name: String,
    #[serde(alias = "pos")]
    position: String,
    #[serde(default, alias = "nfl_team")]
    team: Option<String>,
}

/// Position codes may be text ("QB", "D/ST") or ESPN numeric position ids.
fn parse_position(raw: &str) -> Option<Position> {
    match raw.trim().parse::<u16>() {
        Ok(id) => Some(position_from_espn_id(id)),
        Err(_) => Position::from_str_pos(raw),
    }
}

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerRecord>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayerRow>() {
        match result {
            Ok(raw) => {
                let player_id = raw.player_id.trim().to_string();
                if player_id.is_empty() {
                    warn!("skipping player '{}': empty player_id", raw.name.trim());
                    continue;
                }
                let position = match parse_position(&raw.position) {
                    Some(pos) => pos,
                    None => {
                        warn!(
                            "player {} has unknown position '{}', using BENCH",
                            player_id, raw.position
                        );
                        Position::Bench
                    }
                };
                players.push(PlayerRecord {
                    player_id,
                    name: raw.name.trim().to_string(),
                    position,
                    team: raw
                        .team
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty()),
                });
            }
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
            }
        }
    }
    Ok(players)
}

/// Load player records from a CSV file.
pub fn load_players(path: &Path) -> Result<Vec<PlayerRecord>, PlayerDataError> {
    let file = std::fs::File::open(path).map_err(|e| PlayerDataError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_players_from_reader(file).map_err(|e| PlayerDataError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_basic_rows() {
        let csv = "player_id,name,position,team\n\
                   3918298,Josh Allen,QB,BUF\n\
                   4362238,Chris Olave,WR,NO\n";
        let players = load_players_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].player_id, "3918298");
        assert_eq!(players[0].position, Position::Quarterback);
        assert_eq!(players[1].team.as_deref(), Some("NO"));
    }

    #[test]
    fn accepts_column_aliases_and_extra_columns() {
        let csv = "id,full_name,pos,adp\n-16001,Bills D/ST,D/ST,120.5\n";
        let players = load_players_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].position, Position::Defense);
        assert!(players[0].team.is_none());
    }

    #[test]
    fn numeric_espn_position_ids() {
        let csv = "player_id,name,position\n3918298,Josh Allen,1\n15683,Justin Tucker,5\n-16023,49ers D/ST,16\n";
        let players = load_players_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(players[0].position, Position::Quarterback);
        assert_eq!(players[1].position, Position::Kicker);
        assert_eq!(players[2].position, Position::Defense);
    }

    #[test]
    fn unknown_position_becomes_bench() {
        let csv = "player_id,name,position\n99,Mystery Man,LS\n";
        let players = load_players_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(players[0].position, Position::Bench);
    }

    #[test]
    fn skips_rows_without_id_or_required_columns() {
        let csv = "player_id,name,position\n,No Id,RB\n4429795,Good Row,RB\n";
        let players = load_players_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].player_id, "4429795");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_players(Path::new("/nonexistent/players.csv")).unwrap_err();
        assert!(matches!(err, PlayerDataError::Io { .. }));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join("draftops_players_test.csv");
        std::fs::write(&path, "player_id,name,position\n1,A,TE\n2,B,K\n").unwrap();
        let players = load_players(&path).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[1].position, Position::Kicker);
        let _ = std::fs::remove_file(&path);
    }
}
