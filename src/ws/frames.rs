use serde::{Deserialize, Serialize};

use crate::game::state::{GameView, MatchResult};
use crate::pipeline::SubmissionResult;
use crate::problems::PublicView;
use crate::rooms::{RoomSettings, RoomSummary, RoomView};

/// Inbound frame (client -> server). One schema across streams; each
/// session loop rejects the types its stream does not recognize.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Chat { message: String },
    Submit { code: String, language: String },
    Ability { action: AbilityAction, ability_id: String },
    Forfeit,
    Query,
    ToggleReady,
    StartGame,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbilityAction {
    Buy,
    Use,
}

/// `submission_result` payload: judging output plus the engine's damage
/// and progress verdict for this submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmissionReport {
    pub problem_index: usize,
    pub deducted_hp: u32,
    pub problem_solved: bool,
    #[serde(flatten)]
    pub result: SubmissionResult,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub message: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Outbound frame (server -> client).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    MatchFound { match_id: String },
    GameState(GameView),
    Problem { problem_index: usize, problem: PublicView },
    GameStart { match_id: String },
    SubmissionResult(SubmissionReport),
    Chat(ChatMessage),
    AbilityBought { username: String, ability_id: String },
    AbilityUsed { username: String, ability_id: String },
    Error { message: String },
    MatchEnd(MatchResult),
    RoomState(RoomView),
    SettingsUpdated(RoomSettings),
    GameStarted { game_id: String },
    RoomList { rooms: Vec<RoomSummary> },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_parse_wire_shape() {
        let submit: ClientFrame = serde_json::from_str(
            r#"{"type":"submit","data":{"code":"print(1)","language":"python"}}"#,
        )
        .unwrap();
        assert_eq!(
            submit,
            ClientFrame::Submit {
                code: "print(1)".to_string(),
                language: "python".to_string()
            }
        );

        let forfeit: ClientFrame = serde_json::from_str(r#"{"type":"forfeit"}"#).unwrap();
        assert_eq!(forfeit, ClientFrame::Forfeit);

        let ability: ClientFrame = serde_json::from_str(
            r#"{"type":"ability","data":{"action":"buy","ability_id":"healio"}}"#,
        )
        .unwrap();
        assert_eq!(
            ability,
            ClientFrame::Ability {
                action: AbilityAction::Buy,
                ability_id: "healio".to_string()
            }
        );
    }

    #[test]
    fn server_frames_tag_as_snake_case() {
        let frame = ServerFrame::error("nope");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "nope");

        let frame = ServerFrame::GameStarted {
            game_id: "m1".to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "game_started");
    }

    #[test]
    fn submission_report_flattens_result() {
        let report = SubmissionReport {
            problem_index: 0,
            deducted_hp: 15,
            problem_solved: true,
            result: SubmissionResult {
                success: true,
                message: None,
                test_results: None,
                sample_results: None,
                summary: crate::sandbox::SuiteSummary {
                    total_tests: 10,
                    passed_tests: 10,
                },
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["deducted_hp"], 15);
        assert_eq!(json["success"], true);
        assert_eq!(json["summary"]["passed_tests"], 10);
    }
}
