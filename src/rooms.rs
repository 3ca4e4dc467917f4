//! Custom lobbies and the public-room directory.
//!
//! Rooms live outside matches: a host configures settings, a guest joins,
//! both ready up, and start-game hands the pair to the match coordinator.
//! Public rooms are advertised on the lobby stream through a coalescing
//! broadcaster: mutations set a pending flag, a throttled writer turns the
//! flag into at most one `room_list` per window (and at least one after
//! every dirty window).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::UserIdentity;
use crate::config::types::{DistributionMode, GameSettings, PerDifficulty};
use crate::error::{DomainRejection, Result};
use crate::game::coordinator::MatchCoordinator;
use crate::game::state::MatchType;
use crate::problems::select::{weighted_counts, ProblemSelector};
use crate::ws::frames::{ChatMessage, ServerFrame};
use crate::ws::transport::PlayerTransport;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Client-configurable match rules for a custom room. Every field is
/// range-validated on set; violations are client errors.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoomSettings {
    pub problem_count: u32,
    pub starting_hp: u32,
    pub base_hp_deduction: u32,
    pub hp_multipliers: PerDifficulty<f64>,
    pub problem_probabilities: PerDifficulty<f64>,
    pub distribution_mode: DistributionMode,
    pub fixed_distribution: PerDifficulty<u32>,
    pub starting_skill_points: u32,
    pub starting_mana_points: u32,
    pub mana_recharge: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        let game = GameSettings::default();
        Self {
            problem_count: game.problem_count,
            starting_hp: game.starting_hp,
            base_hp_deduction: game.base_hp_deduction,
            hp_multipliers: game.hp_multipliers,
            problem_probabilities: game.problem_weights,
            distribution_mode: DistributionMode::Auto,
            fixed_distribution: game.fixed_distribution,
            starting_skill_points: game.starting_skill_points,
            starting_mana_points: game.starting_mana_points,
            mana_recharge: game.mana_recharge,
        }
    }
}

impl RoomSettings {
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| -> Result<()> {
            Err(DomainRejection::InvalidSettings(message).into())
        };
        if !(1..=10).contains(&self.problem_count) {
            return fail(format!("problem count must be 1-10, got {}", self.problem_count));
        }
        if !(1..=1000).contains(&self.starting_hp) {
            return fail(format!("starting HP must be 1-1000, got {}", self.starting_hp));
        }
        if !(1..=100).contains(&self.base_hp_deduction) {
            return fail(format!(
                "base HP deduction must be 1-100, got {}",
                self.base_hp_deduction
            ));
        }
        for difficulty in crate::config::types::Difficulty::ALL {
            let multiplier = self.hp_multipliers.get(difficulty);
            if !(0.1..=10.0).contains(&multiplier) {
                return fail(format!(
                    "{difficulty} HP multiplier must be 0.1-10.0, got {multiplier}"
                ));
            }
            let probability = self.problem_probabilities.get(difficulty);
            if !(0.0..=3.0).contains(&probability) {
                return fail(format!(
                    "{difficulty} probability must be 0.0-3.0, got {probability}"
                ));
            }
        }
        if !(0..=1000).contains(&self.starting_skill_points) {
            return fail(format!(
                "starting SP must be 0-1000, got {}",
                self.starting_skill_points
            ));
        }
        if !(0..=1000).contains(&self.starting_mana_points) {
            return fail(format!(
                "starting MP must be 0-1000, got {}",
                self.starting_mana_points
            ));
        }
        if !(0..=500).contains(&self.mana_recharge) {
            return fail(format!("mana recharge must be 0-500, got {}", self.mana_recharge));
        }
        Ok(())
    }

    /// Merge onto the server's base rules; timeout and cooldown are not
    /// room-configurable.
    pub fn to_game_settings(&self, base: &GameSettings) -> GameSettings {
        GameSettings {
            starting_hp: self.starting_hp,
            base_hp_deduction: self.base_hp_deduction,
            hp_multipliers: self.hp_multipliers,
            starting_skill_points: self.starting_skill_points,
            starting_mana_points: self.starting_mana_points,
            mana_recharge: self.mana_recharge,
            match_timeout_secs: base.match_timeout_secs,
            submission_cooldown_secs: base.submission_cooldown_secs,
            problem_count: self.problem_count,
            problem_weights: self.problem_probabilities,
            distribution_mode: self.distribution_mode,
            fixed_distribution: self.fixed_distribution,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomStatus {
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "IN_GAME")]
    InGame,
}

struct Room {
    code: String,
    host: UserIdentity,
    guest: Option<UserIdentity>,
    host_ready: bool,
    guest_ready: bool,
    is_public: bool,
    status: RoomStatus,
    settings: RoomSettings,
    game_id: Option<String>,
    host_transport: Option<PlayerTransport>,
    guest_transport: Option<PlayerTransport>,
}

impl Room {
    fn member_role(&self, user_id: i64) -> Option<Role> {
        if self.host.id == user_id {
            Some(Role::Host)
        } else if self.guest.as_ref().is_some_and(|g| g.id == user_id) {
            Some(Role::Guest)
        } else {
            None
        }
    }

    fn view(&self) -> RoomView {
        RoomView {
            room_code: self.code.clone(),
            host: self.host.username.clone(),
            guest: self.guest.as_ref().map(|g| g.username.clone()),
            host_ready: self.host_ready,
            guest_ready: self.guest_ready,
            is_public: self.is_public,
            status: self.status,
            settings: self.settings.clone(),
            game_id: self.game_id.clone(),
        }
    }

    fn broadcast(&mut self, frame: ServerFrame) {
        for transport in [&mut self.host_transport, &mut self.guest_transport] {
            if let Some(t) = transport {
                if !t.send(frame.clone()) {
                    *transport = None;
                }
            }
        }
    }

    fn broadcast_state(&mut self) {
        let frame = ServerFrame::RoomState(self.view());
        self.broadcast(frame);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Host,
    Guest,
}

/// Room snapshot for members and the REST surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomView {
    pub room_code: String,
    pub host: String,
    pub guest: Option<String>,
    pub host_ready: bool,
    pub guest_ready: bool,
    pub is_public: bool,
    pub status: RoomStatus,
    pub settings: RoomSettings,
    pub game_id: Option<String>,
}

/// Directory line for one public room.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoomSummary {
    pub room_code: String,
    pub host: String,
    pub player_count: u32,
    pub problem_count: u32,
}

/// Lobby-directory fan-out with a pending flag for coalescing.
#[derive(Default)]
pub struct RoomDirectory {
    listeners: DashMap<u64, PlayerTransport>,
    pending: AtomicBool,
}

impl RoomDirectory {
    pub fn subscribe(&self, transport: PlayerTransport) -> u64 {
        let id = transport.id();
        self.listeners.insert(id, transport);
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.listeners.remove(&id);
    }

    pub fn mark_dirty(&self) {
        self.pending.store(true, Ordering::Release);
    }

    fn take_dirty(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    fn fan_out(&self, rooms: Vec<RoomSummary>) {
        let frame = ServerFrame::RoomList { rooms };
        self.listeners
            .retain(|_, transport| transport.send(frame.clone()));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

pub struct RoomService {
    rooms: DashMap<String, Room>,
    member_index: DashMap<i64, String>,
    directory: Arc<RoomDirectory>,
    coordinator: Arc<MatchCoordinator>,
    selector: Arc<ProblemSelector>,
    base_game: GameSettings,
    code_length: usize,
}

impl RoomService {
    pub fn new(
        coordinator: Arc<MatchCoordinator>,
        selector: Arc<ProblemSelector>,
        base_game: GameSettings,
        code_length: usize,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            member_index: DashMap::new(),
            directory: Arc::new(RoomDirectory::default()),
            coordinator,
            selector,
            base_game,
            code_length,
        }
    }

    pub fn directory(&self) -> Arc<RoomDirectory> {
        self.directory.clone()
    }

    /// Throttled directory writer. One broadcast per throttle window at
    /// most; the pending flag guarantees one after the window when
    /// anything changed.
    pub fn spawn_directory_broadcaster(service: Arc<RoomService>, throttle: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(throttle.max(Duration::from_millis(100)));
            loop {
                ticker.tick().await;
                if service.directory.take_dirty() {
                    service.directory.fan_out(service.public_rooms());
                }
            }
        });
    }

    pub fn public_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .filter(|room| room.is_public && room.status == RoomStatus::Waiting)
            .map(|room| RoomSummary {
                room_code: room.code.clone(),
                host: room.host.username.clone(),
                player_count: 1 + room.guest.is_some() as u32,
                problem_count: room.settings.problem_count,
            })
            .collect();
        rooms.sort_by(|a, b| a.room_code.cmp(&b.room_code));
        rooms
    }

    /// Send the current directory to one freshly subscribed listener.
    pub fn send_directory_snapshot(&self, transport: &PlayerTransport) {
        transport.send(ServerFrame::RoomList {
            rooms: self.public_rooms(),
        });
    }

    pub fn create_room(
        &self,
        host: UserIdentity,
        is_public: bool,
        settings: RoomSettings,
    ) -> Result<String> {
        settings.validate()?;
        if self.member_index.contains_key(&host.id) {
            return Err(DomainRejection::AlreadyInRoom.into());
        }
        if self.coordinator.lookup(host.id).is_some() {
            return Err(DomainRejection::AlreadyInGame.into());
        }

        let code = self.unique_code();
        let room = Room {
            code: code.clone(),
            host: host.clone(),
            guest: None,
            host_ready: false,
            guest_ready: false,
            is_public,
            status: RoomStatus::Waiting,
            settings,
            game_id: None,
            host_transport: None,
            guest_transport: None,
        };
        self.rooms.insert(code.clone(), room);
        self.member_index.insert(host.id, code.clone());
        self.directory.mark_dirty();
        log::info!("room {code} created by {}", host.username);
        Ok(code)
    }

    /// Reject on collision and re-draw until the code is free.
    fn unique_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..self.code_length)
                .map(|_| {
                    let i = rng.gen_range(0..ROOM_CODE_ALPHABET.len());
                    ROOM_CODE_ALPHABET[i] as char
                })
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn view(&self, code: &str) -> Result<RoomView> {
        self.rooms
            .get(code)
            .map(|room| room.view())
            .ok_or_else(|| DomainRejection::RoomNotFound.into())
    }

    /// Join or re-attach a member stream. New users take the guest seat;
    /// existing members supersede their previous transport.
    pub fn attach(
        &self,
        code: &str,
        identity: &UserIdentity,
        transport: PlayerTransport,
    ) -> Result<RoomView> {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return Err(DomainRejection::RoomNotFound.into());
        };

        match room.member_role(identity.id) {
            Some(Role::Host) => {
                if let Some(previous) = room.host_transport.take() {
                    previous.close(
                        crate::error::close_code::CONFLICT,
                        "Reconnected from another session",
                    );
                }
                room.host_transport = Some(transport);
            }
            Some(Role::Guest) => {
                if let Some(previous) = room.guest_transport.take() {
                    previous.close(
                        crate::error::close_code::CONFLICT,
                        "Reconnected from another session",
                    );
                }
                room.guest_transport = Some(transport);
            }
            None => {
                if self.member_index.contains_key(&identity.id) {
                    return Err(DomainRejection::AlreadyInRoom.into());
                }
                if room.guest.is_some() {
                    return Err(DomainRejection::RoomFull.into());
                }
                if room.status == RoomStatus::InGame {
                    return Err(DomainRejection::GameInProgress.into());
                }
                room.guest = Some(identity.clone());
                room.guest_ready = false;
                room.guest_transport = Some(transport);
                self.member_index.insert(identity.id, code.to_string());
            }
        }

        room.broadcast_state();
        let view = room.view();
        drop(room);
        self.directory.mark_dirty();
        Ok(view)
    }

    /// Leave semantics: a departing host promotes the guest (or destroys
    /// an empty room); a departing guest keeps the host.
    pub fn leave(&self, code: &str, user_id: i64) {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return;
        };
        match room.member_role(user_id) {
            Some(Role::Host) => {
                self.member_index.remove(&user_id);
                if let Some(guest) = room.guest.take() {
                    room.host = guest;
                    room.host_ready = false;
                    room.guest_ready = false;
                    room.host_transport = room.guest_transport.take();
                    room.broadcast_state();
                    drop(room);
                } else {
                    let code = room.code.clone();
                    drop(room);
                    self.rooms.remove(&code);
                    log::info!("room {code} destroyed");
                }
            }
            Some(Role::Guest) => {
                self.member_index.remove(&user_id);
                room.guest = None;
                room.guest_ready = false;
                room.guest_transport = None;
                room.broadcast_state();
                drop(room);
            }
            None => return,
        }
        self.directory.mark_dirty();
    }

    pub fn toggle_ready(&self, code: &str, user_id: i64) -> Result<()> {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return Err(DomainRejection::RoomNotFound.into());
        };
        match room.member_role(user_id) {
            Some(Role::Host) => room.host_ready = !room.host_ready,
            Some(Role::Guest) => room.guest_ready = !room.guest_ready,
            None => return Err(DomainRejection::PlayerNotFound.into()),
        }
        room.broadcast_state();
        Ok(())
    }

    pub fn chat(&self, code: &str, user_id: i64, message: String) {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return;
        };
        let Some(role) = room.member_role(user_id) else {
            return;
        };
        let sender = match role {
            Role::Host => room.host.username.clone(),
            Role::Guest => room
                .guest
                .as_ref()
                .map(|g| g.username.clone())
                .unwrap_or_default(),
        };
        room.broadcast(ServerFrame::Chat(ChatMessage {
            sender,
            message,
            timestamp: Utc::now().timestamp_millis(),
        }));
    }

    /// Host-only settings update; not while a game is running.
    pub fn update_settings(
        &self,
        code: &str,
        user_id: i64,
        settings: RoomSettings,
    ) -> Result<RoomView> {
        settings.validate()?;
        let Some(mut room) = self.rooms.get_mut(code) else {
            return Err(DomainRejection::RoomNotFound.into());
        };
        if room.member_role(user_id) != Some(Role::Host) {
            return Err(DomainRejection::HostOnly.into());
        }
        if room.status == RoomStatus::InGame {
            return Err(DomainRejection::GameInProgress.into());
        }
        room.settings = settings.clone();
        room.broadcast(ServerFrame::SettingsUpdated(settings));
        room.broadcast_state();
        let view = room.view();
        drop(room);
        self.directory.mark_dirty();
        Ok(view)
    }

    /// Start the match: host-only, room full, both ready.
    pub async fn start_game(&self, code: &str, user_id: i64) -> Result<String> {
        // Admission checks and the IN_GAME flip happen under the room
        // entry; the async problem draw happens after.
        let (host, guest, settings) = {
            let Some(mut room) = self.rooms.get_mut(code) else {
                return Err(DomainRejection::RoomNotFound.into());
            };
            if room.member_role(user_id) != Some(Role::Host) {
                return Err(DomainRejection::GuestCannotStart.into());
            }
            if room.status == RoomStatus::InGame {
                return Err(DomainRejection::GameInProgress.into());
            }
            let Some(guest) = room.guest.clone() else {
                return Err(DomainRejection::NotEnoughPlayers.into());
            };
            if !(room.host_ready && room.guest_ready) {
                return Err(DomainRejection::NotAllReady.into());
            }
            room.status = RoomStatus::InGame;
            (room.host.clone(), guest, room.settings.clone())
        };

        let result = self.launch_match(&host, &guest, &settings).await;
        let Some(mut room) = self.rooms.get_mut(code) else {
            return result;
        };
        match &result {
            Ok(game_id) => {
                room.game_id = Some(game_id.clone());
                room.broadcast(ServerFrame::GameStarted {
                    game_id: game_id.clone(),
                });
            }
            Err(_) => {
                // Roll back so the room stays usable.
                room.status = RoomStatus::Waiting;
            }
        }
        drop(room);
        self.directory.mark_dirty();
        result
    }

    async fn launch_match(
        &self,
        host: &UserIdentity,
        guest: &UserIdentity,
        settings: &RoomSettings,
    ) -> Result<String> {
        let distribution = match settings.distribution_mode {
            DistributionMode::Fixed => settings.fixed_distribution,
            DistributionMode::Auto => {
                let mut rng = rand::thread_rng();
                weighted_counts(
                    &settings.problem_probabilities,
                    settings.problem_count,
                    &mut rng,
                )
            }
        };
        let problems = self.selector.by_distribution(&distribution, true).await?;
        if problems.is_empty() {
            return Err(crate::error::DuelError::ProblemStore(
                "no problems available for the requested distribution".to_string(),
            ));
        }
        let handle = self.coordinator.create_match(
            host.clone(),
            guest.clone(),
            problems,
            MatchType::Custom,
            settings.to_game_settings(&self.base_game),
        )?;
        Ok(handle.id().to_string())
    }

    pub fn room_of(&self, user_id: i64) -> Option<String> {
        self.member_index.get(&user_id).map(|entry| entry.clone())
    }

    /// Disconnect cleanup. Leaves the room only while the vanished
    /// transport is still the member's current one; a superseded session
    /// must not evict its replacement.
    pub fn handle_disconnect(&self, code: &str, user_id: i64, transport_id: u64) {
        let should_leave = {
            let Some(room) = self.rooms.get(code) else {
                return;
            };
            match room.member_role(user_id) {
                Some(Role::Host) => room
                    .host_transport
                    .as_ref()
                    .map_or(true, |t| t.id() == transport_id),
                Some(Role::Guest) => room
                    .guest_transport
                    .as_ref()
                    .map_or(true, |t| t.id() == transport_id),
                None => false,
            }
        };
        if should_leave {
            self.leave(code, user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_ranges_are_enforced() {
        let mut settings = RoomSettings::default();
        settings.validate().unwrap();

        settings.problem_count = 0;
        assert!(settings.validate().is_err());
        settings.problem_count = 11;
        assert!(settings.validate().is_err());
        settings.problem_count = 10;
        settings.validate().unwrap();

        settings.starting_hp = 1001;
        assert!(settings.validate().is_err());
        settings.starting_hp = 1000;
        settings.validate().unwrap();

        settings.hp_multipliers.hard = 10.5;
        assert!(settings.validate().is_err());
        settings.hp_multipliers.hard = 0.1;
        settings.validate().unwrap();

        settings.problem_probabilities.easy = 3.5;
        assert!(settings.validate().is_err());
        settings.problem_probabilities.easy = 3.0;
        settings.validate().unwrap();

        settings.mana_recharge = 501;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_merge_keeps_server_timing() {
        let mut settings = RoomSettings::default();
        settings.starting_hp = 300;
        settings.mana_recharge = 7;
        let base = GameSettings::default();
        let merged = settings.to_game_settings(&base);
        assert_eq!(merged.starting_hp, 300);
        assert_eq!(merged.mana_recharge, 7);
        assert_eq!(merged.match_timeout_secs, base.match_timeout_secs);
        assert_eq!(merged.submission_cooldown_secs, base.submission_cooldown_secs);
    }
}
