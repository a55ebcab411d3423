//! Configuration types for a room session

use serde::{Deserialize, Serialize};

/// Main configuration for a [`RoomSession`](crate::RoomSession)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to join
    pub room_id: String,

    /// Local participant ID (auto-generated if None)
    pub user_id: Option<String>,

    /// Display name announced to the room
    pub display_name: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Request a microphone track on join (default: true)
    pub audio: bool,

    /// Request a camera track on join (default: true)
    pub video: bool,

    /// Maximum remote peers in the mesh (default: 10)
    pub max_peers: u32,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8088/signaling".to_string(),
            room_id: String::new(),
            user_id: None,
            display_name: "anonymous".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            audio: true,
            video: true,
            max_peers: 10,
        }
    }
}

impl SessionConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a valid WebSocket URL
    /// - `room_id` is empty
    /// - `stun_servers` is empty
    /// - `max_peers` is not in range 1-32
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room_id.is_empty() {
            return Err(Error::InvalidConfig("room_id must not be empty".to_string()));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.max_peers == 0 || self.max_peers > 32 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-32, got {}",
                self.max_peers
            )));
        }

        Ok(())
    }

    /// Build a configuration from `CLASSMESH_*` environment variables.
    ///
    /// Unset variables keep their defaults. Used by the probe binary;
    /// library callers normally construct the struct directly.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `CLASSMESH_SIGNALING_URL` | `signaling_url` |
    /// | `CLASSMESH_ROOM` | `room_id` |
    /// | `CLASSMESH_USER_ID` | `user_id` |
    /// | `CLASSMESH_DISPLAY_NAME` | `display_name` |
    /// | `CLASSMESH_STUN` | `stun_servers` (comma-separated) |
    /// | `CLASSMESH_TURN_URL` / `_USERNAME` / `_CREDENTIAL` | one TURN entry |
    /// | `CLASSMESH_AUDIO` / `CLASSMESH_VIDEO` | `audio` / `video` (`true`/`false`) |
    /// | `CLASSMESH_MAX_PEERS` | `max_peers` |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CLASSMESH_SIGNALING_URL") {
            config.signaling_url = url;
        }
        if let Ok(room) = std::env::var("CLASSMESH_ROOM") {
            config.room_id = room;
        }
        if let Ok(id) = std::env::var("CLASSMESH_USER_ID") {
            config.user_id = Some(id);
        }
        if let Ok(name) = std::env::var("CLASSMESH_DISPLAY_NAME") {
            config.display_name = name;
        }
        if let Ok(stun) = std::env::var("CLASSMESH_STUN") {
            config.stun_servers = stun
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(turn_url) = std::env::var("CLASSMESH_TURN_URL") {
            config.turn_servers.push(TurnServerConfig {
                url: turn_url,
                username: std::env::var("CLASSMESH_TURN_USERNAME").unwrap_or_default(),
                credential: std::env::var("CLASSMESH_TURN_CREDENTIAL").unwrap_or_default(),
            });
        }
        if let Ok(audio) = std::env::var("CLASSMESH_AUDIO") {
            config.audio = audio != "false" && audio != "0";
        }
        if let Ok(video) = std::env::var("CLASSMESH_VIDEO") {
            config.video = video != "false" && video != "0";
        }
        if let Ok(max) = std::env::var("CLASSMESH_MAX_PEERS") {
            if let Ok(max) = max.parse() {
                config.max_peers = max;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SessionConfig {
        SessionConfig {
            room_id: "lecture-42".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_room_id_fails() {
        let config = SessionConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_stun_servers_fails() {
        let mut config = valid_config();
        config.stun_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_signaling_url_fails() {
        let mut config = valid_config();
        config.signaling_url = "http://localhost:8088".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_max_peers_fails() {
        let mut config = valid_config();
        config.max_peers = 0;
        assert!(config.validate().is_err());

        config.max_peers = 33;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = valid_config();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.room_id, deserialized.room_id);
        assert_eq!(config.stun_servers, deserialized.stun_servers);
    }
}
