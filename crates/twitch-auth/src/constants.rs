//! Twitch OAuth constants

/// Token endpoint for the refresh-token grant
pub const TOKEN_ENDPOINT: &str = "https://id.twitch.tv/oauth2/token";

/// Header carrying the application's client id on every Twitch call
pub const CLIENT_ID_HEADER: &str = "Client-Id";
