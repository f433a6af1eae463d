//! Admin command surface. Commands arrive as space-delimited strings over
//! the admin opcodes and are parsed into an explicit enum before the
//! session executes them; responses are pipe-delimited records.

use photon::ClientId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// `list-players` — one record per connected player.
    ListPlayers,
    /// `status` — one record summarizing the session.
    Status,
    /// `kick <client_id>` — drop a player.
    Kick(ClientId),
    /// `close-lobby` — end the session for everyone.
    CloseLobby,
    Unknown(String),
}

impl AdminCommand {
    pub fn parse(input: &str) -> AdminCommand {
        let mut parts = input.split_whitespace();

        match parts.next() {
            Some("list-players") => AdminCommand::ListPlayers,
            Some("status") => AdminCommand::Status,
            Some("kick") => match parts.next().and_then(|arg| arg.parse::<ClientId>().ok()) {
                Some(client_id) => AdminCommand::Kick(client_id),
                None => AdminCommand::Unknown(input.trim().to_string()),
            },
            Some("close-lobby") => AdminCommand::CloseLobby,
            _ => AdminCommand::Unknown(input.trim().to_string()),
        }
    }
}

/// Joins field values into one `|`-delimited record.
pub fn record(fields: &[String]) -> String {
    fields.join("|")
}

/// Joins records into a response body, one record per line.
pub fn body(records: &[String]) -> String {
    records.join("\n")
}
