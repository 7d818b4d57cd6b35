//! Protocol constants

/// Default HTTP/WebSocket port
pub const DEFAULT_PORT: u16 = 3000;

/// Default path of the WebSocket endpoint
pub const DEFAULT_SOCKET_PATH: &str = "/socket";

/// Polling endpoint for the active-user count
pub const ACTIVE_USERS_PATH: &str = "/api/active-users";

/// Server and registry counters
pub const STATS_PATH: &str = "/api/stats";

/// Liveness probe
pub const HEALTH_PATH: &str = "/health";

/// Largest inbound WebSocket message accepted (bytes)
///
/// Clients only ever send a login frame carrying an id.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024;

/// Client event claiming a user for the connection
pub const EVENT_USER_LOGIN: &str = "userLogin";

/// Server event carrying the active-user count
pub const EVENT_ACTIVE_USERS_COUNT: &str = "activeUsersCount";
