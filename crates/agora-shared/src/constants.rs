/// Application name
pub const APP_NAME: &str = "Agora";

/// Address stored on the registry row that represents this instance
pub const LOCAL_SERVER_ADDRESS: &str = "local";

/// Number of feed items per page
pub const PAGE_SIZE: usize = 10;

/// Per-peer outbound request timeout in seconds
pub const PEER_TIMEOUT_SECS: u64 = 5;

/// Maximum accepted size of a peer response body (4 MiB)
pub const MAX_PEER_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Header carrying the authenticated viewer's local username, set by the
/// fronting auth proxy
pub const VIEWER_HEADER: &str = "x-agora-user";

/// Longest accepted username
pub const MAX_USERNAME_LEN: usize = 150;
