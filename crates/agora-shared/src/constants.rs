/// Protocol version advertised by `/info`.
pub const PROTOCOL_VERSION: &str = "/agora/1.0.0";

/// Application name
pub const APP_NAME: &str = "Agora";

/// Minimum number of participants in any conversation.
pub const MIN_PARTICIPANTS: usize = 2;

/// Maximum number of participants in any conversation.
pub const MAX_PARTICIPANTS: usize = 10;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound a client may request for a single page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
