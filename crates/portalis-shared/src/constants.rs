/// Application name
pub const APP_NAME: &str = "portalis";

/// JID server part for one-to-one chats
pub const USER_SERVER: &str = "s.whatsapp.net";

/// JID server part for group chats
pub const GROUP_SERVER: &str = "g.us";

/// Default interval between save loop ticks in seconds
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 30;

/// Default directory for snapshot files
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default snapshot file names, relative to the data directory
pub const USERS_FILE: &str = "users.snap";
pub const PORTALS_FILE: &str = "portals.snap";
pub const PUPPETS_FILE: &str = "puppets.snap";
pub const MESSAGES_FILE: &str = "messages.snap";

/// Default plain-text sync token file name
pub const NEXT_BATCH_FILE: &str = "next_batch";
