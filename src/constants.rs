pub mod network {
    pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;
    pub const DEFAULT_HOST: &str = "localhost";
    pub const USER_AGENT: &str = "apilink/0.1";
}

pub mod retry {
    pub const MAX_RETRIES: u32 = 5;
    pub const TIMEOUT_MARKER: &str = "TIMEDOUT";
}

pub mod discovery {
    pub const RECONNECT_DELAY_MS: u64 = 30_000;
    pub const PATHS_ENDPOINT: &str = "_paths";
    pub const STATUS_CHECK_PATH: &str = "_checkAPIkey";
    pub const EXIT_CODE_FAILURE: i32 = 1;
}

pub mod cache {
    pub const DEFAULT_EXPIRE_SECS: u64 = 300;
    pub const CACHEABLE_STATUS_MIN: u16 = 200;
    pub const CACHEABLE_STATUS_MAX: u16 = 400;
}

pub mod headers {
    pub const REQUEST_GUID: &str = "request-guid";
    pub const API_KEY: &str = "api_key";
    pub const ACCEPT: &str = "accept";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const MIME_JSON: &str = "application/json";
}

pub mod token {
    pub const GRANT_TYPE: &str = "client_credential";
    pub const EXPIRY_BUFFER_MS: u64 = 30_000;
}

pub mod env {
    pub const RECONNECT_DELAY_MS: &str = "APILINK_RECONNECT_DELAY_MS";
    pub const CHECK_APIS: &str = "APILINK_CHECK_APIS";
    pub const CACHE_DIR: &str = "APILINK_CACHE_DIR";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}
