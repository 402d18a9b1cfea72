pub const AGENT_NAME: &str = env!("CARGO_PKG_NAME");
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const USER_AGENT_VALUE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const GZIP_ENCODING: &str = "gzip";
pub const CONNECTION_KEEP_ALIVE: &str = "keep-alive";
pub const KEEP_ALIVE_HEADER: &str = "keep-alive";
pub const KEEP_ALIVE_VALUE: &str = "60000";

pub const BASIC_AUTH_USER: &str = "x";
