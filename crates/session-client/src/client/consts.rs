pub const API_BASE_URL_VAR: &str = "INTERVIEW_API_BASE_URL";
pub const API_TOKEN_VAR: &str = "INTERVIEW_API_TOKEN";

pub const BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub const INTERVIEWS_PATH: &str = "interviews";
