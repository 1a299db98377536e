/// Session key prefix
const SESSION_PREFIX: &str = "mp:session:";

/// Pending sign-in prefix
const PENDING_PREFIX: &str = "mp:pending:";

const RATE_LIMIT_PREFIX: &str = "mp:rate_limit:";

pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

pub fn pending_sign_in_key(flow_id: &str) -> String {
    format!("{}{}", PENDING_PREFIX, flow_id)
}

pub fn rate_limit_key(client: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, client)
}
