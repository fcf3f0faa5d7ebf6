use uuid::Uuid;

/// Generate a random request token.
///
/// The lock never calls this itself; it is a convenience for callers that
/// have no natural per-request identifier.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}
