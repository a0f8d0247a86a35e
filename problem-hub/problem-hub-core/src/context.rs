/// Identity of the caller of an operation, established at login and passed
/// explicitly to every handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub is_admin: bool,
}

impl RequestContext {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}
