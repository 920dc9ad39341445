/// The `(user_id, org_id)` identity attached to every authenticated request,
/// per the external-interfaces principal model. `User` (the API-key table)
/// has no `org_id` column of its own — authentication/session management is
/// an external collaborator this crate does not own, so `org_id` is sourced
/// from the caller's `X-Org-Id` header rather than a stored column.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub org_id: String,
    pub is_admin: bool,
}
