use nix::unistd::{Group, User};

/// `verifyCredentials` from the original daemon: a caller is authorized iff
/// no group is configured, or the caller's uid resolves to a username that
/// is a member of the configured group. Resolution failures fail closed.
pub fn is_authorized(configured_group: &str, uid: u32) -> bool {
    if configured_group.is_empty() {
        return true;
    }
    let Ok(Some(group)) = Group::from_name(configured_group) else {
        return false;
    };
    let Ok(Some(user)) = User::from_uid(uid.into()) else {
        return false;
    };
    group.mem.iter().any(|member| member == &user.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_allows_everyone() {
        assert!(is_authorized("", 0));
    }

    #[test]
    fn unknown_group_fails_closed() {
        assert!(!is_authorized("definitely-not-a-real-group-xyz", 0));
    }
}
