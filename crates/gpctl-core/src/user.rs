//! Identity of the operating-system user running a service.

/// Operating-system user name of this process.
///
/// Taken from `USER`, then `LOGNAME`; the numeric effective uid when neither
/// is set.
pub fn current_user() -> String {
    user_name(
        std::env::var("USER").ok(),
        std::env::var("LOGNAME").ok(),
        effective_uid(),
    )
}

fn user_name(user: Option<String>, logname: Option<String>, uid: u32) -> String {
    user.or(logname)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| uid.to_string())
}

#[cfg(unix)]
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
pub fn effective_uid() -> u32 {
    u32::MAX
}
