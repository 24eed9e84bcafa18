//! # Errno Translation
//!
//! Replies carry error codes in the foreign (Darwin) errno space. On a Linux
//! host the two spaces agree for the classic Unix codes (1..=34, except
//! `EAGAIN`) and diverge above that, so every code the host can hand us is
//! translated through this table before it reaches a reply.
//!
//! Index zero maps to zero.

/// Translate a host errno into the foreign errno space.
#[cfg(target_os = "linux")]
#[must_use]
pub fn to_foreign(native: i32) -> i32
{
    match native {
        0 => 0,
        libc::EAGAIN => 35,
        1..=34 => native,
        libc::EDEADLK => 11,
        libc::ENAMETOOLONG => 63,
        libc::ENOLCK => 77,
        libc::ENOSYS => 78,
        libc::ENOTEMPTY => 66,
        libc::ELOOP => 62,
        libc::ENOMSG => 91,
        libc::EIDRM => 90,
        libc::ENODATA => 96,
        libc::ETIME => 101,
        libc::EPROTO => 100,
        libc::EBADMSG => 94,
        libc::EOVERFLOW => 84,
        libc::EILSEQ => 92,
        libc::EUSERS => 68,
        libc::ENOTSOCK => 38,
        libc::EDESTADDRREQ => 39,
        libc::EMSGSIZE => 40,
        libc::EPROTOTYPE => 41,
        libc::ENOPROTOOPT => 42,
        libc::EPROTONOSUPPORT => 43,
        libc::ESOCKTNOSUPPORT => 44,
        libc::ENOTSUP => 45,
        libc::EPFNOSUPPORT => 46,
        libc::EAFNOSUPPORT => 47,
        libc::EADDRINUSE => 48,
        libc::EADDRNOTAVAIL => 49,
        libc::ENETDOWN => 50,
        libc::ENETUNREACH => 51,
        libc::ENETRESET => 52,
        libc::ECONNABORTED => 53,
        libc::ECONNRESET => 54,
        libc::ENOBUFS => 55,
        libc::EISCONN => 56,
        libc::ENOTCONN => 57,
        libc::ESHUTDOWN => 58,
        libc::ETOOMANYREFS => 59,
        libc::ETIMEDOUT => 60,
        libc::ECONNREFUSED => 61,
        libc::EHOSTDOWN => 64,
        libc::EHOSTUNREACH => 65,
        libc::EALREADY => 37,
        libc::EINPROGRESS => 36,
        libc::ESTALE => 70,
        libc::EDQUOT => 69,
        libc::ECANCELED => 89,
        libc::EOWNERDEAD => 105,
        libc::ENOTRECOVERABLE => 104,
        other => {
            tracing::debug!(errno = other, "no foreign errno for host code, reporting EINVAL");
            libc::EINVAL
        }
    }
}

/// Translate a host errno into the foreign errno space.
///
/// BSD-derived hosts already share the Darwin numbering.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn to_foreign(native: i32) -> i32
{
    native
}
