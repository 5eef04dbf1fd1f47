//! Per-runtime syscall tables
//!
//! `ALLOW` is the base allowlist, `ERRNO` is answered with `EPERM` instead of
//! killing the process, and `NETWORK` is appended only when the caller asks
//! for network access.

#[cfg(not(feature = "nodejs"))]
pub use python3::*;

#[cfg(feature = "nodejs")]
pub use nodejs::*;

/// Name of the runtime the library was built for
#[cfg(not(feature = "nodejs"))]
pub const FEATURE: &str = "python3";
#[cfg(feature = "nodejs")]
pub const FEATURE: &str = "nodejs";

#[allow(dead_code)]
mod python3 {
    pub static ALLOW: &[i64] = &[
        // file io
        libc::SYS_read,
        libc::SYS_write,
        libc::SYS_openat,
        libc::SYS_close,
        libc::SYS_newfstatat,
        libc::SYS_ioctl,
        libc::SYS_lseek,
        libc::SYS_getdents64,
        // threads
        libc::SYS_futex,
        // memory
        libc::SYS_mmap,
        libc::SYS_brk,
        libc::SYS_mprotect,
        libc::SYS_munmap,
        libc::SYS_rt_sigreturn,
        libc::SYS_mremap,
        // identity
        libc::SYS_setuid,
        libc::SYS_setgid,
        libc::SYS_getuid,
        // process
        libc::SYS_getpid,
        libc::SYS_getppid,
        libc::SYS_gettid,
        libc::SYS_exit,
        libc::SYS_exit_group,
        libc::SYS_tgkill,
        libc::SYS_rt_sigaction,
        libc::SYS_sched_yield,
        libc::SYS_set_robust_list,
        libc::SYS_get_robust_list,
        libc::SYS_rseq,
        // time and polling
        libc::SYS_clock_gettime,
        libc::SYS_gettimeofday,
        libc::SYS_nanosleep,
        libc::SYS_epoll_create1,
        libc::SYS_epoll_ctl,
        libc::SYS_clock_nanosleep,
        libc::SYS_pselect6,
        libc::SYS_rt_sigprocmask,
        libc::SYS_sigaltstack,
        libc::SYS_getrandom,
    ];

    pub static ERRNO: &[i64] = &[
        libc::SYS_clone,
        libc::SYS_mkdirat,
        #[cfg(target_arch = "x86_64")]
        libc::SYS_mkdir,
    ];

    pub static NETWORK: &[i64] = &[
        libc::SYS_socket,
        libc::SYS_connect,
        libc::SYS_bind,
        libc::SYS_listen,
        libc::SYS_accept,
        libc::SYS_sendto,
        libc::SYS_recvfrom,
        libc::SYS_getsockname,
        libc::SYS_recvmsg,
        libc::SYS_getpeername,
        libc::SYS_setsockopt,
        libc::SYS_ppoll,
        libc::SYS_uname,
        libc::SYS_sendmsg,
        libc::SYS_sendmmsg,
        libc::SYS_getsockopt,
        libc::SYS_fstat,
        libc::SYS_fcntl,
        libc::SYS_fstatfs,
        #[cfg(target_arch = "x86_64")]
        libc::SYS_poll,
        libc::SYS_epoll_pwait,
    ];
}

#[allow(dead_code)]
mod nodejs {
    pub static ALLOW: &[i64] = &[
        // file io
        libc::SYS_read,
        libc::SYS_write,
        libc::SYS_writev,
        libc::SYS_pread64,
        libc::SYS_openat,
        libc::SYS_close,
        libc::SYS_fstat,
        libc::SYS_newfstatat,
        libc::SYS_statx,
        libc::SYS_ioctl,
        libc::SYS_lseek,
        libc::SYS_fcntl,
        libc::SYS_getdents64,
        libc::SYS_readlinkat,
        libc::SYS_getcwd,
        // threads
        libc::SYS_futex,
        // memory
        libc::SYS_mmap,
        libc::SYS_brk,
        libc::SYS_mprotect,
        libc::SYS_munmap,
        libc::SYS_madvise,
        libc::SYS_mremap,
        libc::SYS_rt_sigreturn,
        // identity
        libc::SYS_setuid,
        libc::SYS_setgid,
        libc::SYS_getuid,
        libc::SYS_geteuid,
        libc::SYS_getgid,
        libc::SYS_getegid,
        // process
        libc::SYS_getpid,
        libc::SYS_getppid,
        libc::SYS_gettid,
        libc::SYS_exit,
        libc::SYS_exit_group,
        libc::SYS_tgkill,
        libc::SYS_rt_sigaction,
        libc::SYS_rt_sigprocmask,
        libc::SYS_sigaltstack,
        libc::SYS_sched_yield,
        libc::SYS_set_robust_list,
        libc::SYS_get_robust_list,
        libc::SYS_rseq,
        libc::SYS_prlimit64,
        // event loop
        libc::SYS_epoll_create1,
        libc::SYS_epoll_ctl,
        libc::SYS_epoll_pwait,
        libc::SYS_eventfd2,
        libc::SYS_pipe2,
        // time
        libc::SYS_clock_gettime,
        libc::SYS_clock_getres,
        libc::SYS_gettimeofday,
        libc::SYS_nanosleep,
        libc::SYS_clock_nanosleep,
        libc::SYS_getrandom,
        libc::SYS_uname,
    ];

    pub static ERRNO: &[i64] = &[
        libc::SYS_clone,
        libc::SYS_clone3,
        libc::SYS_mkdirat,
        #[cfg(target_arch = "x86_64")]
        libc::SYS_mkdir,
    ];

    pub static NETWORK: &[i64] = &[
        libc::SYS_socket,
        libc::SYS_connect,
        libc::SYS_bind,
        libc::SYS_listen,
        libc::SYS_accept4,
        libc::SYS_sendto,
        libc::SYS_recvfrom,
        libc::SYS_sendmsg,
        libc::SYS_recvmsg,
        libc::SYS_sendmmsg,
        libc::SYS_getsockname,
        libc::SYS_getpeername,
        libc::SYS_setsockopt,
        libc::SYS_getsockopt,
        libc::SYS_shutdown,
        libc::SYS_ppoll,
        libc::SYS_fstatfs,
    ];
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    fn assert_unique(name: &str, table: &[i64]) {
        let mut seen = HashSet::new();
        for nr in table {
            assert!(seen.insert(nr), "{name} lists syscall {nr} twice");
        }
    }

    fn assert_disjoint(allow: &[i64], network: &[i64], errno: &[i64]) {
        for nr in allow.iter().chain(network) {
            assert!(!errno.contains(nr), "syscall {nr} is both allowed and denied");
        }
    }

    #[test]
    fn python3_tables_have_unique_entries() {
        use super::python3::*;
        assert_unique("python3 ALLOW", ALLOW);
        assert_unique("python3 NETWORK", NETWORK);
        assert_unique("python3 ERRNO", ERRNO);
        assert_disjoint(ALLOW, NETWORK, ERRNO);
    }

    #[test]
    fn nodejs_tables_have_unique_entries() {
        use super::nodejs::*;
        assert_unique("nodejs ALLOW", ALLOW);
        assert_unique("nodejs NETWORK", NETWORK);
        assert_unique("nodejs ERRNO", ERRNO);
        assert_disjoint(ALLOW, NETWORK, ERRNO);
    }
}
