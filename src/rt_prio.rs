// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Scheduling for driver threads that serve stream rings.

use crate::config::ThreadPriority;

/// Apply `priority` to the calling thread.
///
/// `ThreadPriority::NORMAL` leaves the thread alone. Anything else requests
/// real-time scheduling; on Linux the value is the SCHED_FIFO priority,
/// clamped to the range the kernel accepts (needs CAP_SYS_NICE). On macOS the
/// thread gets a time-constraint policy for `period_ns`.
///
/// Returns `true` if the thread now runs with the requested policy.
pub fn apply_thread_priority(priority: ThreadPriority, period_ns: u64) -> bool {
    if priority.is_normal() {
        return true;
    }

    #[cfg(target_os = "linux")]
    {
        let _ = period_ns;
        set_fifo_linux(priority.0)
    }
    #[cfg(target_os = "macos")]
    {
        let _ = priority;
        set_time_constraint_macos(period_ns, period_ns / 2, period_ns)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = period_ns;
        false
    }
}

/// Nominal period in nanoseconds for `frames_per_buffer` frames at `sample_rate`.
pub fn audio_period_ns(sample_rate: u32, frames_per_buffer: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames_per_buffer as u64) * 1_000_000_000 / (sample_rate as u64)
}

#[cfg(target_os = "linux")]
fn set_fifo_linux(requested: i32) -> bool {
    let (lo, hi) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    if lo < 0 || hi < lo {
        return false;
    }
    let param = libc::sched_param { sched_priority: requested.clamp(lo, hi) };
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    ret == 0
}

#[cfg(target_os = "macos")]
fn set_time_constraint_macos(period_ns: u64, computation_ns: u64, constraint_ns: u64) -> bool {
    #[repr(C)]
    struct MachTimebaseInfo {
        numer: u32,
        denom: u32,
    }

    extern "C" {
        fn mach_timebase_info(info: *mut MachTimebaseInfo) -> i32;
        fn pthread_mach_thread_np(thread: libc::pthread_t) -> u32;
        fn thread_policy_set(thread: u32, flavor: u32, policy_info: *const u32, count: u32) -> i32;
    }

    const THREAD_TIME_CONSTRAINT_POLICY: u32 = 2;
    const THREAD_TIME_CONSTRAINT_POLICY_COUNT: u32 = 4;

    #[repr(C)]
    struct ThreadTimeConstraintPolicy {
        period: u32,
        computation: u32,
        constraint: u32,
        preemptible: i32,
    }

    let mut tb = MachTimebaseInfo { numer: 0, denom: 0 };
    unsafe {
        mach_timebase_info(&mut tb);
    }
    if tb.numer == 0 || tb.denom == 0 || period_ns == 0 {
        return false;
    }

    let to_abs = |ns: u64| -> u32 { ((ns * tb.denom as u64) / tb.numer as u64) as u32 };

    let policy = ThreadTimeConstraintPolicy {
        period: to_abs(period_ns),
        computation: to_abs(computation_ns),
        constraint: to_abs(constraint_ns),
        preemptible: 1,
    };

    let kr = unsafe {
        let mach_thread = pthread_mach_thread_np(libc::pthread_self());
        thread_policy_set(
            mach_thread,
            THREAD_TIME_CONSTRAINT_POLICY,
            &policy as *const _ as *const u32,
            THREAD_TIME_CONSTRAINT_POLICY_COUNT,
        )
    };
    kr == 0
}
