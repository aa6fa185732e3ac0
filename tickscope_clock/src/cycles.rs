/// Reads the hardware monotonic cycle counter.
///
/// Non-decreasing within a process run and cheap enough to call on every
/// region entry and exit. The unit is hardware "cycles"; only the
/// calibration accessors can relate it to wall time.
#[inline(always)]
pub fn read_cycles() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC is a side-effect-free instruction on x86_64.
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(target_arch = "aarch64")]
    {
        let counter: u64;
        // SAFETY: Reading the virtual counter register is side-effect-free.
        unsafe {
            core::arch::asm!("mrs {}, cntvct_el0", out(reg) counter);
        }
        counter
    }

    #[cfg(target_arch = "riscv64")]
    {
        let counter: u64;
        // SAFETY: Reading the cycle counter register is a side-effect-free CPU instruction.
        unsafe {
            core::arch::asm!("rdcycle {}", out(reg) counter);
        }
        counter
    }

    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "riscv64"
    )))]
    {
        // No user-space counter on this platform. Count nanoseconds from the
        // first read so the value stays monotonic, unlike an epoch-based read.
        use std::sync::OnceLock;
        use std::time::Instant;
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}
