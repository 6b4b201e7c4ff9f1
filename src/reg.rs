#[allow(unused_imports)]
use core::arch::asm;

/// Write CR3 register. Also invalidates TLB.
pub unsafe fn write_cr3(_value: u64) {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("mov cr3, {}", in(reg) _value, options(nostack, preserves_flags));
        }
    }
}

/// Read CR3 register.
pub unsafe fn read_cr3() -> u64 {
    let mut _value = 0u64;

    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("mov {}, cr3", out(reg) _value, options(nostack, preserves_flags));
        }
    }

    _value
}

/// Read CR0 register.
pub unsafe fn read_cr0() -> u64 {
    let mut _value = 0u64;

    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("mov {}, cr0", out(reg) _value, options(nostack, preserves_flags));
        }
    }

    _value
}

/// Write CR0 register.
pub unsafe fn write_cr0(_value: u64) {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("mov cr0, {}", in(reg) _value, options(nostack, preserves_flags));
        }
    }
}

/// Read CR4 register.
pub unsafe fn read_cr4() -> u64 {
    let mut _value = 0u64;

    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("mov {}, cr4", out(reg) _value, options(nostack, preserves_flags));
        }
    }

    _value
}

/// Write CR4 register.
pub unsafe fn write_cr4(_value: u64) {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("mov cr4, {}", in(reg) _value, options(nostack, preserves_flags));
        }
    }
}

/// Invalidate the TLB by reloading the CR3 register.
pub unsafe fn flush_tlb() {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            write_cr3(read_cr3());
        }
    }
}

pub unsafe fn write_msr(msr: u32, value: u64) {
    let _low = value as u32;
    let _high = (value >> 32) as u32;
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!(
                "wrmsr",
                in("ecx") msr,
                in("eax") _low, in("edx") _high,
                options(nostack, preserves_flags),
            );
        }
    }
}

pub unsafe fn read_msr(msr: u32) -> u64 {
    let (mut _high, mut _low): (u32, u32) = (0, 0);
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!(
                "rdmsr",
                in("ecx") msr,
                out("eax") _low, out("edx") _high,
                options(nomem, nostack, preserves_flags),
            );
        }
    }
    ((_high as u64) << 32) | (_low as u64)
}

/// Read RFLAGS.
pub unsafe fn read_rflags() -> u64 {
    let mut _value = 0u64;

    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("pushfq", "pop {}", out(reg) _value, options(preserves_flags));
        }
    }

    _value
}

/// Disable maskable interrupts.
pub unsafe fn cli() {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("cli", options(nostack, preserves_flags));
        }
    }
}

/// Enable maskable interrupts.
pub unsafe fn sti() {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("sti", options(nostack, preserves_flags));
        }
    }
}

/// Write back and invalidate the caches.
pub unsafe fn wbinvd() {
    #[cfg(not(feature = "no-reg-rw"))]
    {
        unsafe {
            asm!("wbinvd", options(nostack, preserves_flags));
        }
    }
}
