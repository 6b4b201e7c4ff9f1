//! Hardware abstraction seam between the engine and the processor.
//!
//! The engine only ever touches registers through [`HalTrait`], so tests
//! substitute a deterministic register emulation and the algorithms stay
//! identical on hardware and under test.

/// CPUID output registers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuidRegisters {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

pub trait HalTrait {
    /// Save the interrupt state, then disable interrupts.
    fn save_and_disable_interrupts(&mut self) -> bool;

    fn enable_interrupts(&mut self);

    fn disable_interrupts(&mut self);

    fn get_interrupt_state(&mut self) -> bool;

    fn set_interrupt_state(&mut self, interrupt_state: bool) {
        if interrupt_state {
            self.enable_interrupts();
        } else {
            self.disable_interrupts();
        }
    }

    /// Enter no-fill cache mode (CD=1, NW=0) and flush the caches.
    fn disable_cache(&mut self);

    /// Return to normal caching (CD=NW=0).
    fn enable_cache(&mut self);

    fn read_cr4(&mut self) -> u64;

    fn write_cr4(&mut self, value: u64);

    fn flush_tlb(&mut self);

    fn read_msr64(&mut self, msr_index: u32) -> u64;

    fn write_msr64(&mut self, msr_index: u32, value: u64);

    /// Read-modify-write: `msr = (msr & and_data) | or_data`.
    fn msr_and_then_or_64(&mut self, msr_index: u32, and_data: u64, or_data: u64) -> u64 {
        let current = self.read_msr64(msr_index);
        let new = (current & and_data) | or_data;
        self.write_msr64(msr_index, new);
        new
    }

    fn cpuid(&mut self, function: u32) -> CpuidRegisters {
        self.cpuid_ex(function, 0)
    }

    fn cpuid_ex(&mut self, function: u32, sub_function: u32) -> CpuidRegisters;

    /// Variable range registers the platform keeps back for the OS.
    fn reserved_variable_register_count(&self) -> u32;
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        use crate::reg;

        const CR0_CD: u64 = 1 << 30;
        const CR0_NW: u64 = 1 << 29;
        const RFLAGS_IF: u64 = 1 << 9;

        /// HAL backed by the live processor registers.
        pub struct X64Hal {
            reserved_variable_registers: u32,
        }

        impl X64Hal {
            pub fn new(reserved_variable_registers: u32) -> Self {
                Self { reserved_variable_registers }
            }
        }

        impl HalTrait for X64Hal {
            fn save_and_disable_interrupts(&mut self) -> bool {
                let state = self.get_interrupt_state();
                self.disable_interrupts();
                state
            }

            fn enable_interrupts(&mut self) {
                unsafe { reg::sti() };
            }

            fn disable_interrupts(&mut self) {
                unsafe { reg::cli() };
            }

            fn get_interrupt_state(&mut self) -> bool {
                unsafe { reg::read_rflags() & RFLAGS_IF != 0 }
            }

            fn disable_cache(&mut self) {
                unsafe {
                    let cr0 = (reg::read_cr0() | CR0_CD) & !CR0_NW;
                    reg::write_cr0(cr0);
                    reg::wbinvd();
                }
            }

            fn enable_cache(&mut self) {
                unsafe {
                    reg::wbinvd();
                    let cr0 = reg::read_cr0() & !(CR0_CD | CR0_NW);
                    reg::write_cr0(cr0);
                }
            }

            fn read_cr4(&mut self) -> u64 {
                unsafe { reg::read_cr4() }
            }

            fn write_cr4(&mut self, value: u64) {
                unsafe { reg::write_cr4(value) }
            }

            fn flush_tlb(&mut self) {
                unsafe { reg::flush_tlb() }
            }

            fn read_msr64(&mut self, msr_index: u32) -> u64 {
                unsafe { reg::read_msr(msr_index) }
            }

            fn write_msr64(&mut self, msr_index: u32, value: u64) {
                unsafe { reg::write_msr(msr_index, value) }
            }

            fn cpuid_ex(&mut self, function: u32, sub_function: u32) -> CpuidRegisters {
                #[cfg(not(feature = "no-reg-rw"))]
                {
                    let result = unsafe { core::arch::x86_64::__cpuid_count(function, sub_function) };
                    CpuidRegisters { eax: result.eax, ebx: result.ebx, ecx: result.ecx, edx: result.edx }
                }
                #[cfg(feature = "no-reg-rw")]
                {
                    let _ = (function, sub_function);
                    CpuidRegisters::default()
                }
            }

            fn reserved_variable_register_count(&self) -> u32 {
                self.reserved_variable_registers
            }
        }
    }
}
