//! Deterministic register-file emulation behind `HalTrait`.

use memattr::engine::MemTypeEngine;
use memattr::hal::{CpuidRegisters, HalTrait};
use memattr::structs::CacheType;
use memattr::structs::CapabilityRegister;
use memattr::structs::DefaultTypeRegister;
use memattr::structs::FeatureFlagsEcx;
use memattr::structs::TmeActivateRegister;
use memattr::structs::VersionInfoEdx;
use memattr::structs::AddressSizeEax;
use memattr::structs::CPUID_EXTENDED_FUNCTION;
use memattr::structs::CPUID_SIGNATURE;
use memattr::structs::CPUID_STRUCTURED_EXTENDED_FEATURE_FLAGS;
use memattr::structs::CPUID_VERSION_INFO;
use memattr::structs::CPUID_VIR_PHY_ADDRESS_SIZE;
use memattr::structs::FIXED_RANGE_COUNT;
use memattr::structs::MAX_VARIABLE_RANGES;
use memattr::structs::MSR_DEF_TYPE;
use memattr::structs::MSR_MTRRCAP;
use memattr::structs::MSR_PHYSBASE0;
use memattr::structs::MSR_TME_ACTIVATE;
use memattr::structs::{
    MSR_FIX16K_80000, MSR_FIX16K_A0000, MSR_FIX4K_C0000, MSR_FIX4K_C8000, MSR_FIX4K_D0000,
    MSR_FIX4K_D8000, MSR_FIX4K_E0000, MSR_FIX4K_E8000, MSR_FIX4K_F0000, MSR_FIX4K_F8000,
    MSR_FIX64K_00000,
};

pub const FIXED_MSR_INDEX: [u32; FIXED_RANGE_COUNT] = [
    MSR_FIX64K_00000,
    MSR_FIX16K_80000,
    MSR_FIX16K_A0000,
    MSR_FIX4K_C0000,
    MSR_FIX4K_C8000,
    MSR_FIX4K_D0000,
    MSR_FIX4K_D8000,
    MSR_FIX4K_E0000,
    MSR_FIX4K_E8000,
    MSR_FIX4K_F0000,
    MSR_FIX4K_F8000,
];

const LANE_SEED: u64 = 0x0101_0101_0101_0101;

/// Capabilities one emulated system advertises.
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    pub physical_address_bits: u8,
    pub mtrr_supported: bool,
    pub fixed_supported: bool,
    pub default_type: CacheType,
    pub variable_register_count: u32,
    pub tme_keyid_bits: u8,
}

pub const DEFAULT_SYSTEM_CONFIG: SystemConfig = SystemConfig {
    physical_address_bits: 42,
    mtrr_supported: true,
    fixed_supported: true,
    default_type: CacheType::Uncacheable,
    variable_register_count: 12,
    tme_keyid_bits: 0,
};

impl SystemConfig {
    /// Address bits the engine should end up computing with.
    pub fn effective_address_bits(&self) -> u32 {
        (self.physical_address_bits - self.tme_keyid_bits) as u32
    }
}

pub struct MockHal {
    fixed_values: [u64; FIXED_RANGE_COUNT],
    variable_base: [u64; MAX_VARIABLE_RANGES],
    variable_mask: [u64; MAX_VARIABLE_RANGES],
    def_type: DefaultTypeRegister,
    capability: CapabilityRegister,
    tme_activate: TmeActivateRegister,
    version_edx: VersionInfoEdx,
    feature_ecx: FeatureFlagsEcx,
    address_size_eax: AddressSizeEax,
    interrupt_state: bool,
    cr4: u64,
    reserved_variable_registers: u32,
}

impl MockHal {
    pub fn new(config: &SystemConfig) -> Self {
        let mut hal = Self {
            fixed_values: [0; FIXED_RANGE_COUNT],
            variable_base: [0; MAX_VARIABLE_RANGES],
            variable_mask: [0; MAX_VARIABLE_RANGES],
            def_type: DefaultTypeRegister::new(),
            capability: CapabilityRegister::new(),
            tme_activate: TmeActivateRegister::new(),
            version_edx: VersionInfoEdx::new(),
            feature_ecx: FeatureFlagsEcx::new(),
            address_size_eax: AddressSizeEax::new(),
            interrupt_state: true,
            cr4: 0,
            reserved_variable_registers: 0,
        };
        hal.initialize_registers(config);
        hal
    }

    pub fn initialize_registers(&mut self, config: &SystemConfig) {
        // Fixed registers power up holding the default type in every lane.
        for value in &mut self.fixed_values {
            *value = LANE_SEED * config.default_type as u64;
        }
        self.variable_base = [0; MAX_VARIABLE_RANGES];
        self.variable_mask = [0; MAX_VARIABLE_RANGES];

        self.def_type = DefaultTypeRegister::new()
            .with_e(true)
            .with_mem_type(config.default_type as u8);
        self.capability = CapabilityRegister::new()
            .with_vcnt(config.variable_register_count as u8)
            .with_fix(config.fixed_supported);
        self.version_edx = VersionInfoEdx::new().with_mtrr(config.mtrr_supported);
        self.address_size_eax =
            AddressSizeEax::new().with_physical_address_bits(config.physical_address_bits);

        if config.tme_keyid_bits != 0 {
            self.feature_ecx = FeatureFlagsEcx::new().with_tme_en(true);
            self.tme_activate = TmeActivateRegister::new()
                .with_tme_enable(true)
                .with_mk_tme_keyid_bits(config.tme_keyid_bits);
        } else {
            self.feature_ecx = FeatureFlagsEcx::new();
            self.tme_activate = TmeActivateRegister::new();
        }
    }

    pub fn set_reserved_variable_registers(&mut self, count: u32) {
        self.reserved_variable_registers = count;
    }
}

impl HalTrait for MockHal {
    fn save_and_disable_interrupts(&mut self) -> bool {
        let state = self.interrupt_state;
        self.interrupt_state = false;
        state
    }

    fn enable_interrupts(&mut self) {
        self.interrupt_state = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupt_state = false;
    }

    fn get_interrupt_state(&mut self) -> bool {
        self.interrupt_state
    }

    fn disable_cache(&mut self) {}

    fn enable_cache(&mut self) {}

    fn read_cr4(&mut self) -> u64 {
        self.cr4
    }

    fn write_cr4(&mut self, value: u64) {
        self.cr4 = value;
    }

    fn flush_tlb(&mut self) {}

    fn read_msr64(&mut self, msr_index: u32) -> u64 {
        if let Some(position) = FIXED_MSR_INDEX.iter().position(|&msr| msr == msr_index) {
            return self.fixed_values[position];
        }

        if msr_index >= MSR_PHYSBASE0 && msr_index < MSR_PHYSBASE0 + 2 * MAX_VARIABLE_RANGES as u32 {
            let index = ((msr_index - MSR_PHYSBASE0) >> 1) as usize;
            if msr_index % 2 == 0 {
                return self.variable_base[index];
            }
            return self.variable_mask[index];
        }

        match msr_index {
            MSR_DEF_TYPE => self.def_type.into_bits(),
            MSR_MTRRCAP => self.capability.into_bits() as u64,
            MSR_TME_ACTIVATE => self.tme_activate.into_bits(),
            _ => panic!("unemulated MSR read: {:#x}", msr_index),
        }
    }

    fn write_msr64(&mut self, msr_index: u32, value: u64) {
        if let Some(position) = FIXED_MSR_INDEX.iter().position(|&msr| msr == msr_index) {
            self.fixed_values[position] = value;
            return;
        }

        if msr_index >= MSR_PHYSBASE0 && msr_index < MSR_PHYSBASE0 + 2 * MAX_VARIABLE_RANGES as u32 {
            let index = ((msr_index - MSR_PHYSBASE0) >> 1) as usize;
            if msr_index % 2 == 0 {
                self.variable_base[index] = value;
            } else {
                self.variable_mask[index] = value;
            }
            return;
        }

        match msr_index {
            MSR_DEF_TYPE => {
                let def = DefaultTypeRegister::from_bits(value);
                if def.fe() {
                    assert!(self.capability.fix(), "fixed enable without fixed support");
                }
                self.def_type = def;
            }
            _ => panic!("unemulated MSR write: {:#x}", msr_index),
        }
    }

    fn cpuid_ex(&mut self, function: u32, _sub_function: u32) -> CpuidRegisters {
        let mut result = CpuidRegisters::default();
        match function {
            CPUID_SIGNATURE => {
                result.eax = CPUID_STRUCTURED_EXTENDED_FEATURE_FLAGS;
            }
            CPUID_VERSION_INFO => {
                result.edx = self.version_edx.into_bits();
            }
            CPUID_STRUCTURED_EXTENDED_FEATURE_FLAGS => {
                result.ecx = self.feature_ecx.into_bits();
            }
            CPUID_EXTENDED_FUNCTION => {
                result.eax = CPUID_VIR_PHY_ADDRESS_SIZE;
            }
            CPUID_VIR_PHY_ADDRESS_SIZE => {
                result.eax = self.address_size_eax.into_bits();
            }
            _ => panic!("unemulated CPUID leaf: {:#x}", function),
        }
        result
    }

    fn reserved_variable_register_count(&self) -> u32 {
        self.reserved_variable_registers
    }
}

pub fn engine_for(config: &SystemConfig) -> MemTypeEngine<MockHal> {
    MemTypeEngine::new(MockHal::new(config))
}
