//! The x86-64 register file
//!
//! Physical and virtual registers share one 32-bit id space: 0 is "no
//! register", ids in `[1, 2^31)` are physical, and ids in `[2^31, 2^32)`
//! are virtual. ABI save classification follows the System-V convention of
//! the Linux target.

use std::fmt;

/// Register classes, matched against virtual registers at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    GeneralPurpose,
    FloatingPoint,
}

/// The physical x86-64 registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum X64Register {
    Rax = 1,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rsp,
    Rbp,
    Rip,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

impl X64Register {
    pub fn class(self) -> RegisterClass {
        if (self as u32) >= (X64Register::Xmm0 as u32) {
            RegisterClass::FloatingPoint
        } else {
            RegisterClass::GeneralPurpose
        }
    }

    /// Callee-saved registers under the System-V ABI.
    pub fn is_callee_saved(self) -> bool {
        matches!(
            self,
            X64Register::Rbx
                | X64Register::R12
                | X64Register::R13
                | X64Register::R14
                | X64Register::R15
                | X64Register::Rsp
                | X64Register::Rbp
        )
    }

    /// Caller-saved registers under the System-V ABI.
    pub fn is_caller_saved(self) -> bool {
        matches!(
            self,
            X64Register::Rax
                | X64Register::Rcx
                | X64Register::Rdx
                | X64Register::Rdi
                | X64Register::Rsi
                | X64Register::R8
                | X64Register::R9
                | X64Register::R10
                | X64Register::R11
                | X64Register::Xmm0
                | X64Register::Xmm1
                | X64Register::Xmm2
                | X64Register::Xmm3
                | X64Register::Xmm4
                | X64Register::Xmm5
                | X64Register::Xmm6
                | X64Register::Xmm7
                | X64Register::Xmm8
                | X64Register::Xmm9
                | X64Register::Xmm10
                | X64Register::Xmm11
                | X64Register::Xmm12
                | X64Register::Xmm13
                | X64Register::Xmm14
                | X64Register::Xmm15
        )
    }

    /// All physical registers in id order.
    pub const ALL: [X64Register; 33] = [
        X64Register::Rax,
        X64Register::Rbx,
        X64Register::Rcx,
        X64Register::Rdx,
        X64Register::Rdi,
        X64Register::Rsi,
        X64Register::R8,
        X64Register::R9,
        X64Register::R10,
        X64Register::R11,
        X64Register::R12,
        X64Register::R13,
        X64Register::R14,
        X64Register::R15,
        X64Register::Rsp,
        X64Register::Rbp,
        X64Register::Rip,
        X64Register::Xmm0,
        X64Register::Xmm1,
        X64Register::Xmm2,
        X64Register::Xmm3,
        X64Register::Xmm4,
        X64Register::Xmm5,
        X64Register::Xmm6,
        X64Register::Xmm7,
        X64Register::Xmm8,
        X64Register::Xmm9,
        X64Register::Xmm10,
        X64Register::Xmm11,
        X64Register::Xmm12,
        X64Register::Xmm13,
        X64Register::Xmm14,
        X64Register::Xmm15,
    ];

    pub fn from_id(id: u32) -> Option<X64Register> {
        Self::ALL.get(id.checked_sub(1)? as usize).copied()
    }

    /// The AT&T spelling of this register for a sub-register width in
    /// bytes (1, 2, 4 or 8). SSE registers have one spelling.
    pub fn name(self, subreg: u16) -> &'static str {
        use X64Register::*;

        match self {
            Rax => match subreg {
                1 => "al",
                2 => "ax",
                4 => "eax",
                _ => "rax",
            },
            Rbx => match subreg {
                1 => "bl",
                2 => "bx",
                4 => "ebx",
                _ => "rbx",
            },
            Rcx => match subreg {
                1 => "cl",
                2 => "cx",
                4 => "ecx",
                _ => "rcx",
            },
            Rdx => match subreg {
                1 => "dl",
                2 => "dx",
                4 => "edx",
                _ => "rdx",
            },
            Rdi => match subreg {
                1 => "dil",
                2 => "di",
                4 => "edi",
                _ => "rdi",
            },
            Rsi => match subreg {
                1 => "sil",
                2 => "si",
                4 => "esi",
                _ => "rsi",
            },
            Rsp => match subreg {
                1 => "spl",
                2 => "sp",
                4 => "esp",
                _ => "rsp",
            },
            Rbp => match subreg {
                1 => "bpl",
                2 => "bp",
                4 => "ebp",
                _ => "rbp",
            },
            R8 => match subreg {
                1 => "r8b",
                2 => "r8w",
                4 => "r8d",
                _ => "r8",
            },
            R9 => match subreg {
                1 => "r9b",
                2 => "r9w",
                4 => "r9d",
                _ => "r9",
            },
            R10 => match subreg {
                1 => "r10b",
                2 => "r10w",
                4 => "r10d",
                _ => "r10",
            },
            R11 => match subreg {
                1 => "r11b",
                2 => "r11w",
                4 => "r11d",
                _ => "r11",
            },
            R12 => match subreg {
                1 => "r12b",
                2 => "r12w",
                4 => "r12d",
                _ => "r12",
            },
            R13 => match subreg {
                1 => "r13b",
                2 => "r13w",
                4 => "r13d",
                _ => "r13",
            },
            R14 => match subreg {
                1 => "r14b",
                2 => "r14w",
                4 => "r14d",
                _ => "r14",
            },
            R15 => match subreg {
                1 => "r15b",
                2 => "r15w",
                4 => "r15d",
                _ => "r15",
            },
            Rip => "rip",
            Xmm0 => "xmm0",
            Xmm1 => "xmm1",
            Xmm2 => "xmm2",
            Xmm3 => "xmm3",
            Xmm4 => "xmm4",
            Xmm5 => "xmm5",
            Xmm6 => "xmm6",
            Xmm7 => "xmm7",
            Xmm8 => "xmm8",
            Xmm9 => "xmm9",
            Xmm10 => "xmm10",
            Xmm11 => "xmm11",
            Xmm12 => "xmm12",
            Xmm13 => "xmm13",
            Xmm14 => "xmm14",
            Xmm15 => "xmm15",
        }
    }
}

/// A register id, physical or virtual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Register(pub u32);

impl Register {
    pub const NONE: u32 = 0;
    pub const PHYSICAL_BARRIER: u32 = 1;
    pub const VIRTUAL_BARRIER: u32 = 1 << 31;

    pub fn none() -> Register {
        Register(Self::NONE)
    }

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != Self::NONE
    }

    pub fn is_physical(self) -> bool {
        (Self::PHYSICAL_BARRIER..Self::VIRTUAL_BARRIER).contains(&self.0)
    }

    pub fn is_virtual(self) -> bool {
        self.0 >= Self::VIRTUAL_BARRIER
    }

    /// The physical register this id names; panics on virtual ids.
    pub fn physical(self) -> X64Register {
        X64Register::from_id(self.0).expect("not a physical register id")
    }
}

impl From<X64Register> for Register {
    fn from(reg: X64Register) -> Register {
        Register(reg as u32)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_virtual() {
            write!(f, "v{}", self.0 - Self::VIRTUAL_BARRIER)
        } else if self.is_physical() {
            write!(f, "%{}", self.physical().name(8))
        } else {
            write!(f, "<none>")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_space_barriers() {
        assert!(!Register::none().is_valid());
        assert!(Register::from(X64Register::Rax).is_physical());
        assert!(Register(Register::VIRTUAL_BARRIER).is_virtual());
        assert!(!Register(Register::VIRTUAL_BARRIER - 1).is_virtual());
    }

    #[test]
    fn classes_split_at_xmm0() {
        assert_eq!(X64Register::R15.class(), RegisterClass::GeneralPurpose);
        assert_eq!(X64Register::Xmm0.class(), RegisterClass::FloatingPoint);
    }

    #[test]
    fn abi_save_sets_are_disjoint_for_gprs() {
        for id in 1..=(X64Register::Xmm15 as u32) {
            let reg = X64Register::from_id(id).unwrap();
            // RIP is neither; everything else is exactly one of the two.
            if reg == X64Register::Rip {
                continue;
            }

            assert!(
                reg.is_callee_saved() != reg.is_caller_saved(),
                "{:?} must be in exactly one save set",
                reg
            );
        }
    }

    #[test]
    fn subregister_names() {
        assert_eq!(X64Register::Rax.name(1), "al");
        assert_eq!(X64Register::Rax.name(4), "eax");
        assert_eq!(X64Register::Rdi.name(1), "dil");
        assert_eq!(X64Register::R10.name(2), "r10w");
        assert_eq!(X64Register::Xmm3.name(8), "xmm3");
    }
}
