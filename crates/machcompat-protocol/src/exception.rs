//! # Exception Categories
//!
//! Mach exception types and the bitmask used to select them in
//! `task_set_exception_ports` / `task_get_exception_ports`.
//!
//! Bit `n` of the mask selects exception type `n`; bit 0 is unused.
//!
//! See: [exception_types.h](https://github.com/apple-oss-distributions/xnu/blob/main/osfmk/mach/exception_types.h)

use bitflags::bitflags;

/// Highest exception type the table stores.
pub const EXC_MAX: usize = 9;

/// Exception categories a task may register a handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ExceptionType
{
    /// `EXC_BAD_ACCESS`: could not access memory.
    BadAccess = 1,
    /// `EXC_BAD_INSTRUCTION`: illegal or undefined instruction.
    BadInstruction = 2,
    /// `EXC_ARITHMETIC`: arithmetic exception.
    Arithmetic = 3,
    /// `EXC_EMULATION`: emulation instruction.
    Emulation = 4,
    /// `EXC_SOFTWARE`: software generated exception.
    Software = 5,
    /// `EXC_BREAKPOINT`: trace, breakpoint, etc.
    Breakpoint = 6,
    /// `EXC_SYSCALL`: system call.
    Syscall = 7,
    /// `EXC_MACH_SYSCALL`: Mach system call.
    MachSyscall = 8,
    /// `EXC_RPC_ALERT`: RPC alert.
    RpcAlert = 9,
}

impl ExceptionType
{
    /// All categories in table order.
    pub const ALL: [ExceptionType; EXC_MAX] = [
        ExceptionType::BadAccess,
        ExceptionType::BadInstruction,
        ExceptionType::Arithmetic,
        ExceptionType::Emulation,
        ExceptionType::Software,
        ExceptionType::Breakpoint,
        ExceptionType::Syscall,
        ExceptionType::MachSyscall,
        ExceptionType::RpcAlert,
    ];

    /// Numeric exception type.
    #[must_use]
    pub fn raw(self) -> u32
    {
        self as u32
    }

    /// Mask bit selecting this category.
    #[must_use]
    pub fn mask(self) -> ExceptionMask
    {
        ExceptionMask::from_bits_retain(1 << self.raw())
    }

    /// Look up a category by its numeric type.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self>
    {
        Self::ALL.into_iter().find(|exc| exc.raw() == raw)
    }
}

bitflags! {
    /// Selection of exception categories.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ExceptionMask: u32 {
        /// `EXC_MASK_BAD_ACCESS`
        const BAD_ACCESS = 1 << 1;
        /// `EXC_MASK_BAD_INSTRUCTION`
        const BAD_INSTRUCTION = 1 << 2;
        /// `EXC_MASK_ARITHMETIC`
        const ARITHMETIC = 1 << 3;
        /// `EXC_MASK_EMULATION`
        const EMULATION = 1 << 4;
        /// `EXC_MASK_SOFTWARE`
        const SOFTWARE = 1 << 5;
        /// `EXC_MASK_BREAKPOINT`
        const BREAKPOINT = 1 << 6;
        /// `EXC_MASK_SYSCALL`
        const SYSCALL = 1 << 7;
        /// `EXC_MASK_MACH_SYSCALL`
        const MACH_SYSCALL = 1 << 8;
        /// `EXC_MASK_RPC_ALERT`
        const RPC_ALERT = 1 << 9;
    }
}

impl ExceptionMask
{
    /// Categories selected by this mask, in table order.
    pub fn categories(self) -> impl Iterator<Item = ExceptionType>
    {
        ExceptionType::ALL
            .into_iter()
            .filter(move |exc| self.contains(exc.mask()))
    }

    /// Bits that do not name a category the table stores.
    #[must_use]
    pub fn unknown_bits(self) -> u32
    {
        self.bits() & !Self::all().bits()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_mask_bits_match_exception_numbers()
    {
        assert_eq!(ExceptionType::BadAccess.mask(), ExceptionMask::BAD_ACCESS);
        assert_eq!(ExceptionType::Breakpoint.mask(), ExceptionMask::BREAKPOINT);
        assert_eq!(ExceptionType::RpcAlert.mask().bits(), 0x200);
    }

    #[test]
    fn test_categories_decodes_selected_only()
    {
        let mask = ExceptionMask::BAD_ACCESS | ExceptionMask::BREAKPOINT;
        let selected: Vec<_> = mask.categories().collect();
        assert_eq!(selected, vec![ExceptionType::BadAccess, ExceptionType::Breakpoint]);
    }

    #[test]
    fn test_unknown_bits_are_kept_separately()
    {
        // EXC_MASK_CRASH (1 << 10) and bit 0 are not stored by the table
        let mask = ExceptionMask::from_bits_retain((1 << 10) | 1 | ExceptionMask::SOFTWARE.bits());
        assert_eq!(mask.unknown_bits(), (1 << 10) | 1);
        assert_eq!(mask.categories().collect::<Vec<_>>(), vec![ExceptionType::Software]);
    }
}
