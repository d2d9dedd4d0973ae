//! The register set of the 68000 as seen through the monitor.
//!
//! Registers are identified positionally: `D0..D7` are 0..7, `A0..A7` are 8..15,
//! `SR` is 16 and `PC` is 17.

use std::fmt;

/// Number of registers the monitor reports.
pub const NUM_REGISTERS: usize = 18;

/// Register names, indexed by [`RegisterId`].
pub const REGISTER_NAMES: [&str; NUM_REGISTERS] = [
    "D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7", //
    "A0", "A1", "A2", "A3", "A4", "A5", "A6", "A7", //
    "SR", "PC",
];

/// The position of a register in the register set.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct RegisterId(pub u16);

impl RegisterId {
    /// The status register.
    pub const SR: RegisterId = RegisterId(16);
    /// The program counter.
    pub const PC: RegisterId = RegisterId(17);

    /// Data register `Dn`, `n` in `0..8`.
    pub fn data(n: usize) -> Option<RegisterId> {
        (n < 8).then(|| RegisterId(n as u16))
    }

    /// Address register `An`, `n` in `0..8`.
    pub fn address(n: usize) -> Option<RegisterId> {
        (n < 8).then(|| RegisterId(8 + n as u16))
    }

    /// Looks a register up by its name, e.g. `"A7"`.
    pub fn from_name(name: &str) -> Option<RegisterId> {
        REGISTER_NAMES
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .map(|index| RegisterId(index as u16))
    }

    /// Iterates all registers in positional order.
    pub fn all() -> impl Iterator<Item = RegisterId> {
        (0..NUM_REGISTERS as u16).map(RegisterId)
    }

    /// The display name of the register.
    pub fn name(self) -> &'static str {
        REGISTER_NAMES.get(self.index()).copied().unwrap_or("??")
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<RegisterId> for u32 {
    fn from(value: RegisterId) -> Self {
        u32::from(value.0)
    }
}

/// Receives register values decoded from monitor output.
pub trait RegisterStore {
    /// Stores `value` for register `id`.
    fn supply_register(&mut self, id: RegisterId, value: u32);
}

/// Cached values of all registers.
///
/// Registers not reported by a dump keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    values: [u32; NUM_REGISTERS],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value of register `id`.
    pub fn value(&self, id: RegisterId) -> u32 {
        self.values.get(id.index()).copied().unwrap_or_default()
    }

    pub fn program_counter(&self) -> u32 {
        self.value(RegisterId::PC)
    }

    pub fn status_register(&self) -> u32 {
        self.value(RegisterId::SR)
    }

    /// Iterates `(register, value)` pairs in positional order.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, u32)> + '_ {
        RegisterId::all().map(|id| (id, self.value(id)))
    }
}

impl RegisterStore for RegisterFile {
    fn supply_register(&mut self, id: RegisterId, value: u32) {
        match self.values.get_mut(id.index()) {
            Some(slot) => {
                tracing::trace!("{} = {:#010x}", id, value);
                *slot = value;
            }
            None => tracing::warn!("Ignoring value {:#010x} for unknown register {}", value, id.0),
        }
    }
}
