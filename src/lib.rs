pub mod asm;
pub mod cpu;
pub mod decoder;
pub mod disasm;
pub mod exec;
pub mod isa;
pub mod machine;
pub mod memory;

pub use asm::{assemble, AsmError, AsmErrorKind, Assembled, SymbolTable};
pub use cpu::{Cpu, CpuConfig, Predicate, Trap, IP, SP};
pub use machine::Machine;
pub use memory::{Bus, Memory, MEMORY_SIZE};
