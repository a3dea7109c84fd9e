use serde::{Deserialize, Serialize};

use crate::cpu::{Cpu, CpuConfig, Trap};
use crate::decoder::IsaDecoder;
use crate::exec::IntExecutor;
use crate::memory::Memory;

/// Registers plus memory: everything an embedding driver owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub cpu: Cpu,
    pub mem: Memory,
}

impl Machine {
    pub fn new(cfg: CpuConfig) -> Self {
        Self {
            cpu: Cpu::new(cfg),
            mem: Memory::new(),
        }
    }

    /// Machine whose memory starts as `code` at address 0.
    pub fn with_program(cfg: CpuConfig, code: &[u8]) -> Self {
        let mut m = Self::new(cfg);
        m.mem.load(code, 0);
        m
    }

    /// Resets registers, flag and latch; clears memory unless `preserve_memory`.
    pub fn reset(&mut self, preserve_memory: bool) {
        self.cpu.reset();
        if !preserve_memory {
            self.mem.clear();
        }
    }

    pub fn step(&mut self, out: Option<&mut dyn FnMut(u8)>) -> Result<(), Trap> {
        self.cpu
            .step(&mut self.mem, &IsaDecoder, &IntExecutor, out)
    }

    /// Steps until a trap or `max_steps` instructions. Returns the number of
    /// completed steps and the trap, if any.
    pub fn run(&mut self, max_steps: u64, out: &mut dyn FnMut(u8)) -> (u64, Option<Trap>) {
        for n in 0..max_steps {
            if let Err(trap) = self.step(Some(&mut *out)) {
                return (n, Some(trap));
            }
        }
        (max_steps, None)
    }
}
