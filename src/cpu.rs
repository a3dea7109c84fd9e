use crate::decoder::Decoder;
use crate::disasm::fmt_decoded;
use crate::exec::Executor;
use crate::memory::Bus;
use serde::{Deserialize, Serialize};

/// Stack pointer register.
pub const SP: usize = 0xE;
/// Instruction pointer register.
pub const IP: usize = 0xF;

/// Values loaded by [`Cpu::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub entry: u16,
    /// Initial SP. Pushes pre-decrement, so 0 puts the first item at 0xFFFF.
    pub stack_top: u16,
}

/// One-shot condition that governs only the next instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub armed: bool,
    pub condition: bool,
}

impl Predicate {
    pub fn arm(condition: bool) -> Self {
        Self {
            armed: true,
            condition,
        }
    }

    /// Whether an instruction governed by this latch should run.
    pub fn allows(self) -> bool {
        !self.armed || self.condition
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    pub regs: [u16; 16],
    /// Carry/borrow of the last arithmetic op.
    pub flag: bool,
    pub predicate: Predicate,
    pub cfg: CpuConfig,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    #[error("Unknown opcode {opcode:#04x} at {ip:#06x}")]
    InvalidOpcode { ip: u16, opcode: u8 },
    #[error("Division by zero at {ip:#06x}")]
    DivideByZero { ip: u16 },
    #[error("Both destinations are r{reg:x} at {ip:#06x}")]
    AliasedDestinations { ip: u16, reg: u8 },
}

impl Cpu {
    pub fn new(cfg: CpuConfig) -> Self {
        let mut cpu = Self {
            cfg,
            ..Self::default()
        };
        cpu.reset();
        cpu
    }

    /// Zeroes registers, flag and latch, then loads IP and SP from the config.
    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.flag = false;
        self.predicate = Predicate::default();
        self.regs[IP] = self.cfg.entry;
        self.regs[SP] = self.cfg.stack_top;
    }

    pub fn ip(&self) -> u16 {
        self.regs[IP]
    }

    pub fn sp(&self) -> u16 {
        self.regs[SP]
    }

    /// Executes one instruction. On error nothing has changed, IP included.
    pub fn step<B: Bus, D: Decoder, X: Executor>(
        &mut self,
        bus: &mut B,
        dec: &D,
        exec: &X,
        out: Option<&mut dyn FnMut(u8)>,
    ) -> Result<(), Trap> {
        let ip = self.ip();
        let d = dec.decode(bus, ip).ok_or_else(|| Trap::InvalidOpcode {
            ip,
            opcode: bus.read_u8(ip),
        })?;

        // Operands are consumed before the handler runs, so CALL and writes
        // to rf land on top of the advanced pointer.
        let latch = std::mem::take(&mut self.predicate);
        self.regs[IP] = ip.wrapping_add(d.width as u16);

        if !latch.allows() {
            tracing::trace!(ip = format_args!("{ip:#06x}"), insn = %fmt_decoded(&d), "skipped");
            return Ok(());
        }
        tracing::trace!(ip = format_args!("{ip:#06x}"), insn = %fmt_decoded(&d), "exec");

        if let Err(trap) = exec.exec(self, bus, &d, ip, out) {
            tracing::debug!(%trap, "trap");
            self.regs[IP] = ip;
            self.predicate = latch;
            return Err(trap);
        }
        Ok(())
    }
}
