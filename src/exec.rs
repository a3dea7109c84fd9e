use crate::cpu::{Cpu, Predicate, Trap, IP, SP};
use crate::decoder::Decoded;
use crate::isa::{Opcode, Operand};
use crate::memory::Bus;

pub trait Executor {
    /// Runs the handler for `d`. `ip` is the address the instruction was
    /// fetched from; `cpu.regs[IP]` already points past it.
    ///
    /// A handler that returns `Err` must not have written anything.
    fn exec<B: Bus>(
        &self,
        cpu: &mut Cpu,
        bus: &mut B,
        d: &Decoded,
        ip: u16,
        out: Option<&mut dyn FnMut(u8)>,
    ) -> Result<(), Trap>;
}

fn value(cpu: &Cpu, operand: Operand) -> u16 {
    match operand {
        Operand::Reg(r) => cpu.regs[r as usize],
        Operand::Imm(v) => v,
    }
}

fn sext(v: u16) -> i32 {
    v as i16 as i32
}

/// Integer executor for the whole [`Opcode`] set.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntExecutor;

impl Executor for IntExecutor {
    fn exec<B: Bus>(
        &self,
        cpu: &mut Cpu,
        bus: &mut B,
        d: &Decoded,
        ip: u16,
        out: Option<&mut dyn FnMut(u8)>,
    ) -> Result<(), Trap> {
        let ops = d.operands();
        // Sources always come first in a pattern.
        let a = ops.first().map(|o| value(cpu, *o)).unwrap_or(0);
        let b = ops.get(1).map(|o| value(cpu, *o)).unwrap_or(0);

        if d.op.has_two_destinations() {
            let (hi, lo) = (d.reg(2), d.reg(3));
            if hi == lo {
                return Err(Trap::AliasedDestinations { ip, reg: hi as u8 });
            }
        }

        match d.op {
            Opcode::Nop => {}
            Opcode::Mov => cpu.regs[d.reg(1)] = a,
            Opcode::StoreB => bus.write_u8(b, a as u8),
            Opcode::StoreW => bus.write_u16(b, a),
            Opcode::LoadB => cpu.regs[d.reg(1)] = bus.read_u8(a) as u16,
            Opcode::LoadW => cpu.regs[d.reg(1)] = bus.read_u16(a),
            Opcode::Not => cpu.regs[d.reg(1)] = !a,
            Opcode::And => cpu.regs[d.reg(2)] = a & b,
            Opcode::Or => cpu.regs[d.reg(2)] = a | b,
            Opcode::Xor => cpu.regs[d.reg(2)] = a ^ b,
            Opcode::Shl => cpu.regs[d.reg(2)] = a.checked_shl(b as u32).unwrap_or(0),
            Opcode::Asr => cpu.regs[d.reg(2)] = ((a as i16) >> b.min(15)) as u16,
            Opcode::Shr => cpu.regs[d.reg(2)] = a.checked_shr(b as u32).unwrap_or(0),
            Opcode::Add => {
                let (res, carry) = a.overflowing_add(b);
                cpu.regs[d.reg(2)] = res;
                cpu.flag = carry;
            }
            Opcode::AddC => {
                let sum = a as u32 + b as u32 + cpu.flag as u32;
                cpu.regs[d.reg(2)] = sum as u16;
                cpu.flag = sum > 0xFFFF;
            }
            Opcode::Sub => {
                let (res, borrow) = a.overflowing_sub(b);
                cpu.regs[d.reg(2)] = res;
                cpu.flag = borrow;
            }
            Opcode::SubB => {
                let diff = a as i32 - b as i32 - cpu.flag as i32;
                cpu.regs[d.reg(2)] = diff as u16;
                cpu.flag = diff < 0;
            }
            Opcode::Mul => {
                let product = a as u32 * b as u32;
                cpu.regs[d.reg(2)] = (product >> 16) as u16;
                cpu.regs[d.reg(3)] = product as u16;
            }
            Opcode::IMul => {
                let product = sext(a) * sext(b);
                cpu.regs[d.reg(2)] = (product >> 16) as u16;
                cpu.regs[d.reg(3)] = product as u16;
            }
            Opcode::Div => {
                if b == 0 {
                    return Err(Trap::DivideByZero { ip });
                }
                cpu.regs[d.reg(2)] = a / b;
                cpu.regs[d.reg(3)] = a % b;
            }
            Opcode::IDiv => {
                if b == 0 {
                    return Err(Trap::DivideByZero { ip });
                }
                // 32-bit operands: -32768 / -1 does not overflow here.
                let (x, y) = (sext(a), sext(b));
                cpu.regs[d.reg(2)] = (x / y) as u16;
                cpu.regs[d.reg(3)] = (x % y) as u16;
            }
            Opcode::Cf => cpu.flag = false,
            Opcode::Sf => cpu.flag = true,
            Opcode::IfZ => cpu.predicate = Predicate::arm(a == 0),
            Opcode::If => cpu.predicate = Predicate::arm(a != 0),
            Opcode::IfEq => cpu.predicate = Predicate::arm(a == b),
            Opcode::IfNeq => cpu.predicate = Predicate::arm(a != b),
            Opcode::IfGu => cpu.predicate = Predicate::arm(a > b),
            Opcode::IfLu => cpu.predicate = Predicate::arm(a < b),
            Opcode::IfGs => cpu.predicate = Predicate::arm(sext(a) > sext(b)),
            Opcode::IfLs => cpu.predicate = Predicate::arm(sext(a) < sext(b)),
            Opcode::IfF => cpu.predicate = Predicate::arm(cpu.flag),
            Opcode::IfNf => cpu.predicate = Predicate::arm(!cpu.flag),
            Opcode::Call => {
                let sp = cpu.regs[SP].wrapping_sub(2);
                bus.write_u16(sp, cpu.regs[IP]);
                cpu.regs[SP] = sp;
                cpu.regs[IP] = a;
            }
            Opcode::PushB => {
                let sp = cpu.regs[SP].wrapping_sub(1);
                bus.write_u8(sp, a as u8);
                cpu.regs[SP] = sp;
            }
            Opcode::PushW => {
                let sp = cpu.regs[SP].wrapping_sub(2);
                bus.write_u16(sp, a);
                cpu.regs[SP] = sp;
            }
            Opcode::PopB => {
                let sp = cpu.regs[SP];
                let v = bus.read_u8(sp) as u16;
                cpu.regs[SP] = sp.wrapping_add(1);
                cpu.regs[d.reg(0)] = v;
            }
            Opcode::PopW => {
                let sp = cpu.regs[SP];
                let v = bus.read_u16(sp);
                cpu.regs[SP] = sp.wrapping_add(2);
                cpu.regs[d.reg(0)] = v;
            }
            Opcode::Out => {
                if let Some(emit) = out {
                    emit(a as u8);
                }
            }
        }
        Ok(())
    }
}
