//! Single-instruction CIL execution.

use std::cmp::Ordering;

use log::trace;

use crate::{
    emulation::{
        engine::{opcodes::*, MethodCode, StepResult},
        thread::CallFrame,
        EmValue, EmulationError, EvaluationStack, Heap, HeapRef, ReferenceTable, ValueKind,
    },
    file::{io::CilIO, parser::Parser},
    metadata::{cilimage::CilImage, tables::TableId, token::Token},
    Result,
};

/// Where control goes after an instruction.
enum Flow {
    Next,
    Jump(i64),
    Call(Token),
    Return,
}

/// The relations tested by the comparison and conditional branch instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    NeUn,
    GeUn,
    GtUn,
    LeUn,
    LtUn,
}

impl Comparison {
    /// In the order of `beq` .. `blt.un`.
    const BRANCHES: [Comparison; 10] = [
        Comparison::Eq,
        Comparison::Ge,
        Comparison::Gt,
        Comparison::Le,
        Comparison::Lt,
        Comparison::NeUn,
        Comparison::GeUn,
        Comparison::GtUn,
        Comparison::LeUn,
        Comparison::LtUn,
    ];

    fn name(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Ge => "ge",
            Comparison::Gt => "gt",
            Comparison::Le => "le",
            Comparison::Lt => "lt",
            Comparison::NeUn => "ne.un",
            Comparison::GeUn => "ge.un",
            Comparison::GtUn => "gt.un",
            Comparison::LeUn => "le.un",
            Comparison::LtUn => "lt.un",
        }
    }

    fn is_unsigned(self) -> bool {
        matches!(
            self,
            Comparison::NeUn
                | Comparison::GeUn
                | Comparison::GtUn
                | Comparison::LeUn
                | Comparison::LtUn
        )
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::NeUn => ordering != Ordering::Equal,
            Comparison::Ge | Comparison::GeUn => ordering != Ordering::Less,
            Comparison::Gt | Comparison::GtUn => ordering == Ordering::Greater,
            Comparison::Le | Comparison::LeUn => ordering != Ordering::Greater,
            Comparison::Lt | Comparison::LtUn => ordering == Ordering::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
}

impl BinaryOp {
    fn from_opcode(opcode: u8) -> Option<BinaryOp> {
        Some(match opcode {
            ADD => BinaryOp::Add,
            SUB => BinaryOp::Sub,
            MUL => BinaryOp::Mul,
            DIV => BinaryOp::Div,
            DIV_UN => BinaryOp::DivUn,
            REM => BinaryOp::Rem,
            REM_UN => BinaryOp::RemUn,
            AND => BinaryOp::And,
            OR => BinaryOp::Or,
            XOR => BinaryOp::Xor,
            SHL => BinaryOp::Shl,
            SHR => BinaryOp::Shr,
            SHR_UN => BinaryOp::ShrUn,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::DivUn => "div.un",
            BinaryOp::Rem => "rem",
            BinaryOp::RemUn => "rem.un",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::ShrUn => "shr.un",
        }
    }

    fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::ShrUn)
    }
}

macro_rules! integer_binary {
    ($name:ident, $signed:ty, $unsigned:ty) => {
        #[allow(
            clippy::cast_sign_loss,
            clippy::cast_possible_wrap,
            clippy::cast_possible_truncation
        )]
        fn $name(op: BinaryOp, a: $signed, b: $signed) -> Result<$signed> {
            Ok(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div | BinaryOp::Rem => {
                    if b == 0 {
                        return Err(EmulationError::DivisionByZero.into());
                    }
                    let result = if op == BinaryOp::Div {
                        a.checked_div(b)
                    } else {
                        a.checked_rem(b)
                    };
                    result.ok_or(EmulationError::ArithmeticOverflow)?
                }
                BinaryOp::DivUn | BinaryOp::RemUn => {
                    let (a, b) = (a as $unsigned, b as $unsigned);
                    if b == 0 {
                        return Err(EmulationError::DivisionByZero.into());
                    }
                    (if op == BinaryOp::DivUn { a / b } else { a % b }) as $signed
                }
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                BinaryOp::Shl => a.wrapping_shl(b as u32),
                BinaryOp::Shr => a.wrapping_shr(b as u32),
                BinaryOp::ShrUn => (a as $unsigned).wrapping_shr(b as u32) as $signed,
            })
        }
    };
}

integer_binary!(binary_i32, i32, u32);
integer_binary!(binary_i64, i64, u64);

/// Operand reader over the IL of one instruction.
struct Decoder<'a> {
    parser: Parser<'a>,
    offset: usize,
}

impl Decoder<'_> {
    fn next<T: CilIO>(&mut self) -> Result<T> {
        self.parser.read_le::<T>().map_err(|_| {
            EmulationError::InvalidInstructionPointer {
                offset: self.offset,
            }
            .into()
        })
    }

    fn token(&mut self) -> Result<Token> {
        Ok(Token::new(self.next::<u32>()?))
    }
}

/// The CIL interpreter.
///
/// [`Interpreter::step`] executes exactly one instruction of the top frame of a thread against
/// the thread's operand stack and the memory of the AppDomain. Control transfers between
/// frames are reported to the caller as [`StepResult::Call`] and [`StepResult::Return`].
///
/// With specialization enabled, the polymorphic arithmetic, comparison and branch instructions
/// record the operand kind of their first execution in the [`crate::emulation::OperandCache`]
/// of the method and are checked against it afterwards.
#[derive(Clone, Copy, Debug)]
pub struct Interpreter {
    specialize: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new(true)
    }
}

impl Interpreter {
    /// Create an interpreter, with or without operand specialization.
    #[must_use]
    pub fn new(specialize: bool) -> Interpreter {
        Interpreter { specialize }
    }

    /// Returns true if operand kinds are cached.
    #[must_use]
    pub fn specializes(&self) -> bool {
        self.specialize
    }

    /// Execute the instruction at the instruction pointer of `frame`.
    ///
    /// # Errors
    /// Every [`EmulationError`] is fatal for the thread; the frame and stack are left in the
    /// state reached when the fault was detected.
    #[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
    pub fn step(
        &self,
        frame: &mut CallFrame,
        stack: &mut EvaluationStack,
        heap: &mut Heap,
        references: &mut ReferenceTable,
    ) -> Result<StepResult> {
        let Some(code) = frame.code.clone() else {
            return Err(malformed_error!("Frame has no method code - {}", frame.token));
        };

        let il = code.il();
        let offset = frame.ip;
        if offset >= il.len() {
            return Err(EmulationError::InvalidInstructionPointer { offset }.into());
        }

        let mut parser = Parser::new(il);
        parser.seek(offset)?;
        let mut decoder = Decoder { parser, offset };
        let opcode = decoder.next::<u8>()?;

        let flow = match opcode {
            NOP => Flow::Next,
            LDARG_0..=LDARG_3 => {
                stack.push(frame.argument(usize::from(opcode - LDARG_0))?);
                Flow::Next
            }
            LDLOC_0..=LDLOC_3 => {
                stack.push(frame.load_local(usize::from(opcode - LDLOC_0), heap)?);
                Flow::Next
            }
            STLOC_0..=STLOC_3 => {
                let value = stack.pop()?;
                frame.store_local(usize::from(opcode - STLOC_0), value, heap)?;
                Flow::Next
            }
            LDARG_S => {
                let index = decoder.next::<u8>()?;
                stack.push(frame.argument(usize::from(index))?);
                Flow::Next
            }
            STARG_S => {
                let index = decoder.next::<u8>()?;
                let value = stack.pop()?;
                frame.set_argument(usize::from(index), value)?;
                Flow::Next
            }
            LDLOC_S => {
                let index = decoder.next::<u8>()?;
                stack.push(frame.load_local(usize::from(index), heap)?);
                Flow::Next
            }
            STLOC_S => {
                let index = decoder.next::<u8>()?;
                let value = stack.pop()?;
                frame.store_local(usize::from(index), value, heap)?;
                Flow::Next
            }
            LDNULL => {
                stack.push(EmValue::Null);
                Flow::Next
            }
            LDC_I4_M1..=LDC_I4_8 => {
                stack.push(EmValue::Int32(i32::from(opcode) - i32::from(LDC_I4_0)));
                Flow::Next
            }
            LDC_I4_S => {
                stack.push(EmValue::Int32(i32::from(decoder.next::<i8>()?)));
                Flow::Next
            }
            LDC_I4 => {
                stack.push(EmValue::Int32(decoder.next::<i32>()?));
                Flow::Next
            }
            LDC_I8 => {
                stack.push(EmValue::Int64(decoder.next::<i64>()?));
                Flow::Next
            }
            DUP => {
                let value = stack.peek(0)?.clone();
                stack.push(value);
                Flow::Next
            }
            POP => {
                stack.pop()?;
                Flow::Next
            }
            CALL => Flow::Call(decoder.token()?),
            RET => Flow::Return,
            BR_S => Flow::Jump(i64::from(decoder.next::<i8>()?)),
            BR => Flow::Jump(i64::from(decoder.next::<i32>()?)),
            BRFALSE_S | BRTRUE_S | BRFALSE | BRTRUE => {
                let delta = if opcode < BR {
                    i64::from(decoder.next::<i8>()?)
                } else {
                    i64::from(decoder.next::<i32>()?)
                };
                let when = opcode == BRTRUE_S || opcode == BRTRUE;
                if stack.pop()?.is_true() == when {
                    Flow::Jump(delta)
                } else {
                    Flow::Next
                }
            }
            BEQ_S..=BLT_UN_S => {
                let delta = i64::from(decoder.next::<i8>()?);
                let comparison = Comparison::BRANCHES[usize::from(opcode - BEQ_S)];
                if self.compare(&code, offset, stack, comparison)? {
                    Flow::Jump(delta)
                } else {
                    Flow::Next
                }
            }
            BEQ..=BLT_UN => {
                let delta = i64::from(decoder.next::<i32>()?);
                let comparison = Comparison::BRANCHES[usize::from(opcode - BEQ)];
                if self.compare(&code, offset, stack, comparison)? {
                    Flow::Jump(delta)
                } else {
                    Flow::Next
                }
            }
            ADD..=SHR_UN => {
                let Some(op) = BinaryOp::from_opcode(opcode) else {
                    return Err(EmulationError::UnsupportedOpcode {
                        opcode,
                        prefix: None,
                    }
                    .into());
                };
                let result = self.binary(&code, offset, stack, op)?;
                stack.push(result);
                Flow::Next
            }
            NEG | NOT => {
                let result = self.unary(&code, offset, stack, opcode == NEG)?;
                stack.push(result);
                Flow::Next
            }
            CONV_I1 | CONV_I2 | CONV_I4 | CONV_I8 | CONV_U4 | CONV_U8 | CONV_U2 | CONV_U1
            | CONV_I | CONV_U => {
                let value = stack.pop()?;
                stack.push(convert(opcode, &value)?);
                Flow::Next
            }
            LDSTR => {
                let token = decoder.token()?;
                let value = frame.image()?.user_string(token)?;
                stack.push(EmValue::string(&value));
                Flow::Next
            }
            NEWARR => {
                let token = decoder.token()?;
                let length = stack.pop()?.as_i64("newarr")?;
                let Ok(length) = usize::try_from(length) else {
                    return Err(EmulationError::ArithmeticOverflow.into());
                };
                let default = element_default(frame.image()?, token)?;
                stack.push(EmValue::Object(references.alloc_array(length, default)?));
                Flow::Next
            }
            LDLEN => {
                let array = array_ref(stack.pop()?, "ldlen")?;
                let length = i32::try_from(references.array(array)?.len())
                    .map_err(|_| EmulationError::ArithmeticOverflow)?;
                stack.push(EmValue::Int32(length));
                Flow::Next
            }
            LDELEM_I1 | LDELEM_U1 | LDELEM_I2 | LDELEM_U2 | LDELEM_I4 | LDELEM_U4
            | LDELEM_I8 | LDELEM_REF => {
                let index = stack.pop()?;
                let array = array_ref(stack.pop()?, "ldelem")?;
                let elements = references.array(array)?;
                let element = &elements[element_index(&index, elements.len(), "ldelem")?];
                stack.push(load_element(opcode, element)?);
                Flow::Next
            }
            STELEM_I1 | STELEM_I2 | STELEM_I4 | STELEM_I8 | STELEM_REF => {
                let value = stack.pop()?;
                let index = stack.pop()?;
                let array = array_ref(stack.pop()?, "stelem")?;
                let stored = store_element(opcode, value)?;
                let elements = references.array_mut(array)?;
                let slot = element_index(&index, elements.len(), "stelem")?;
                elements[slot] = stored;
                Flow::Next
            }
            PREFIX => {
                let extended = decoder.next::<u8>()?;
                match extended {
                    CEQ | CGT | CGT_UN | CLT | CLT_UN => {
                        let comparison = match extended {
                            CEQ => Comparison::Eq,
                            CGT => Comparison::Gt,
                            CGT_UN => Comparison::GtUn,
                            CLT => Comparison::Lt,
                            _ => Comparison::LtUn,
                        };
                        let result = self.compare(&code, offset, stack, comparison)?;
                        stack.push(EmValue::Int32(i32::from(result)));
                    }
                    LDARG => {
                        let index = decoder.next::<u16>()?;
                        stack.push(frame.argument(usize::from(index))?);
                    }
                    STARG => {
                        let index = decoder.next::<u16>()?;
                        let value = stack.pop()?;
                        frame.set_argument(usize::from(index), value)?;
                    }
                    LDLOC => {
                        let index = decoder.next::<u16>()?;
                        stack.push(frame.load_local(usize::from(index), heap)?);
                    }
                    STLOC => {
                        let index = decoder.next::<u16>()?;
                        let value = stack.pop()?;
                        frame.store_local(usize::from(index), value, heap)?;
                    }
                    _ => {
                        return Err(EmulationError::UnsupportedOpcode {
                            opcode: extended,
                            prefix: Some(PREFIX),
                        }
                        .into())
                    }
                }
                Flow::Next
            }
            _ => {
                return Err(EmulationError::UnsupportedOpcode {
                    opcode,
                    prefix: None,
                }
                .into())
            }
        };

        let next = decoder.parser.pos();
        match flow {
            Flow::Next => {
                frame.ip = next;
                Ok(StepResult::Continue)
            }
            Flow::Jump(delta) => {
                let target = next as i64 + delta;
                match usize::try_from(target) {
                    Ok(target) if target < il.len() => {
                        frame.ip = target;
                        Ok(StepResult::Continue)
                    }
                    _ => Err(EmulationError::InvalidBranchTarget { target }.into()),
                }
            }
            Flow::Call(token) => {
                frame.ip = next;
                Ok(StepResult::Call(token))
            }
            Flow::Return => {
                frame.ip = next;
                Ok(StepResult::Return)
            }
        }
    }

    /// Resolve the operand kind of the instruction at `offset` from an observed kind.
    fn specialize_at(
        &self,
        code: &MethodCode,
        offset: usize,
        observed: ValueKind,
        operation: &'static str,
    ) -> Result<ValueKind> {
        if !self.specialize {
            return Ok(observed);
        }

        match code.cache.get(offset) {
            Some(kind) if kind != observed => Err(EmulationError::TypeMismatch {
                operation,
                expected: kind.name(),
                found: observed.name(),
            }
            .into()),
            Some(kind) => Ok(kind),
            None => {
                trace!(
                    "{}@{:#06x}: {} specialized for {}",
                    code.name,
                    offset,
                    operation,
                    observed.name()
                );
                code.cache.set(offset, observed);
                Ok(observed)
            }
        }
    }

    /// The common kind of two operands.
    fn operand_kind(
        &self,
        code: &MethodCode,
        offset: usize,
        value1: &EmValue,
        value2: &EmValue,
        operation: &'static str,
    ) -> Result<ValueKind> {
        let observed = value1.kind();
        if value2.kind() != observed {
            return Err(EmulationError::TypeMismatch {
                operation,
                expected: observed.name(),
                found: value2.kind().name(),
            }
            .into());
        }

        self.specialize_at(code, offset, observed, operation)
    }

    /// Pop value2 and value1 and test `value1 <comparison> value2`.
    #[allow(clippy::cast_sign_loss)]
    fn compare(
        &self,
        code: &MethodCode,
        offset: usize,
        stack: &mut EvaluationStack,
        comparison: Comparison,
    ) -> Result<bool> {
        let (value1, value2) = stack.pop_pair()?;
        let operation = comparison.name();

        match self.operand_kind(code, offset, &value1, &value2, operation)? {
            ValueKind::Int32 => {
                let (a, b) = (value1.as_i32(operation)?, value2.as_i32(operation)?);
                let ordering = if comparison.is_unsigned() {
                    (a as u32).cmp(&(b as u32))
                } else {
                    a.cmp(&b)
                };
                Ok(comparison.holds(ordering))
            }
            ValueKind::Int64 => {
                let (a, b) = (value1.as_i64(operation)?, value2.as_i64(operation)?);
                let ordering = if comparison.is_unsigned() {
                    (a as u64).cmp(&(b as u64))
                } else {
                    a.cmp(&b)
                };
                Ok(comparison.holds(ordering))
            }
            // References only support identity: `cgt.un` against null is the `!= null` idiom.
            ValueKind::Object => match comparison {
                Comparison::Eq => Ok(value1 == value2),
                Comparison::NeUn | Comparison::GtUn => Ok(value1 != value2),
                _ => Err(EmulationError::TypeMismatch {
                    operation,
                    expected: "integer",
                    found: value1.type_name(),
                }
                .into()),
            },
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn binary(
        &self,
        code: &MethodCode,
        offset: usize,
        stack: &mut EvaluationStack,
        op: BinaryOp,
    ) -> Result<EmValue> {
        let (value1, value2) = stack.pop_pair()?;
        let operation = op.name();

        let kind = if op.is_shift() {
            self.specialize_at(code, offset, value1.kind(), operation)?
        } else {
            self.operand_kind(code, offset, &value1, &value2, operation)?
        };

        match kind {
            ValueKind::Int32 => {
                let a = value1.as_i32(operation)?;
                let b = if op.is_shift() {
                    value2.as_i64(operation)? as i32
                } else {
                    value2.as_i32(operation)?
                };
                Ok(EmValue::Int32(binary_i32(op, a, b)?))
            }
            ValueKind::Int64 => {
                let a = value1.as_i64(operation)?;
                let b = value2.as_i64(operation)?;
                Ok(EmValue::Int64(binary_i64(op, a, b)?))
            }
            ValueKind::Object => Err(EmulationError::TypeMismatch {
                operation,
                expected: "integer",
                found: value1.type_name(),
            }
            .into()),
        }
    }

    fn unary(
        &self,
        code: &MethodCode,
        offset: usize,
        stack: &mut EvaluationStack,
        negate: bool,
    ) -> Result<EmValue> {
        let value = stack.pop()?;
        let operation = if negate { "neg" } else { "not" };

        match self.specialize_at(code, offset, value.kind(), operation)? {
            ValueKind::Int32 => {
                let a = value.as_i32(operation)?;
                Ok(EmValue::Int32(if negate { a.wrapping_neg() } else { !a }))
            }
            ValueKind::Int64 => {
                let a = value.as_i64(operation)?;
                Ok(EmValue::Int64(if negate { a.wrapping_neg() } else { !a }))
            }
            ValueKind::Object => Err(EmulationError::TypeMismatch {
                operation,
                expected: "integer",
                found: value.type_name(),
            }
            .into()),
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn convert(opcode: u8, value: &EmValue) -> Result<EmValue> {
    let raw = value.as_i64("conv")?;
    Ok(match opcode {
        CONV_I1 => EmValue::Int32(i32::from(raw as i8)),
        CONV_I2 => EmValue::Int32(i32::from(raw as i16)),
        CONV_U1 => EmValue::Int32(i32::from(raw as u8)),
        CONV_U2 => EmValue::Int32(i32::from(raw as u16)),
        CONV_I4 | CONV_U4 => EmValue::Int32(raw as i32),
        CONV_U8 | CONV_U => match value {
            EmValue::Int32(v) => EmValue::Int64(i64::from(*v as u32)),
            _ => EmValue::Int64(raw),
        },
        _ => EmValue::Int64(raw),
    })
}

/// The initial element of a `newarr` array of `token`.
fn element_default(image: &CilImage, token: Token) -> Result<EmValue> {
    match TableId::from_index(token.table()) {
        Some(TableId::TypeDef | TableId::TypeRef) => {
            let (namespace, name) = image.type_name(token)?;
            if namespace != "System" {
                return Ok(EmValue::Null);
            }

            Ok(match name {
                "Int64" | "UInt64" | "IntPtr" | "UIntPtr" => EmValue::Int64(0),
                "Boolean" | "Char" | "SByte" | "Byte" | "Int16" | "UInt16" | "Int32"
                | "UInt32" => EmValue::Int32(0),
                _ => EmValue::Null,
            })
        }
        Some(TableId::TypeSpec) => Ok(EmValue::Null),
        _ => Err(EmulationError::UnsupportedToken { token }.into()),
    }
}

fn array_ref(value: EmValue, operation: &'static str) -> Result<HeapRef> {
    match value {
        EmValue::Object(reference) => Ok(reference),
        EmValue::Null => Err(EmulationError::NullReference.into()),
        other => Err(EmulationError::TypeMismatch {
            operation,
            expected: "array",
            found: other.type_name(),
        }
        .into()),
    }
}

fn element_index(index: &EmValue, length: usize, operation: &'static str) -> Result<usize> {
    let index = index.as_i64(operation)?;
    usize::try_from(index)
        .ok()
        .filter(|slot| *slot < length)
        .ok_or_else(|| EmulationError::InvalidArrayIndex { index, length }.into())
}

#[allow(clippy::cast_possible_truncation)]
fn load_element(opcode: u8, element: &EmValue) -> Result<EmValue> {
    if opcode == LDELEM_REF {
        return Ok(element.clone());
    }

    let raw = element.as_i64("ldelem")?;
    Ok(match opcode {
        LDELEM_I1 => EmValue::Int32(i32::from(raw as i8)),
        LDELEM_U1 => EmValue::Int32(i32::from(raw as u8)),
        LDELEM_I2 => EmValue::Int32(i32::from(raw as i16)),
        LDELEM_U2 => EmValue::Int32(i32::from(raw as u16)),
        LDELEM_I8 => EmValue::Int64(raw),
        _ => EmValue::Int32(raw as i32),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn store_element(opcode: u8, value: EmValue) -> Result<EmValue> {
    if opcode == STELEM_REF {
        return match value {
            EmValue::Int32(_) | EmValue::Int64(_) => Err(EmulationError::TypeMismatch {
                operation: "stelem.ref",
                expected: "reference",
                found: value.type_name(),
            }
            .into()),
            reference => Ok(reference),
        };
    }

    let raw = value.as_i64("stelem")?;
    Ok(match opcode {
        STELEM_I1 => EmValue::Int32(i32::from(raw as i8)),
        STELEM_I2 => EmValue::Int32(i32::from(raw as i16)),
        STELEM_I8 => EmValue::Int64(raw),
        _ => EmValue::Int32(raw as i32),
    })
}
