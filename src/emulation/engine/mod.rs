//! CIL instruction interpreter.
//!
//! # Architecture
//!
//! - [`Interpreter`] - decodes and executes one instruction per call
//! - [`MethodCode`] - a method prepared once for execution and shared by its frames
//! - [`OperandCache`] - operand kinds resolved by the polymorphic instructions of a method
//! - [`EmulationError`] - every fault raised while executing
//!
//! The interpreter never touches the call stack itself. Calls and returns are reported as a
//! [`StepResult`] and carried out by the thread, which drives the frame state machine.

mod cache;
mod code;
mod error;
mod interpreter;
mod opcodes;

pub use cache::OperandCache;
pub use code::MethodCode;
pub use error::EmulationError;
pub use interpreter::Interpreter;

use crate::metadata::token::Token;

/// Result of executing a single instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// Continue with the instruction at the updated instruction pointer.
    Continue,
    /// Call the method named by the token; the instruction pointer already points past `call`.
    Call(Token),
    /// Return from the current method; a return value, if any, is on the operand stack.
    Return,
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        emulation::{
            runtime::Assembly,
            thread::{CallFrame, FrameState, LocalSlot},
            EmValue, EvaluationStack, Heap, ReferenceTable,
        },
        metadata::{
            cilimage::CilImage,
            tables::{CodedIndex, TableId},
        },
        test::{fat_body, ImageBuilder},
        Result,
    };

    /// `static void ()`
    const VOID_SIG: [u8; 3] = [0x00, 0x00, 0x01];

    struct Harness {
        interpreter: Interpreter,
        frame: CallFrame,
        stack: EvaluationStack,
        heap: Heap,
        references: ReferenceTable,
    }

    impl Harness {
        fn new(builder: &ImageBuilder, method: Token, specialize: bool) -> Harness {
            let image = CilImage::from_mem(builder.build()).unwrap();
            let assembly = Rc::new(Assembly::from_image("Tests", image));

            let mut frame = CallFrame::new(method, assembly.clone());
            frame.code = Some(assembly.method(method).unwrap());
            frame.executing = Some(assembly);
            frame.state = FrameState::Executing;

            Harness {
                interpreter: Interpreter::new(specialize),
                frame,
                stack: EvaluationStack::new(),
                heap: Heap::new(256).unwrap(),
                references: ReferenceTable::new(),
            }
        }

        fn il(code: &[u8]) -> Harness {
            let mut builder = ImageBuilder::new("Tests");
            builder.type_def("Tests", "Program");
            let method = builder.method("Test", &VOID_SIG, &fat_body(8, Token::new(0), false, code));
            Harness::new(&builder, method, true)
        }

        fn with_locals(mut self, locals: &[EmValue]) -> Harness {
            self.frame.locals = locals.iter().cloned().map(LocalSlot::Managed).collect();
            self
        }

        fn step(&mut self) -> Result<StepResult> {
            self.interpreter.step(
                &mut self.frame,
                &mut self.stack,
                &mut self.heap,
                &mut self.references,
            )
        }

        fn run(&mut self) -> Result<StepResult> {
            loop {
                match self.step()? {
                    StepResult::Continue => {}
                    other => return Ok(other),
                }
            }
        }

        fn values(&self) -> Vec<EmValue> {
            self.stack.iter().cloned().collect()
        }
    }

    fn fault<T: std::fmt::Debug>(result: Result<T>) -> EmulationError {
        result.unwrap_err().as_emulation().cloned().unwrap()
    }

    #[test]
    fn test_int32_arithmetic() {
        // (7 / 3) * 2, 7 % 3, -(5), ~0
        #[rustfmt::skip]
        let mut harness = Harness::il(&[
            0x1F, 0x07, 0x19, 0x5B, 0x18, 0x5A,
            0x1D, 0x19, 0x5D,
            0x1B, 0x65,
            0x16, 0x66,
            0x2A,
        ]);

        assert_eq!(harness.run().unwrap(), StepResult::Return);
        assert_eq!(
            harness.values(),
            vec![
                EmValue::Int32(4),
                EmValue::Int32(1),
                EmValue::Int32(-5),
                EmValue::Int32(-1)
            ]
        );
        assert_eq!(harness.frame.ip(), 14);
    }

    #[test]
    fn test_int64_loop() {
        // long i = 0, sum = 0; while (i < 10) { sum += i; i++; } return sum;
        #[rustfmt::skip]
        let mut harness = Harness::il(&[
            0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0x0A,
            0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0x0B,
            0x2B, 0x09,
            0x07, 0x06, 0x58, 0x0B,
            0x06, 0x17, 0x6A, 0x58, 0x0A,
            0x06, 0x1F, 0x0A, 0x6A, 0x32, 0xF1,
            0x07, 0x2A,
        ])
        .with_locals(&[EmValue::Int64(0), EmValue::Int64(0)]);

        harness.run().unwrap();
        assert_eq!(harness.values(), vec![EmValue::Int64(45)]);

        let code = harness.frame.code().unwrap();
        assert_eq!(code.cache.get(35), Some(crate::emulation::ValueKind::Int64));
        assert_eq!(code.cache.resolved(), 3);
    }

    #[test]
    fn test_specialization_shared_across_frames() {
        // ldarg.0; ldarg.1; ceq; ret
        let mut builder = ImageBuilder::new("Tests");
        builder.type_def("Tests", "Program");
        let method = builder.method(
            "Equal",
            &[0x00, 0x02, 0x02, 0x0A, 0x0A],
            &fat_body(2, Token::new(0), false, &[0x02, 0x03, 0xFE, 0x01, 0x2A]),
        );

        for specialize in [true, false] {
            let mut harness = Harness::new(&builder, method, specialize);
            harness.frame.arguments = vec![EmValue::Int64(7), EmValue::Int64(7)];
            harness.run().unwrap();
            assert_eq!(harness.values(), vec![EmValue::Int32(1)]);

            // A second activation of the same code with int32 operands
            harness.stack = EvaluationStack::new();
            harness.frame.ip = 0;
            harness.frame.arguments = vec![EmValue::Int32(7), EmValue::Int32(8)];
            let result = harness.run();
            if specialize {
                assert_eq!(
                    fault(result),
                    EmulationError::TypeMismatch {
                        operation: "eq",
                        expected: "int64",
                        found: "int32"
                    }
                );
            } else {
                result.unwrap();
                assert_eq!(harness.values(), vec![EmValue::Int32(0)]);
            }
        }
    }

    #[test]
    fn test_mixed_operands() {
        // ldc.i4.1; ldc.i8 1; add
        let mut harness = Harness::il(&[0x17, 0x21, 1, 0, 0, 0, 0, 0, 0, 0, 0x58, 0x2A]);
        assert!(matches!(
            fault(harness.run()),
            EmulationError::TypeMismatch {
                operation: "add",
                ..
            }
        ));
    }

    #[test]
    fn test_division_faults() {
        // int.MinValue / -1
        let mut harness = Harness::il(&[0x20, 0x00, 0x00, 0x00, 0x80, 0x15, 0x5B, 0x2A]);
        assert_eq!(fault(harness.run()), EmulationError::ArithmeticOverflow);

        // 1 % 0
        let mut harness = Harness::il(&[0x17, 0x16, 0x5D, 0x2A]);
        assert_eq!(fault(harness.run()), EmulationError::DivisionByZero);

        // 1L div.un 0L
        let mut harness = Harness::il(&[0x17, 0x6A, 0x16, 0x6A, 0x5C, 0x2A]);
        assert_eq!(fault(harness.run()), EmulationError::DivisionByZero);
    }

    #[test]
    fn test_wrapping_and_shifts() {
        // int.MaxValue + 1; 1L << 40; -8 >>> 1; -8 >> 1
        #[rustfmt::skip]
        let mut harness = Harness::il(&[
            0x20, 0xFF, 0xFF, 0xFF, 0x7F, 0x17, 0x58,
            0x17, 0x6A, 0x1F, 0x28, 0x62,
            0x1F, 0xF8, 0x17, 0x64,
            0x1F, 0xF8, 0x17, 0x63,
            0x2A,
        ]);

        harness.run().unwrap();
        assert_eq!(
            harness.values(),
            vec![
                EmValue::Int32(i32::MIN),
                EmValue::Int64(1 << 40),
                EmValue::Int32(0x7FFF_FFFC),
                EmValue::Int32(-4),
            ]
        );
    }

    #[test]
    fn test_conversions() {
        // conv.u8(-1); conv.i8(-1); conv.i1(0x1_0000_0080L); conv.u2(-1); conv.i(5)
        #[rustfmt::skip]
        let mut harness = Harness::il(&[
            0x15, 0x6E,
            0x15, 0x6A,
            0x21, 0x80, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x67,
            0x15, 0xD1,
            0x1B, 0xD3,
            0x2A,
        ]);

        harness.run().unwrap();
        assert_eq!(
            harness.values(),
            vec![
                EmValue::Int64(0xFFFF_FFFF),
                EmValue::Int64(-1),
                EmValue::Int32(-128),
                EmValue::Int32(0xFFFF),
                EmValue::Int64(5),
            ]
        );
    }

    #[test]
    fn test_comparisons_and_branches() {
        // clt.un(-1, 1); cgt(-1, 1); ldnull; ldnull; ceq; "x" cgt.un null
        let mut builder = ImageBuilder::new("Tests");
        builder.type_def("Tests", "Program");
        let text = builder.user_string("x");
        let mut code = vec![0x15, 0x17, 0xFE, 0x05, 0x15, 0x17, 0xFE, 0x02];
        code.extend_from_slice(&[0x14, 0x14, 0xFE, 0x01, 0x72]);
        code.extend_from_slice(&text.value().to_le_bytes());
        code.extend_from_slice(&[0x14, 0xFE, 0x03]);
        // brfalse.s +1 over a nop when 0; brtrue.s -> ret
        code.extend_from_slice(&[0x16, 0x2C, 0x01, 0x00, 0x17, 0x2D, 0x00, 0x2A]);
        let method = builder.method("Test", &VOID_SIG, &fat_body(8, Token::new(0), false, &code));

        let mut harness = Harness::new(&builder, method, true);
        harness.run().unwrap();
        assert_eq!(
            harness.values(),
            vec![
                EmValue::Int32(0),
                EmValue::Int32(0),
                EmValue::Int32(1),
                EmValue::Int32(1),
            ]
        );
    }

    #[test]
    fn test_object_ordering_rejected() {
        // ldnull; ldnull; clt
        let mut harness = Harness::il(&[0x14, 0x14, 0xFE, 0x04, 0x2A]);
        assert!(matches!(
            fault(harness.run()),
            EmulationError::TypeMismatch {
                operation: "lt",
                ..
            }
        ));
    }

    #[test]
    fn test_arrays() {
        let mut builder = ImageBuilder::new("Tests");
        let corlib = builder.assembly_ref("mscorlib");
        let scope = CodedIndex::new(TableId::AssemblyRef, corlib);
        let byte = Token::from_parts(TableId::TypeRef as u8, builder.type_ref(scope, "System", "Byte"));
        let long = Token::from_parts(TableId::TypeRef as u8, builder.type_ref(scope, "System", "Int64"));
        builder.type_def("Tests", "Program");

        let mut code = vec![0x19, 0x8D];
        code.extend_from_slice(&byte.value().to_le_bytes());
        #[rustfmt::skip]
        code.extend_from_slice(&[
            0x0A,
            0x06, 0x16, 0x20, 0xFF, 0x01, 0x00, 0x00, 0x9C,
            0x06, 0x16, 0x91,
            0x06, 0x16, 0x90,
            0x06, 0x8E,
            0x06, 0x17, 0x94,
            0x17, 0x6A, 0x8D,
        ]);
        code.extend_from_slice(&long.value().to_le_bytes());
        code.extend_from_slice(&[0x16, 0x96, 0x2A]);
        let method = builder.method("Test", &VOID_SIG, &fat_body(8, Token::new(0), false, &code));

        let mut harness = Harness::new(&builder, method, true).with_locals(&[EmValue::Null]);
        harness.run().unwrap();
        assert_eq!(
            harness.values(),
            vec![
                EmValue::Int32(0xFF),
                EmValue::Int32(-1),
                EmValue::Int32(3),
                EmValue::Int32(0),
                EmValue::Int64(0),
            ]
        );
        assert_eq!(harness.references.len(), 2);
    }

    #[test]
    fn test_array_faults() {
        let mut builder = ImageBuilder::new("Tests");
        builder.type_def("Tests", "Program");
        let program = Token::from_parts(TableId::TypeDef as u8, 2);

        let mut code = vec![0x18, 0x8D];
        code.extend_from_slice(&program.value().to_le_bytes());
        code.extend_from_slice(&[0x18, 0x9A, 0x2A]);
        let method = builder.method("Test", &VOID_SIG, &fat_body(8, Token::new(0), false, &code));

        let mut harness = Harness::new(&builder, method, true);
        assert_eq!(
            fault(harness.run()),
            EmulationError::InvalidArrayIndex {
                index: 2,
                length: 2
            }
        );

        let mut harness = Harness::il(&[0x14, 0x16, 0x94, 0x2A]);
        assert_eq!(fault(harness.run()), EmulationError::NullReference);

        // newarr with a negative length
        let mut harness = Harness::il(&[0x15, 0x8D, 0x02, 0x00, 0x00, 0x02, 0x2A]);
        assert_eq!(fault(harness.run()), EmulationError::ArithmeticOverflow);
    }

    #[test]
    fn test_oversized_newarr_faults() {
        // ldc.i8 0x4000000000000000; newarr Program; ret
        #[rustfmt::skip]
        let mut harness = Harness::il(&[
            0x21, 0, 0, 0, 0, 0, 0, 0, 0x40,
            0x8D, 0x02, 0x00, 0x00, 0x02,
            0x2A,
        ]);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(
            fault(harness.run()),
            EmulationError::ArrayTooLarge {
                length: 0x4000_0000_0000_0000,
                limit: crate::config::DEFAULT_MAX_ARRAY_LENGTH,
            }
        );
        #[cfg(not(target_pointer_width = "64"))]
        assert_eq!(fault(harness.run()), EmulationError::ArithmeticOverflow);
        assert!(harness.references.is_empty());

        // ldc.i4.5; newarr Program; ret with room for four elements
        let mut harness = Harness::il(&[0x1B, 0x8D, 0x02, 0x00, 0x00, 0x02, 0x2A]);
        harness.references = ReferenceTable::new().with_max_array_length(4);
        assert_eq!(
            fault(harness.run()),
            EmulationError::ArrayTooLarge {
                length: 5,
                limit: 4
            }
        );
    }

    #[test]
    fn test_ldstr_and_locals() {
        let mut builder = ImageBuilder::new("Tests");
        builder.type_def("Tests", "Program");
        let hello = builder.user_string("Hello, World!");
        let mut code = vec![0x72];
        code.extend_from_slice(&hello.value().to_le_bytes());
        // stloc.s 1; ldloc.s 1; ldloc.0; ldc.i4.5; stloc 0; ldloc 0
        code.extend_from_slice(&[0x13, 0x01, 0x11, 0x01, 0x06, 0x1B, 0xFE, 0x0E, 0x00, 0x00]);
        code.extend_from_slice(&[0xFE, 0x0C, 0x00, 0x00, 0x2A]);
        let method = builder.method("Test", &VOID_SIG, &fat_body(8, Token::new(0), false, &code));

        let mut harness =
            Harness::new(&builder, method, true).with_locals(&[EmValue::Int32(0), EmValue::Null]);
        harness.run().unwrap();
        assert_eq!(
            harness.values(),
            vec![
                EmValue::string("Hello, World!"),
                EmValue::Int32(0),
                EmValue::Int32(5),
            ]
        );
    }

    #[test]
    fn test_call_and_arguments() {
        // ldarg.0; ldc.i4.2; starg.s 0; ldarg.0; call 0x06000001; ret
        let mut harness = Harness::il(&[
            0x02, 0x18, 0x10, 0x00, 0x02, 0x28, 0x01, 0x00, 0x00, 0x06, 0x2A,
        ]);
        harness.frame.arguments = vec![EmValue::Int32(1)];

        assert_eq!(harness.run().unwrap(), StepResult::Call(Token::new(0x0600_0001)));
        assert_eq!(harness.frame.ip(), 10);
        assert_eq!(harness.values(), vec![EmValue::Int32(1), EmValue::Int32(2)]);

        assert_eq!(harness.step().unwrap(), StepResult::Return);
        assert!(matches!(
            fault(harness.step()),
            EmulationError::InvalidInstructionPointer { offset: 11 }
        ));
    }

    #[test]
    fn test_decode_faults() {
        let mut harness = Harness::il(&[0xFF]);
        assert_eq!(
            fault(harness.step()),
            EmulationError::UnsupportedOpcode {
                opcode: 0xFF,
                prefix: None
            }
        );

        let mut harness = Harness::il(&[0xFE, 0x20]);
        assert_eq!(
            fault(harness.step()),
            EmulationError::UnsupportedOpcode {
                opcode: 0x20,
                prefix: Some(0xFE)
            }
        );

        let mut harness = Harness::il(&[0x2B, 0x7F]);
        assert_eq!(
            fault(harness.step()),
            EmulationError::InvalidBranchTarget { target: 129 }
        );

        // ldc.i4 with a truncated operand
        let mut harness = Harness::il(&[0x20, 0x01]);
        assert!(matches!(
            fault(harness.step()),
            EmulationError::InvalidInstructionPointer { offset: 0 }
        ));

        let mut harness = Harness::il(&[0x26]);
        assert_eq!(fault(harness.step()), EmulationError::StackUnderflow);
    }
}
