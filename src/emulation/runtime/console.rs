//! `System.Console` of the built-in `mscorlib`.

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use crate::{
    emulation::{
        runtime::{NativeCall, NativeLibrary, NativeMethod, NativeOutcome, NativeRegistry},
        EmValue, EmulationError,
    },
    metadata::signatures::ELEMENT_TYPE,
    Result,
};

/// Destination of console output.
pub type ConsoleSink = Rc<RefCell<dyn Write>>;

const CONSOLE: &str = "System.Console";

/// Parameter types of the supported `Write` / `WriteLine` overloads.
const OVERLOADS: [Option<u8>; 9] = [
    None,
    Some(ELEMENT_TYPE::STRING),
    Some(ELEMENT_TYPE::BOOLEAN),
    Some(ELEMENT_TYPE::CHAR),
    Some(ELEMENT_TYPE::I4),
    Some(ELEMENT_TYPE::U4),
    Some(ELEMENT_TYPE::I8),
    Some(ELEMENT_TYPE::U8),
    Some(ELEMENT_TYPE::OBJECT),
];

/// Native implementation of `System.Console::Write` and `System.Console::WriteLine`.
///
/// Output goes to stdout unless a sink is given, which lets hosts and tests capture it.
///
/// ```rust
/// use std::{cell::RefCell, rc::Rc};
/// use dotrun::emulation::runtime::{ConsoleLibrary, NativeLibrary};
///
/// let output = Rc::new(RefCell::new(Vec::<u8>::new()));
/// let console = ConsoleLibrary::new(output.clone());
/// assert!(console.bind("System.Console", "WriteLine$_10").is_some());
/// assert!(console.bind("System.Console", "Beep$").is_none());
/// ```
pub struct ConsoleLibrary {
    methods: NativeRegistry,
}

impl Default for ConsoleLibrary {
    fn default() -> Self {
        ConsoleLibrary::new(Rc::new(RefCell::new(io::stdout())))
    }
}

impl ConsoleLibrary {
    /// Create the library writing to `sink`.
    #[must_use]
    pub fn new(sink: ConsoleSink) -> ConsoleLibrary {
        let mut methods = NativeRegistry::new();

        for element in OVERLOADS {
            for (name, newline) in [("Write", false), ("WriteLine", true)] {
                if element.is_none() && !newline {
                    continue;
                }

                let key = match element {
                    Some(element) => format!("{name}$_{element}"),
                    None => format!("{name}$"),
                };
                let sink = Rc::clone(&sink);
                methods.register(CONSOLE, &key, move |call: &mut NativeCall<'_>| {
                    let mut text = match (element, call.arguments.first()) {
                        (Some(element), Some(value)) => render(element, value)?,
                        (Some(_), None) => return Err(EmulationError::StackUnderflow.into()),
                        (None, _) => String::new(),
                    };
                    if newline {
                        text.push('\n');
                    }

                    let mut sink = sink.borrow_mut();
                    sink.write_all(text.as_bytes())?;
                    sink.flush()?;
                    Ok(NativeOutcome::Complete(None))
                });
            }
        }

        ConsoleLibrary { methods }
    }
}

impl NativeLibrary for ConsoleLibrary {
    fn bind(&self, type_name: &str, key: &str) -> Option<NativeMethod> {
        self.methods.bind(type_name, key)
    }
}

/// Format `value` the way the overload taking `element` prints it.
#[allow(clippy::cast_sign_loss)]
fn render(element: u8, value: &EmValue) -> Result<String> {
    let operation = "Console.Write";
    Ok(match element {
        ELEMENT_TYPE::BOOLEAN => {
            if value.as_i32(operation)? == 0 {
                "False".to_string()
            } else {
                "True".to_string()
            }
        }
        ELEMENT_TYPE::CHAR => {
            let unit = value.as_i32(operation)? as u32 & 0xFFFF;
            char::from_u32(unit)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string()
        }
        ELEMENT_TYPE::I4 => value.as_i32(operation)?.to_string(),
        ELEMENT_TYPE::U4 => (value.as_i32(operation)? as u32).to_string(),
        ELEMENT_TYPE::I8 => value.as_i64(operation)?.to_string(),
        ELEMENT_TYPE::U8 => (value.as_i64(operation)? as u64).to_string(),
        _ => match value {
            EmValue::String(text) => text.to_string(),
            EmValue::Null => String::new(),
            EmValue::Int32(v) => v.to_string(),
            EmValue::Int64(v) => v.to_string(),
            EmValue::Object(_) => "System.Object".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{Heap, ReferenceTable};

    fn call(console: &ConsoleLibrary, key: &str, arguments: &[EmValue]) -> Result<NativeOutcome> {
        let method = console.bind(CONSOLE, key).unwrap();
        let mut heap = Heap::new(16).unwrap();
        let mut references = ReferenceTable::new();
        (*method)(&mut NativeCall {
            arguments,
            heap: &mut heap,
            references: &mut references,
        })
    }

    #[test]
    fn test_overloads() {
        let output = Rc::new(RefCell::new(Vec::<u8>::new()));
        let console = ConsoleLibrary::new(output.clone());

        call(&console, "WriteLine$_10", &[EmValue::Int64(55)]).unwrap();
        call(&console, "Write$_14", &[EmValue::string("a")]).unwrap();
        call(&console, "Write$_3", &[EmValue::Int32(0x62)]).unwrap();
        call(&console, "WriteLine$_2", &[EmValue::Int32(1)]).unwrap();
        call(&console, "WriteLine$_9", &[EmValue::Int32(-1)]).unwrap();
        call(&console, "WriteLine$_11", &[EmValue::Int64(-1)]).unwrap();
        call(&console, "WriteLine$_28", &[EmValue::Null]).unwrap();
        assert_eq!(
            call(&console, "WriteLine$", &[]).unwrap(),
            NativeOutcome::Complete(None)
        );

        assert_eq!(
            String::from_utf8(output.borrow().clone()).unwrap(),
            "55\nabTrue\n4294967295\n18446744073709551615\n\n\n"
        );
        assert!(console.bind(CONSOLE, "Write$").is_none());
    }

    #[test]
    fn test_type_mismatch() {
        let console = ConsoleLibrary::new(Rc::new(RefCell::new(Vec::<u8>::new())));
        let error = call(&console, "WriteLine$_8", &[EmValue::string("x")]).unwrap_err();
        assert!(matches!(
            error.as_emulation(),
            Some(EmulationError::TypeMismatch { .. })
        ));
    }
}
