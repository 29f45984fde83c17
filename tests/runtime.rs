//! End-to-end execution of assembled programs: loading, interpretation, scheduling and the
//! interaction with the console and the assembly cache.

mod common;

use std::fs;

use common::{
    capturing_domain, console_method, fat_body, tiny_body, with_token, ImageBuilder, INT_SIG,
    VOID_SIG, WRITE_INT_SIG,
};
use dotrun::{
    emulation::{
        runtime::{DirectorySource, MemorySource, CORLIB},
        EmValue, EmulationError, StepBudget, ThreadId,
    },
    metadata::{
        tables::{CodedIndex, TableId},
        token::Token,
    },
    AppDomain, CilImage, Error, Result, RuntimeConfig,
};

/// Prints the first ten Fibonacci numbers with `Console.WriteLine(int32)`.
fn fibonacci_image() -> Vec<u8> {
    let mut builder = ImageBuilder::new("Fib");
    let write_line = console_method(&mut builder, "WriteLine", &WRITE_INT_SIG);
    let locals = builder.standalone_sig(&[0x07, 0x03, 0x08, 0x08, 0x08]);
    builder.type_def("Fib", "Program");

    let mut il = vec![
        0x16, 0x0A, // a = 0
        0x17, 0x0B, // b = 1
        0x16, 0x0C, // i = 0
        0x06, // loop: print a
    ];
    il.extend(with_token(0x28, write_line));
    il.extend_from_slice(&[
        0x06, 0x07, 0x58, // a + b
        0x07, 0x0A, // a = b
        0x0B, // b = a + b
        0x08, 0x17, 0x58, 0x0C, // i++
        0x08, 0x1F, 0x0A, // i, 10
        0x37, 0xEB, // blt.un.s loop
        0x2A,
    ]);

    let main = builder.method("Main", &VOID_SIG, &fat_body(4, locals, true, &il));
    builder.entry_point(main);
    builder.build()
}

/// Counts a local to `limit` and returns it.
fn counter_image(name: &str, limit: u8) -> Vec<u8> {
    let mut builder = ImageBuilder::new(name);
    let locals = builder.standalone_sig(&[0x07, 0x01, 0x08]);
    builder.type_def(name, "Program");

    let il = [
        0x16, 0x0A, // i = 0
        0x06, 0x17, 0x58, 0x0A, // loop: i++
        0x06, 0x1F, limit, // i, limit
        0x37, 0xF7, // blt.un.s loop
        0x06, 0x2A,
    ];
    let main = builder.method("Main", &INT_SIG, &fat_body(2, locals, true, &il));
    builder.entry_point(main);
    builder.build()
}

/// Runs the same `ceq` once over two `int32` and once over two `int64` operands.
fn mixed_ceq_image() -> Vec<u8> {
    let mut builder = ImageBuilder::new("Mixed");
    let locals = builder.standalone_sig(&[0x07, 0x01, 0x08]);
    builder.type_def("Mixed", "Program");

    let mut il = vec![
        0x16, 0x0A, // i = 0
        0x06, 0x2D, 0x04, // loop: brtrue.s wide
        0x19, 0x19, // 3, 3
        0x2B, 0x12, // br.s compare
    ];
    for _ in 0..2 {
        il.push(0x21);
        il.extend_from_slice(&3_i64.to_le_bytes());
    }
    il.extend_from_slice(&[
        0xFE, 0x01, // compare: ceq
        0x26, // pop
        0x06, 0x17, 0x58, 0x0A, // i++
        0x06, 0x18, 0x37, 0xDC, // blt.un.s loop
        0x06, 0x2A,
    ]);

    let main = builder.method("Main", &INT_SIG, &fat_body(4, locals, true, &il));
    builder.entry_point(main);
    builder.build()
}

/// Fills `new int[5]` with squares and returns the element at `read`.
fn squares_image(read: u8) -> Vec<u8> {
    let mut builder = ImageBuilder::new("Squares");
    let corlib = builder.assembly_ref(CORLIB);
    let int32 = builder.type_ref(CodedIndex::new(TableId::AssemblyRef, corlib), "System", "Int32");
    let locals = builder.standalone_sig(&[0x07, 0x02, 0x1D, 0x08, 0x08]);
    builder.type_def("Squares", "Program");

    let mut il = vec![0x1B];
    il.extend(with_token(0x8D, Token::from_parts(TableId::TypeRef as u8, int32)));
    il.extend_from_slice(&[
        0x0A, // arr = new int[5]
        0x16, 0x0B, // i = 0
        0x06, 0x07, 0x07, 0x07, 0x5A, 0x9E, // loop: arr[i] = i * i
        0x07, 0x17, 0x58, 0x0B, // i++
        0x07, 0x06, 0x8E, 0x69, // i, arr.Length
        0x37, 0xF0, // blt.un.s loop
        0x06, 0x1F, read, 0x94, 0x2A, // return arr[read]
    ]);

    let main = builder.method("Main", &INT_SIG, &fat_body(4, locals, true, &il));
    builder.entry_point(main);
    builder.build()
}

/// `Lib.Util::Answer` returns 7.
fn library_image() -> Vec<u8> {
    let mut builder = ImageBuilder::new("Lib");
    builder.type_def("Lib", "Util");
    builder.method("Answer", &INT_SIG, &tiny_body(&[0x1D, 0x2A]));
    builder.build()
}

/// `Main` returns `Lib.Util::Answer()`.
fn client_image(name: &str) -> Vec<u8> {
    let mut builder = ImageBuilder::new(name);
    let lib = builder.assembly_ref("Lib");
    let util = builder.type_ref(CodedIndex::new(TableId::AssemblyRef, lib), "Lib", "Util");
    let answer = builder.member_ref(CodedIndex::new(TableId::TypeRef, util), "Answer", &INT_SIG);
    builder.type_def(name, "Program");

    let mut il = with_token(0x28, answer);
    il.push(0x2A);
    let main = builder.method("Main", &INT_SIG, &tiny_body(&il));
    builder.entry_point(main);
    builder.build()
}

#[test]
fn test_fibonacci_output() -> Result<()> {
    let (mut domain, output) = capturing_domain(RuntimeConfig::default(), MemorySource::new())?;
    let assembly = domain.add_assembly("Fib", CilImage::from_mem(fibonacci_image())?);
    let thread = domain.run(&assembly)?;
    domain.run_to_completion()?;

    assert_eq!(
        String::from_utf8_lossy(&output.borrow()),
        "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n"
    );
    assert!(domain.has_exited(thread));
    assert_eq!(domain.exit_value(thread), None);
    Ok(())
}

#[test]
fn test_specialization_is_transparent() -> Result<()> {
    let mut outputs = Vec::new();
    for specialize in [true, false] {
        let config = RuntimeConfig::default().with_specialize_opcodes(specialize);
        let (mut domain, output) = capturing_domain(config, MemorySource::new())?;
        let assembly = domain.add_assembly("Fib", CilImage::from_mem(fibonacci_image())?);
        domain.run(&assembly)?;
        domain.run_to_completion()?;

        let main = assembly.image().map(CilImage::entry_point).unwrap_or_default();
        let resolved = assembly.method(main)?.cache.resolved();
        if specialize {
            assert!(resolved > 0);
        } else {
            assert_eq!(resolved, 0);
        }
        outputs.push(output.borrow().clone());
    }

    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[test]
fn test_specialized_site_rejects_other_kind() -> Result<()> {
    let config = RuntimeConfig::default().with_specialize_opcodes(false);
    let (mut domain, _) = capturing_domain(config, MemorySource::new())?;
    let assembly = domain.add_assembly("Mixed", CilImage::from_mem(mixed_ceq_image())?);
    let thread = domain.run(&assembly)?;
    domain.run_to_completion()?;
    assert_eq!(domain.exit_value(thread), Some(&EmValue::Int32(2)));

    let (mut domain, _) = capturing_domain(RuntimeConfig::default(), MemorySource::new())?;
    let assembly = domain.add_assembly("Mixed", CilImage::from_mem(mixed_ceq_image())?);
    domain.run(&assembly)?;
    let error = domain.run_to_completion().unwrap_err();
    assert!(matches!(
        error.as_emulation(),
        Some(EmulationError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_arrays() -> Result<()> {
    let (mut domain, _) = capturing_domain(RuntimeConfig::default(), MemorySource::new())?;
    let assembly = domain.add_assembly("Squares", CilImage::from_mem(squares_image(3))?);
    let thread = domain.run(&assembly)?;
    domain.run_to_completion()?;
    assert_eq!(domain.exit_value(thread), Some(&EmValue::Int32(9)));

    let (mut domain, _) = capturing_domain(RuntimeConfig::default(), MemorySource::new())?;
    let assembly = domain.add_assembly("Squares", CilImage::from_mem(squares_image(5))?);
    domain.run(&assembly)?;
    let error = domain.run_to_completion().unwrap_err();
    assert_eq!(
        error.as_emulation(),
        Some(&EmulationError::InvalidArrayIndex {
            index: 5,
            length: 5
        })
    );
    Ok(())
}

#[test]
fn test_array_length_limit_from_config() -> Result<()> {
    let config = RuntimeConfig::default().with_max_array_length(4);
    let (mut domain, _) = capturing_domain(config, MemorySource::new())?;
    let assembly = domain.add_assembly("Squares", CilImage::from_mem(squares_image(3))?);
    domain.run(&assembly)?;
    let error = domain.run_to_completion().unwrap_err();
    assert_eq!(
        error.as_emulation(),
        Some(&EmulationError::ArrayTooLarge {
            length: 5,
            limit: 4
        })
    );
    Ok(())
}

#[test]
fn test_round_robin_with_budget() -> Result<()> {
    let config = RuntimeConfig::default().with_step_budget(StepBudget::Steps(10));
    let (mut domain, _) = capturing_domain(config, MemorySource::new())?;

    let mut threads = Vec::new();
    for name in ["A", "B", "C"] {
        let assembly = domain.add_assembly(name, CilImage::from_mem(counter_image(name, 50))?);
        threads.push(domain.run(&assembly)?);
    }

    let mut served = Vec::new();
    for _ in 0..6 {
        let report = domain.tick()?;
        assert_eq!(report.steps, 10);
        served.extend(report.served);
    }
    assert_eq!(served, [threads.clone(), threads.clone()].concat());

    domain.run_to_completion()?;
    for thread in threads {
        assert_eq!(domain.exit_value(thread), Some(&EmValue::Int32(50)));
    }
    Ok(())
}

#[test]
fn test_unbounded_budget_runs_threads_to_completion_in_order() -> Result<()> {
    let (mut domain, _) = capturing_domain(RuntimeConfig::default(), MemorySource::new())?;
    let short = domain.add_assembly("Short", CilImage::from_mem(counter_image("Short", 3))?);
    let long = domain.add_assembly("Long", CilImage::from_mem(counter_image("Long", 40))?);
    let first = domain.run(&long)?;
    let second = domain.run(&short)?;

    let report = domain.tick()?;
    assert_eq!(report.served, vec![first]);
    assert_eq!(report.finished.len(), 1);
    assert!(domain.has_exited(first));
    assert!(!domain.has_exited(second));

    domain.run_to_completion()?;
    assert_eq!(domain.exit_value(second), Some(&EmValue::Int32(3)));
    Ok(())
}

#[test]
fn test_assembly_fetched_once_for_many_threads() -> Result<()> {
    let source = MemorySource::new().with_image("Lib", library_image());
    let fetches = source.fetch_counter();
    let (mut domain, _) = capturing_domain(RuntimeConfig::default(), source)?;

    let mut threads = Vec::new();
    for name in ["One", "Two", "Three"] {
        let assembly = domain.add_assembly(name, CilImage::from_mem(client_image(name))?);
        threads.push(domain.run(&assembly)?);
    }

    let report = domain.tick()?;
    assert_eq!(report.blocked, threads);
    assert_eq!(domain.assemblies().pending().collect::<Vec<_>>(), vec!["Lib"]);

    domain.run_to_completion()?;
    for thread in &threads {
        assert_eq!(domain.exit_value(*thread), Some(&EmValue::Int32(7)));
    }
    assert_eq!(fetches.get(), 1);
    Ok(())
}

#[test]
fn test_directory_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("Lib.dll"), library_image())?;
    let client = dir.path().join("Client.exe");
    fs::write(&client, client_image("Client"))?;

    let mut domain = AppDomain::new(
        RuntimeConfig::default(),
        Box::new(DirectorySource::new(dir.path())),
    )?;
    let assembly = domain.load_file(&client)?;
    assert_eq!(assembly.name(), "Client");

    let thread = domain.run(&assembly)?;
    domain.run_to_completion()?;
    assert_eq!(domain.exit_value(thread), Some(&EmValue::Int32(7)));
    assert_eq!(domain.assemblies().fetches(), 1);
    Ok(())
}

#[test]
fn test_start_missing_entry_assembly() -> Result<()> {
    let (mut domain, _) = capturing_domain(RuntimeConfig::default(), MemorySource::new())?;
    domain.start("Ghost");
    let error = domain.run_to_completion().unwrap_err();
    assert_eq!(
        error.as_emulation(),
        Some(&EmulationError::AssemblyNotFound {
            name: "Ghost".to_string()
        })
    );
    assert_eq!(domain.exit_value(ThreadId(0)), None);
    Ok(())
}

#[test]
fn test_loader_rejects_broken_images() {
    let good = counter_image("Good", 1);
    assert!(CilImage::from_mem(good.clone()).is_ok());

    let mut bad_dos = good.clone();
    bad_dos[0] = b'X';
    assert!(matches!(
        CilImage::from_mem(bad_dos),
        Err(Error::GoblinErr(_))
    ));

    let mut bad_pe = good.clone();
    bad_pe[0x80] = b'X';
    assert!(matches!(
        CilImage::from_mem(bad_pe),
        Err(Error::GoblinErr(_))
    ));

    let magic = 0x424A_5342_u32.to_le_bytes();
    let position = good
        .windows(4)
        .position(|window| window == magic)
        .unwrap();
    let mut bad_metadata = good;
    bad_metadata[position] = 0;
    assert!(CilImage::from_mem(bad_metadata).is_err());

    assert!(matches!(CilImage::from_mem(Vec::new()), Err(Error::Empty)));
}
