//! `waotc`: a small demo driver for the compiler core, not a product CLI.
//!
//! Reads a raw WebAssembly function body's operator bytecode from a file, translates it with
//! a fixed `(i32, i32) -> i32` signature and no extra locals (enough to exercise the whole
//! pipeline end to end), compiles it, and dumps the resulting machine code and relocations.
//! Grounded on the teacher's `wasmtime-cli` for the `clap`/`env_logger` split: the library
//! crates only depend on `log`, and this binary is the one place the backend
//! (`env_logger`) gets wired in.

use std::fs;
use std::process;

use clap::{App, Arg};
use waot_codegen::ir::{ExternalName, Function, Signature, Type};
use waot_codegen::settings::Flags;
use waot_codegen::Context;
use waot_wasm::{translate_function_body, DummyEnvironment};

fn main() {
    env_logger::init();

    let matches = App::new("waotc")
        .about("Compiles one WebAssembly function body to AArch64 machine code")
        .arg(
            Arg::with_name("input")
                .help("path to a file containing raw operator bytecode for one function body")
                .required(true),
        )
        .get_matches();

    let path = matches.value_of("input").expect("required argument");
    let code = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("waotc: couldn't read {}: {}", path, err);
            process::exit(1);
        }
    };

    if let Err(err) = run(&code) {
        eprintln!("waotc: {}", err);
        process::exit(1);
    }
}

fn run(code: &[u8]) -> Result<(), failure::Error> {
    let signature = Signature::wasm(&[Type::I32, Type::I32], &[Type::I32]);
    let mut func = Function::with_name_signature(ExternalName::user(0), signature);

    let mut environ = DummyEnvironment::new();
    translate_function_body(&mut func, &[], code, &mut environ)?;

    let mut ctx = Context::new();
    ctx.func = func;

    let flags = Flags::default();
    let finalized = ctx.compile(&flags)?;

    println!("{} bytes of code, frame size {}", finalized.code.len(), finalized.frame_size);
    print!("code:");
    for byte in &finalized.code {
        print!(" {:02x}", byte);
    }
    println!();

    for reloc in &finalized.relocs {
        println!(
            "reloc at +{}: {:?} -> function {}",
            reloc.offset, reloc.reloc, reloc.callee_index
        );
    }
    for trap in &finalized.traps {
        println!("trap at +{}: {:?}", trap.offset, trap.code);
    }

    Ok(())
}
