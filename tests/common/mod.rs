//! Utilidades compartidas por las pruebas de integración.
//!
//! En cada archivo de pruebas:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

pub use quack::{
    ast::{BinOp, Builder, CmpOp, Program, UnOp},
    classes::ClassTable,
    compile,
    error::Diagnostics,
    ir::Assembly,
    Flags, Options,
};

/// Compila con las opciones por omisión.
pub fn build(program: &Program) -> Result<Assembly, Diagnostics> {
    compile(program, &Options::default())
}

/// Compila un programa que se espera correcto.
pub fn assemble(program: &Program) -> Assembly {
    match build(program) {
        Ok(assembly) => assembly,
        Err(diagnostics) => panic!("unexpected failure:\n{}", diagnostics),
    }
}

/// Compila un programa que se espera incorrecto.
pub fn diagnose(program: &Program, options: &Options) -> Diagnostics {
    match compile(program, options) {
        Ok(_) => panic!("compilation was expected to fail"),
        Err(diagnostics) => diagnostics,
    }
}

/// Instrucciones de un miembro, en forma textual.
pub fn body(assembly: &Assembly, class: &str, method: &str) -> Vec<String> {
    assembly
        .class(class)
        .and_then(|class| class.method(method))
        .map(|method| method.body.iter().map(ToString::to_string).collect())
        .unwrap_or_else(|| panic!("no code for {}:{}", class, method))
}

/// Forma textual completa de una clase.
pub fn render(assembly: &Assembly, class: &str) -> String {
    let class = assembly.class(class).expect("class missing from assembly");

    let mut output = Vec::new();
    quack::codegen::write(class, &mut output).unwrap();
    String::from_utf8(output).unwrap()
}

/// Cantidad de líneas iguales a `instruction`.
pub fn count(lines: &[String], instruction: &str) -> usize {
    lines.iter().filter(|line| *line == instruction).count()
}
