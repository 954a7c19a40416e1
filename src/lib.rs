//! Núcleo de compilador para Quack.
//!
//! # Entrada
//! El árbol sintáctico lo produce un front end externo por medio de
//! [`ast::Builder`]. Este crate no lee texto fuente.
//!
//! # Fases
//! Cada unidad atraviesa cuatro fases en orden fijo, y cada fase
//! termina antes de que empiece la siguiente:
//!
//! 1. Descriptores de clase: [`semantic::declare()`] registra cada clase
//!    en la tabla de [`classes`].
//! 2. Inicialización antes de uso en [`init`].
//! 3. Verificación e inferencia de tipos en [`semantic`], la cual itera
//!    hasta un punto fijo y deja los tipos de cada expresión en una
//!    tabla aparte.
//! 4. Generación de código en [`codegen`], que produce un flujo de
//!    instrucciones de [`ir`] por clase.
//!
//! Cualquier error detiene la unidad y se reporta como [`Diagnostics`].
//! Las tablas se construyen de nuevo para cada unidad.

#[macro_use]
mod macros;

pub mod ast;
pub mod classes;
pub mod codegen;
pub mod error;
pub mod init;
pub mod ir;
pub mod scope;
pub mod semantic;
pub mod source;

use bitflags::bitflags;

use crate::{ast::Identifier, error::Diagnostics, ir::Assembly, semantic::Tables};

bitflags! {
    /// Opciones a aplicar durante la compilación.
    pub struct Flags: u32 {
        /// Reportar todos los usos sin inicializar de la unidad en vez
        /// de detenerse en el primero.
        const COLLECT_ALL = 0x01;

        /// No descartar el valor de expresiones usadas como sentencias.
        const KEEP_UNUSED = 0x02;
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::empty()
    }
}

/// Nombre por omisión de la clase que contiene las sentencias de nivel
/// superior.
pub const MAIN_CLASS: &str = "main";

#[derive(Clone, Debug)]
pub struct Options {
    pub main_class: String,
    pub flags: Flags,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            main_class: MAIN_CLASS.to_owned(),
            flags: Flags::default(),
        }
    }
}

/// Compila una unidad completa.
pub fn compile(program: &ast::Program, options: &Options) -> Result<Assembly, Diagnostics> {
    let main = Identifier::new(&options.main_class);
    let mut tables = Tables::new();

    semantic::declare(program, &mut tables, &main)
        .map_err(|error| Diagnostics::from(error).kind("Class error"))?;

    let collect = options.flags.contains(Flags::COLLECT_ALL);
    init::check(program, collect)
        .map_err(|errors| Diagnostics::from(errors).kind("Initialization error"))?;

    semantic::check(program, &mut tables, &main)
        .map_err(|error| Diagnostics::from(error).kind("Type error"))?;

    let keep_unused = options.flags.contains(Flags::KEEP_UNUSED);
    let assembly = codegen::generate(program, &tables, &main, keep_unused)
        .map_err(|error| Diagnostics::from(error).kind("Codegen error"))?;

    log::debug!("compiled {} classes", assembly.classes.len());
    Ok(assembly)
}
