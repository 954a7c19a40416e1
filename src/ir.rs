//! Representación de salida: instrucciones de la máquina de pila.
//!
//! Cada clase de la unidad produce un [`ClassCode`] independiente, con
//! sus directivas de encabezado y un cuerpo por miembro. La forma
//! textual de cada instrucción es su implementación de [`Display`].

use std::fmt::{self, Display};

use crate::ast::Identifier;

/// Nombre del receptor implícito en ensamblador.
pub const RECEIVER: &str = "$";

/// Destino de un salto.
///
/// Las etiquetas se numeran con un contador único por unidad, por lo
/// cual dos etiquetas distintas nunca comparten nombre.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label {
    kind: &'static str,
    number: u32,
    end: bool,
}

impl Label {
    pub fn new(kind: &'static str, number: u32) -> Self {
        Label {
            kind,
            number,
            end: false,
        }
    }

    /// Etiqueta de salida asociada a esta.
    pub fn end(self) -> Self {
        Label { end: true, ..self }
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.end { "end" } else { "" };
        write!(fmt, "{}label{}{}", prefix, self.kind, self.number)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Const {
    Int(i32),
    Str(String),
    Bool(bool),
    Nothing,
}

impl Display for Const {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(value) => write!(fmt, "{}", value),
            Const::Bool(value) => write!(fmt, "{}", value),
            Const::Nothing => fmt.write_str("nothing"),

            Const::Str(value) => {
                fmt.write_str("\"")?;
                for c in value.chars() {
                    match c {
                        '"' => fmt.write_str("\\\"")?,
                        '\\' => fmt.write_str("\\\\")?,
                        '\n' => fmt.write_str("\\n")?,
                        '\t' => fmt.write_str("\\t")?,
                        c => write!(fmt, "{}", c)?,
                    }
                }

                fmt.write_str("\"")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Const(Const),
    Load(Identifier),
    Store(Identifier),

    /// Apila el receptor implícito.
    LoadThis,

    LoadField {
        class: Identifier,
        field: Identifier,
    },

    StoreField {
        class: Identifier,
        field: Identifier,
    },

    Call {
        class: Identifier,
        method: Identifier,
    },

    /// Sube al tope el elemento a `n` posiciones del tope.
    Roll(usize),

    New(Identifier),
    Pop,
    Jump(Label),
    JumpIf(Label),
    JumpIfNot(Label),
    SetLabel(Label),
    Return(usize),
}

impl Instruction {
    pub fn call(class: &Identifier, method: &str) -> Self {
        Instruction::Call {
            class: class.clone(),
            method: Identifier::new(method),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Const(value) => write!(fmt, "const {}", value),
            Load(name) => write!(fmt, "load {}", name),
            Store(name) => write!(fmt, "store {}", name),
            LoadThis => write!(fmt, "load {}", RECEIVER),
            LoadField { class, field } => write!(fmt, "load_field {}:{}", class, field),
            StoreField { class, field } => write!(fmt, "store_field {}:{}", class, field),
            Call { class, method } => write!(fmt, "call {}:{}", class, method),
            Roll(n) => write!(fmt, "roll {}", n),
            New(class) => write!(fmt, "new {}", class),
            Pop => fmt.write_str("pop"),
            Jump(label) => write!(fmt, "jump {}", label),
            JumpIf(label) => write!(fmt, "jump_if {}", label),
            JumpIfNot(label) => write!(fmt, "jump_ifnot {}", label),
            SetLabel(label) => write!(fmt, "{}:", label),
            Return(n) => write!(fmt, "return {}", n),
        }
    }
}

/// Código de un constructor o método.
#[derive(Debug)]
pub struct MethodCode {
    pub name: Identifier,
    pub args: Vec<Identifier>,
    pub locals: Vec<Identifier>,
    pub body: Vec<Instruction>,
}

/// Flujo de instrucciones de una clase.
#[derive(Debug)]
pub struct ClassCode {
    pub name: Identifier,
    pub superclass: Identifier,
    pub fields: Vec<Identifier>,
    pub methods: Vec<MethodCode>,
}

impl ClassCode {
    pub fn method(&self, name: &str) -> Option<&MethodCode> {
        self.methods.iter().find(|method| method.name.as_ref() == name)
    }
}

/// Resultado de compilar una unidad: un flujo por clase, en orden de
/// declaración, con la clase principal de última.
#[derive(Debug, Default)]
pub struct Assembly {
    pub classes: Vec<ClassCode>,
}

impl Assembly {
    pub fn class(&self, name: &str) -> Option<&ClassCode> {
        self.classes.iter().find(|class| class.name.as_ref() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_render_with_kind_and_number() {
        let label = Label::new("ifcmp", 3);
        assert_eq!(label.to_string(), "labelifcmp3");
        assert_eq!(label.end().to_string(), "endlabelifcmp3");
        assert_eq!(Instruction::SetLabel(label).to_string(), "labelifcmp3:");
    }

    #[test]
    fn strings_are_quoted_and_escaped() {
        let value = Const::Str("say \"hi\"\n".into());
        assert_eq!(value.to_string(), r#""say \"hi\"\n""#);
    }

    #[test]
    fn instruction_vocabulary() {
        let pt = Identifier::new("Pt");
        let x = Identifier::new("x");

        let rendered: Vec<_> = [
            Instruction::Const(Const::Int(-4)),
            Instruction::Const(Const::Nothing),
            Instruction::LoadThis,
            Instruction::LoadField {
                class: Identifier::new(RECEIVER),
                field: x.clone(),
            },
            Instruction::StoreField {
                class: pt.clone(),
                field: x,
            },
            Instruction::call(&pt, "scale"),
            Instruction::Roll(2),
            Instruction::New(pt),
            Instruction::JumpIfNot(Label::new("and", 0)),
            Instruction::Return(1),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        assert_eq!(
            rendered,
            [
                "const -4",
                "const nothing",
                "load $",
                "load_field $:x",
                "store_field Pt:x",
                "call Pt:scale",
                "roll 2",
                "new Pt",
                "jump_ifnot labeland0",
                "return 1",
            ]
        );
    }
}
